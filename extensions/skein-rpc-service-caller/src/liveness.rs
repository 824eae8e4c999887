use skein::utils::now;
use std::sync::Mutex;

/// Liveness of one connection as judged by heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Connecting,
    Active,
    /// At least one heartbeat went unanswered.
    Suspect,
    /// Terminal; the connection is torn down and replaced on next use.
    Dead,
}

#[derive(Debug)]
struct LivenessInner {
    state: ConnectionState,
    missed: u32,
    awaiting_ack: bool,
    last_probe_sent_micros: Option<u64>,
    last_ack_micros: Option<u64>,
}

/// Heartbeat bookkeeping for one connection.
///
/// The heartbeat task calls [`probe_due`](Self::probe_due) once per interval,
/// right before sending the next probe. A probe still unanswered at that point
/// counts as a miss: the first miss makes the connection `Suspect`, and
/// reaching `miss_threshold` consecutive misses makes it `Dead`. Any ack
/// restores `Active`.
#[derive(Debug)]
pub struct LivenessTracker {
    miss_threshold: u32,
    inner: Mutex<LivenessInner>,
}

impl LivenessTracker {
    pub fn new(miss_threshold: u32) -> Self {
        Self {
            miss_threshold: miss_threshold.max(1),
            inner: Mutex::new(LivenessInner {
                state: ConnectionState::Connecting,
                missed: 0,
                awaiting_ack: false,
                last_probe_sent_micros: None,
                last_ack_micros: None,
            }),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, LivenessInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state
    }

    pub fn missed(&self) -> u32 {
        self.lock().missed
    }

    pub fn last_probe_sent_micros(&self) -> Option<u64> {
        self.lock().last_probe_sent_micros
    }

    pub fn last_ack_micros(&self) -> Option<u64> {
        self.lock().last_ack_micros
    }

    /// `Connecting` -> `Active` once the transport is up.
    pub fn mark_active(&self) {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Connecting {
            inner.state = ConnectionState::Active;
        }
    }

    pub fn mark_dead(&self) {
        self.lock().state = ConnectionState::Dead;
    }

    /// Accounts for the previous probe and records a new one as sent.
    ///
    /// Returns the resulting state. A `Dead` result means no probe should be
    /// sent and the connection should be torn down.
    pub fn probe_due(&self) -> ConnectionState {
        let mut inner = self.lock();
        if inner.state == ConnectionState::Dead {
            return ConnectionState::Dead;
        }

        if inner.awaiting_ack {
            inner.missed += 1;
            inner.state = if inner.missed >= self.miss_threshold {
                ConnectionState::Dead
            } else {
                ConnectionState::Suspect
            };
        }

        if inner.state != ConnectionState::Dead {
            inner.awaiting_ack = true;
            inner.last_probe_sent_micros = Some(now());
        }
        inner.state
    }

    /// Records a heartbeat acknowledgment.
    pub fn ack(&self) -> ConnectionState {
        let mut inner = self.lock();
        inner.last_ack_micros = Some(now());
        if inner.state != ConnectionState::Dead {
            inner.awaiting_ack = false;
            inner.missed = 0;
            inner.state = ConnectionState::Active;
        }
        inner.state
    }
}
