use std::sync::atomic::{AtomicU32, Ordering};

/// A monotonically increasing `u32` counter.
///
/// Each RPC client owns its own counter, so correlation IDs are unique per
/// client instance rather than per process. IDs start at 1; `0` is never
/// handed out so it can mark "not yet assigned". On wrap-around the counter
/// skips `0` again.
#[derive(Debug)]
pub struct IncrementU32Id {
    next: AtomicU32,
}

impl Default for IncrementU32Id {
    fn default() -> Self {
        Self::new()
    }
}

impl IncrementU32Id {
    pub fn new() -> Self {
        Self {
            next: AtomicU32::new(1),
        }
    }

    #[inline]
    pub fn next_id(&self) -> u32 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}
