use crate::constants::DEFAULT_CALL_TIMEOUT_MS;
use bitcode::{Decode, Encode};
use std::collections::BTreeMap;
use std::time::Duration;

/// Per-call options carried alongside a request.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct CallMetadata {
    /// Deadline for the call, measured from the moment it is sent.
    pub timeout_ms: u64,

    /// Fire-and-forget: the server never answers and the client never waits.
    pub one_way: bool,

    /// Key fed to the consistent-hash load balancer. Calls with the same key
    /// are routed to the same instance while the instance set is stable.
    pub hash_key: Option<String>,

    /// Free-form string attachments (auth tokens, trace ids, ...) that
    /// filters on either side may read or add.
    pub attachments: BTreeMap<String, String>,
}

impl Default for CallMetadata {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_CALL_TIMEOUT_MS,
            one_way: false,
            hash_key: None,
            attachments: BTreeMap::new(),
        }
    }
}

impl CallMetadata {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
