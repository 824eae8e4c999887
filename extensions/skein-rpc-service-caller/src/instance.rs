use std::collections::BTreeMap;
use std::fmt;

/// One network-addressable process hosting a service version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instance {
    /// `host:port`, or a full `ws://` URL.
    pub address: String,
    pub weight: u32,
    pub healthy: bool,
    pub metadata: BTreeMap<String, String>,
}

impl Instance {
    pub const DEFAULT_WEIGHT: u32 = 100;

    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            weight: Self::DEFAULT_WEIGHT,
            healthy: true,
            metadata: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }

    #[must_use]
    pub fn with_health(mut self, healthy: bool) -> Self {
        self.healthy = healthy;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.address)
    }
}
