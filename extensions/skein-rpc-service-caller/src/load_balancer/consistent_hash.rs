use super::{LoadBalancer, SelectContext, random_index};
use crate::Instance;
use crate::constants::CONSISTENT_HASH_VIRTUAL_NODES;
use dashmap::DashMap;
use skein::rpc::ServiceKey;
use std::sync::Arc;
use xxhash_rust::xxh3::xxh3_64;

#[derive(Debug)]
struct HashRing {
    /// Hash of the sorted address set the ring was built from.
    fingerprint: u64,
    addresses: Vec<String>,
    /// `(point, index into addresses)`, sorted by point.
    points: Vec<(u64, usize)>,
}

impl HashRing {
    fn build(fingerprint: u64, mut addresses: Vec<String>) -> Self {
        addresses.sort();
        addresses.dedup();

        let mut points = Vec::with_capacity(addresses.len() * CONSISTENT_HASH_VIRTUAL_NODES);
        for (index, address) in addresses.iter().enumerate() {
            for replica in 0..CONSISTENT_HASH_VIRTUAL_NODES {
                let point = xxh3_64(format!("{address}#{replica}").as_bytes());
                points.push((point, index));
            }
        }
        points.sort_unstable();

        Self {
            fingerprint,
            addresses,
            points,
        }
    }

    fn lookup(&self, hash: u64) -> Option<&str> {
        let at = self.points.partition_point(|(point, _)| *point < hash);
        let (_, index) = self.points.get(at).or_else(|| self.points.first())?;
        self.addresses.get(*index).map(String::as_str)
    }
}

fn fingerprint(candidates: &[Instance]) -> u64 {
    let mut addresses: Vec<&str> = candidates.iter().map(|i| i.address.as_str()).collect();
    addresses.sort_unstable();
    xxh3_64(addresses.join("\n").as_bytes())
}

/// Maps each call's hash key to a stable instance.
///
/// Instances sit on an xxh3 ring with many virtual nodes each, so adding or
/// removing one instance only moves the keys that fell on its arcs. Rings are
/// cached per service key and rebuilt when the instance set changes. Calls
/// without a hash key are spread at random.
#[derive(Debug, Default)]
pub struct ConsistentHashBalancer {
    rings: DashMap<ServiceKey, Arc<HashRing>>,
}

impl ConsistentHashBalancer {
    fn ring_for(&self, key: &ServiceKey, candidates: &[Instance]) -> Arc<HashRing> {
        let fingerprint = fingerprint(candidates);
        if let Some(ring) = self.rings.get(key) {
            if ring.fingerprint == fingerprint {
                return ring.clone();
            }
        }

        tracing::debug!(service = %key, instances = candidates.len(), "Rebuilding hash ring");
        let ring = Arc::new(HashRing::build(
            fingerprint,
            candidates.iter().map(|i| i.address.clone()).collect(),
        ));
        self.rings.insert(key.clone(), ring.clone());
        ring
    }
}

impl LoadBalancer for ConsistentHashBalancer {
    fn code(&self) -> &'static str {
        "consistent_hash"
    }

    fn pick(&self, key: &ServiceKey, candidates: &[Instance], ctx: &SelectContext<'_>) -> usize {
        let Some(hash_key) = ctx.hash_key else {
            return random_index(candidates.len());
        };

        let ring = self.ring_for(key, candidates);
        ring.lookup(xxh3_64(hash_key))
            .and_then(|address| candidates.iter().position(|i| i.address == address))
            .unwrap_or(0)
    }
}
