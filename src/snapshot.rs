//! Short-lived cache of the last payload published for each resource.
//!
//! Entries only ever leave the cache by expiring; a newer update for the
//! same resource overwrites the payload and restarts the expiry.

use crate::error::Result;
use crate::kv::KvStore;
use crate::registry::keys;
use crate::types::Snapshot;
use std::time::Duration;
use tracing::{debug, warn};

/// Longest TTL a snapshot is cached for; larger requests are clamped.
pub const MAX_SNAPSHOT_TTL_SECS: i64 = i32::MAX as i64;

/// Snapshot cache backed by a [`KvStore`].
pub struct SnapshotCache<S> {
    store: S,
}

impl<S: KvStore> SnapshotCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Cache `snapshot` for `ttl_seconds`. Non-positive TTLs are ignored and
    /// TTLs above [`MAX_SNAPSHOT_TTL_SECS`] are clamped.
    pub fn insert(
        &self,
        resource_type: &str,
        resource_id: &str,
        snapshot: &Snapshot,
        ttl_seconds: i64,
    ) -> Result<()> {
        if ttl_seconds <= 0 {
            warn!(
                resource_type = %resource_type,
                resource_id = %resource_id,
                ttl = ttl_seconds,
                "not caching snapshot with non-positive ttl"
            );
            return Ok(());
        }

        let key = keys::snapshot_key(resource_type, resource_id);
        debug!(resource_type = %resource_type, resource_id = %resource_id, key = %key, "inserting snapshot");

        let bytes = rmp_serde::to_vec(snapshot)?;
        self.store.set(&key, bytes, Some(cache_duration(ttl_seconds)))?;
        Ok(())
    }

    /// The cached snapshot, if one is present and unexpired.
    pub fn get(&self, resource_type: &str, resource_id: &str) -> Result<Option<Snapshot>> {
        let key = keys::snapshot_key(resource_type, resource_id);
        match self.store.get(&key)? {
            Some(bytes) => Ok(Some(rmp_serde::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

fn cache_duration(ttl_seconds: i64) -> Duration {
    if ttl_seconds > MAX_SNAPSHOT_TTL_SECS {
        debug!(ttl = ttl_seconds, max = MAX_SNAPSHOT_TTL_SECS, "clamping snapshot ttl");
    }
    Duration::from_secs(ttl_seconds.clamp(0, MAX_SNAPSHOT_TTL_SECS) as u64)
}
