//! In-process registry backend.

use super::{CleanupReport, SubscriptionRegistry};
use crate::error::Result;
use crate::types::{Resource, StorageKey, Subscription};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;

/// Registry held entirely in this process.
///
/// Every mutation runs under one write lock spanning all three indexes, so
/// the indexes agree whenever no mutation is in flight. Reads go straight to
/// the concurrent maps and never wait for writers.
///
/// No two map guards are ever held at once, which keeps readers and the
/// single writer free of lock-order cycles.
pub struct InMemoryRegistry {
    /// Storage key to subscription.
    subscriptions: DashMap<StorageKey, Subscription>,
    /// Session id to its storage keys. Subscriptions without a session are absent.
    by_session: DashMap<String, HashSet<StorageKey>>,
    /// Resource to the storage keys pointing at it.
    by_resource: DashMap<Resource, HashSet<StorageKey>>,
    /// Serializes mutations.
    write_lock: Mutex<()>,
}

impl InMemoryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            subscriptions: DashMap::new(),
            by_session: DashMap::new(),
            by_resource: DashMap::new(),
            write_lock: Mutex::new(()),
        }
    }

    fn resolve(&self, keys: HashSet<StorageKey>) -> HashSet<Subscription> {
        keys.iter()
            .filter_map(|key| self.subscriptions.get(key).map(|s| s.value().clone()))
            .collect()
    }

    /// Remove `keys` from the primary store and from their resource sets,
    /// dropping resource entries that end up empty. Caller holds the write lock.
    fn detach_locked(&self, keys: &HashSet<StorageKey>) {
        for key in keys {
            self.subscriptions.remove(key);

            if let Some(mut entry) = self.by_resource.get_mut(&key.resource) {
                entry.remove(key);
            }
            self.by_resource
                .remove_if(&key.resource, |_, set| set.is_empty());
        }
    }

    fn remove_session_locked(&self, session_id: &str) {
        if let Some((_, keys)) = self.by_session.remove(session_id) {
            self.detach_locked(&keys);
        }
    }
}

impl Default for InMemoryRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionRegistry for InMemoryRegistry {
    /// Sessionless subscriptions are indexed by resource only. No removal
    /// path reaches them, so they live until the process exits.
    fn insert(&self, subscription: &Subscription) -> Result<()> {
        let key = subscription.storage_key();
        let _lock = self.write_lock.lock();

        self.subscriptions.insert(key.clone(), subscription.clone());

        if let Some(session_id) = &subscription.session_id {
            self.by_session
                .entry(session_id.clone())
                .or_default()
                .insert(key.clone());
        }

        self.by_resource
            .entry(key.resource.clone())
            .or_default()
            .insert(key);

        Ok(())
    }

    fn get_by_resource(&self, resource: &Resource) -> Result<HashSet<Subscription>> {
        let keys = self
            .by_resource
            .get(resource)
            .map(|keys| keys.value().clone())
            .unwrap_or_default();
        Ok(self.resolve(keys))
    }

    fn get_by_session(&self, session_id: &str) -> Result<HashSet<Subscription>> {
        let keys = self
            .by_session
            .get(session_id)
            .map(|keys| keys.value().clone())
            .unwrap_or_default();
        Ok(self.resolve(keys))
    }

    fn remove_session(&self, session_id: &str) -> Result<()> {
        let _lock = self.write_lock.lock();
        self.remove_session_locked(session_id);
        Ok(())
    }

    fn remove(
        &self,
        session_id: &str,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> Result<()> {
        let _lock = self.write_lock.lock();

        let Some(session_keys) = self.by_session.get(session_id).map(|k| k.value().clone()) else {
            return Ok(());
        };

        let targets: HashSet<StorageKey> = match resource_id {
            Some(resource_id) => {
                let resource = Resource::new(resource_type, resource_id);
                let resource_keys = self
                    .by_resource
                    .get(&resource)
                    .map(|k| k.value().clone())
                    .unwrap_or_default();
                session_keys.intersection(&resource_keys).cloned().collect()
            }
            None => session_keys
                .iter()
                .filter(|key| key.resource.resource_type == resource_type)
                .cloned()
                .collect(),
        };

        if targets.is_empty() {
            return Ok(());
        }

        self.detach_locked(&targets);

        let session_now_empty = match self.by_session.get_mut(session_id) {
            Some(mut keys) => {
                keys.retain(|key| !targets.contains(key));
                keys.is_empty()
            }
            None => false,
        };
        if session_now_empty {
            self.remove_session_locked(session_id);
        }

        Ok(())
    }

    fn size(&self) -> Result<usize> {
        Ok(self.subscriptions.len())
    }

    fn session_subscription_count(&self) -> Result<usize> {
        Ok(self.by_session.len())
    }

    fn clean_up(&self) -> Result<CleanupReport> {
        // Mutations are atomic across indexes, so there is nothing to repair.
        Ok(CleanupReport::default())
    }
}
