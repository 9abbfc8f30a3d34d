//! Registry backend on a shared key-value store.
//!
//! Each logical operation is several independent store commands. A failure
//! between them can leave set members that point at missing primary records,
//! and primary records also expire on their own. Readers skip such members
//! and [`KvRegistry::clean_up`] removes them.

use super::keys::{
    self, RESOURCE_SET_PATTERN, SESSION_SET_PATTERN, SUBSCRIPTION_PATTERN,
};
use super::{CleanupReport, SubscriptionRegistry};
use crate::error::Result;
use crate::kv::{scan_all, scan_count, KvStore};
use crate::types::{Resource, Subscription};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Registry stored in a [`KvStore`] shared between instances.
pub struct KvRegistry<S> {
    store: S,
    /// Expiry of primary records, refreshed on every insert.
    ttl: Duration,
}

impl<S: KvStore> KvRegistry<S> {
    pub fn new(store: S, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// The underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    fn load(&self, subscription_keys: Vec<String>) -> Result<HashSet<Subscription>> {
        if subscription_keys.is_empty() {
            return Ok(HashSet::new());
        }

        let records = self.store.mget(&subscription_keys)?;
        let subscriptions = subscription_keys
            .iter()
            .zip(records)
            .filter_map(|(key, record)| {
                let bytes = record?;
                match serde_json::from_slice::<Subscription>(&bytes) {
                    Ok(subscription) => Some(subscription),
                    Err(e) => {
                        debug!(key = %key, error = %e, "skipping undecodable subscription record");
                        None
                    }
                }
            })
            .collect();
        Ok(subscriptions)
    }

    /// Delete `ids` and unlink them from one session set and one resource set.
    fn remove_for_resource_and_session(
        &self,
        session_set: &str,
        resource_set: &str,
        ids: Vec<String>,
    ) -> Result<()> {
        if ids.is_empty() {
            return Ok(());
        }
        self.store.del(&ids)?;
        self.store.srem(session_set, &ids)?;
        self.store.srem(resource_set, &ids)?;
        Ok(())
    }

    /// Remove members whose primary record is gone from every set matching `pattern`.
    fn clean_pointers(&self, pattern: &str, report: &mut CleanupReport) -> Result<()> {
        let mut removals: HashMap<String, Vec<String>> = HashMap::new();

        for set_key in scan_all(&self.store, pattern)? {
            report.sets_scanned += 1;
            let members = match self.store.smembers(&set_key) {
                Ok(members) => members,
                Err(e) => {
                    warn!(set = %set_key, error = %e, "could not read index set, retrying next sweep");
                    report.failed_checks += 1;
                    continue;
                }
            };

            for member in members {
                match self.store.exists(&member) {
                    Ok(true) => {}
                    Ok(false) => removals.entry(set_key.clone()).or_default().push(member),
                    Err(e) => {
                        debug!(key = %member, error = %e, "existence check failed");
                        report.failed_checks += 1;
                    }
                }
            }
        }

        for (set_key, dangling) in removals {
            match self.store.srem(&set_key, &dangling) {
                Ok(removed) => report.pointers_removed += removed,
                Err(e) => {
                    warn!(set = %set_key, error = %e, "could not remove dangling pointers");
                    report.failed_checks += dangling.len();
                }
            }
        }
        Ok(())
    }
}

impl<S: KvStore> SubscriptionRegistry for KvRegistry<S> {
    fn insert(&self, subscription: &Subscription) -> Result<()> {
        let (Some(session_id), Some(subscription_key)) = (
            subscription.session_id.as_deref(),
            keys::subscription_key(subscription),
        ) else {
            return Ok(());
        };

        let record = serde_json::to_vec(subscription)?;
        let members = [subscription_key.clone()];

        self.store.set(&subscription_key, record, Some(self.ttl))?;
        self.store.sadd(&keys::session_set_key(session_id), &members)?;
        self.store.sadd(
            &keys::resource_set_key(&subscription.resource_type, &subscription.resource_id),
            &members,
        )?;
        Ok(())
    }

    fn get_by_resource(&self, resource: &Resource) -> Result<HashSet<Subscription>> {
        let set_key = keys::resource_set_key(&resource.resource_type, &resource.resource_id);
        let ids = self.store.smembers(&set_key)?;
        self.load(ids)
    }

    fn get_by_session(&self, session_id: &str) -> Result<HashSet<Subscription>> {
        let ids = self.store.smembers(&keys::session_set_key(session_id))?;
        self.load(ids)
    }

    fn remove_session(&self, session_id: &str) -> Result<()> {
        let session_set = keys::session_set_key(session_id);
        let ids = self.store.smembers(&session_set)?;

        let mut by_resource_set: HashMap<String, Vec<String>> = HashMap::new();
        for id in &ids {
            match keys::resource_set_for(session_id, id) {
                Some(resource_set) => by_resource_set.entry(resource_set).or_default().push(id.clone()),
                None => debug!(key = %id, session_id = %session_id, "unexpected member in session set"),
            }
        }
        for (resource_set, members) in &by_resource_set {
            self.store.srem(resource_set, members)?;
        }

        let mut doomed = ids;
        doomed.push(session_set);
        self.store.del(&doomed)?;
        Ok(())
    }

    fn remove(
        &self,
        session_id: &str,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> Result<()> {
        let session_set = keys::session_set_key(session_id);
        if !self.store.exists(&session_set)? {
            return Ok(());
        }
        let session_ids: HashSet<String> = self.store.smembers(&session_set)?.into_iter().collect();

        match resource_id {
            Some(resource_id) => {
                let resource_set = keys::resource_set_key(resource_type, resource_id);
                let intersection = self
                    .store
                    .smembers(&resource_set)?
                    .into_iter()
                    .filter(|id| session_ids.contains(id))
                    .collect();
                self.remove_for_resource_and_session(&session_set, &resource_set, intersection)?;
            }
            None => {
                let pattern = keys::resource_type_pattern(resource_type);
                for resource_set in scan_all(&self.store, &pattern)? {
                    let intersection = self
                        .store
                        .smembers(&resource_set)?
                        .into_iter()
                        .filter(|id| session_ids.contains(id))
                        .collect();
                    self.remove_for_resource_and_session(&session_set, &resource_set, intersection)?;
                }
            }
        }
        Ok(())
    }

    fn size(&self) -> Result<usize> {
        Ok(scan_count(&self.store, SUBSCRIPTION_PATTERN)?)
    }

    fn session_subscription_count(&self) -> Result<usize> {
        Ok(scan_count(&self.store, SESSION_SET_PATTERN)?)
    }

    fn clean_up(&self) -> Result<CleanupReport> {
        let mut report = CleanupReport::default();
        self.clean_pointers(RESOURCE_SET_PATTERN, &mut report)?;
        self.clean_pointers(SESSION_SET_PATTERN, &mut report)?;

        info!(
            sets_scanned = report.sets_scanned,
            pointers_removed = report.pointers_removed,
            failed_checks = report.failed_checks,
            "subscription index sweep finished"
        );
        Ok(report)
    }
}
