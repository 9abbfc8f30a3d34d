//! Subscription registry.
//!
//! The registry keeps three co-maintained views of every live subscription:
//! - by storage key (the subscription itself)
//! - by session id (the keys a session owns)
//! - by resource (the keys pointing at one resource)
//!
//! Two backends implement [`SubscriptionRegistry`]:
//! - [`InMemoryRegistry`]: one process, every mutation atomic across all three views
//! - [`KvRegistry`]: shared key-value store, views repaired by [`SubscriptionRegistry::clean_up`]
//!
//! # Example
//!
//! ```ignore
//! let registry = InMemoryRegistry::new();
//! registry.insert(&Subscription::for_session("inventory", "all", "s1"))?;
//!
//! let subscribers = registry.get_by_resource(&Resource::new("inventory", "all"))?;
//! assert_eq!(subscribers.len(), 1);
//! ```

mod distributed;
pub mod keys;
mod memory;

pub use distributed::KvRegistry;
pub use memory::InMemoryRegistry;

use crate::config::{BackendKind, RegistryConfig};
use crate::error::{Result, SubscriptionError};
use crate::kv::KvStore;
use crate::types::{Resource, Subscription};
use std::collections::HashSet;
use std::sync::Arc;

/// Outcome of an orphan sweep.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Index sets inspected.
    pub sets_scanned: usize,
    /// Dangling pointers removed.
    pub pointers_removed: usize,
    /// Existence checks that failed and were left for the next sweep.
    pub failed_checks: usize,
}

/// Store of subscriptions indexed by session and by resource.
pub trait SubscriptionRegistry: Send + Sync {
    /// Store a subscription. Inserting an identical subscription again is a no-op.
    fn insert(&self, subscription: &Subscription) -> Result<()>;

    /// All subscriptions to a resource. Empty if there are none.
    fn get_by_resource(&self, resource: &Resource) -> Result<HashSet<Subscription>>;

    /// All subscriptions owned by a session. Empty if there are none.
    fn get_by_session(&self, session_id: &str) -> Result<HashSet<Subscription>>;

    /// Remove every subscription owned by a session.
    fn remove_session(&self, session_id: &str) -> Result<()>;

    /// Remove a session's subscription to one resource, or with
    /// `resource_id = None` to every resource of `resource_type`.
    fn remove(&self, session_id: &str, resource_type: &str, resource_id: Option<&str>)
        -> Result<()>;

    /// Number of stored subscriptions.
    fn size(&self) -> Result<usize>;

    /// Number of sessions with at least one indexed subscription.
    fn session_subscription_count(&self) -> Result<usize>;

    /// Drop index entries whose subscription no longer exists.
    fn clean_up(&self) -> Result<CleanupReport>;
}

impl<T: SubscriptionRegistry + ?Sized> SubscriptionRegistry for Arc<T> {
    fn insert(&self, subscription: &Subscription) -> Result<()> {
        (**self).insert(subscription)
    }

    fn get_by_resource(&self, resource: &Resource) -> Result<HashSet<Subscription>> {
        (**self).get_by_resource(resource)
    }

    fn get_by_session(&self, session_id: &str) -> Result<HashSet<Subscription>> {
        (**self).get_by_session(session_id)
    }

    fn remove_session(&self, session_id: &str) -> Result<()> {
        (**self).remove_session(session_id)
    }

    fn remove(
        &self,
        session_id: &str,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> Result<()> {
        (**self).remove(session_id, resource_type, resource_id)
    }

    fn size(&self) -> Result<usize> {
        (**self).size()
    }

    fn session_subscription_count(&self) -> Result<usize> {
        (**self).session_subscription_count()
    }

    fn clean_up(&self) -> Result<CleanupReport> {
        (**self).clean_up()
    }
}

/// Build the registry selected by `config`.
///
/// The distributed backend needs a `store`; the in-memory backend ignores it.
pub fn build_registry(
    config: &RegistryConfig,
    store: Option<Arc<dyn KvStore>>,
) -> Result<Arc<dyn SubscriptionRegistry>> {
    match config.backend {
        BackendKind::InMemory => Ok(Arc::new(InMemoryRegistry::new())),
        BackendKind::Distributed => {
            let store = store.ok_or_else(|| {
                SubscriptionError::InvalidConfig(
                    "distributed backend requires a key-value store".to_string(),
                )
            })?;
            Ok(Arc::new(KvRegistry::new(store, config.subscription_ttl())))
        }
    }
}
