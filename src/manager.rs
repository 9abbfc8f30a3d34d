//! Subscription manager: validation in front of the registry.

use crate::error::Result;
use crate::registry::{CleanupReport, SubscriptionRegistry};
use crate::types::{Resource, Subscription};
use crate::validation;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Validates subscriptions and forwards them to a registry backend.
#[derive(Clone)]
pub struct SubscriptionManager {
    registry: Arc<dyn SubscriptionRegistry>,
}

impl SubscriptionManager {
    pub fn new(registry: Arc<dyn SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    /// The registry behind this manager.
    pub fn registry(&self) -> &Arc<dyn SubscriptionRegistry> {
        &self.registry
    }

    /// Validate and store a subscription.
    pub fn add_subscription(&self, subscription: &Subscription) -> Result<()> {
        validation::validate(subscription)?;
        self.registry.insert(subscription)
    }

    pub fn get_subscriptions(
        &self,
        resource_type: &str,
        resource_id: &str,
    ) -> Result<HashSet<Subscription>> {
        self.registry
            .get_by_resource(&Resource::new(resource_type, resource_id))
    }

    pub fn session_subscriptions(&self, session_id: &str) -> Result<HashSet<Subscription>> {
        self.registry.get_by_session(session_id)
    }

    /// Drop everything a session subscribed to.
    pub fn unsubscribe_session(&self, session_id: &str) -> Result<()> {
        debug!(session_id = %session_id, "removing all subscriptions of session");
        self.registry.remove_session(session_id)
    }

    /// Drop one subscription, or every subscription to `resource_type` when
    /// `resource_id` is `None`.
    pub fn unsubscribe(
        &self,
        session_id: &str,
        resource_type: &str,
        resource_id: Option<&str>,
    ) -> Result<()> {
        self.registry.remove(session_id, resource_type, resource_id)
    }

    /// Periodic repair entry point.
    pub fn cleanup(&self) -> Result<CleanupReport> {
        self.registry.clean_up()
    }
}
