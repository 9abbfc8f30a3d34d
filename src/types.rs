//! Core types for the subscription registry.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A subscribable entity, identified by type and id.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Resource {
    pub resource_type: String,
    pub resource_id: String,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Resource({}|{})", self.resource_type, self.resource_id)
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.resource_type, self.resource_id)
    }
}

/// A session's interest in one resource.
///
/// `session_id` is `None` only for transient, internally generated
/// subscriptions; those are never indexed by session.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subscription {
    pub resource_type: String,
    pub resource_id: String,
    /// Stored under the camel-case name so existing records stay readable.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<String>,
}

impl Subscription {
    pub fn new(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
            session_id,
        }
    }

    /// Subscription owned by a session.
    pub fn for_session(
        resource_type: impl Into<String>,
        resource_id: impl Into<String>,
        session_id: impl Into<String>,
    ) -> Self {
        Self::new(resource_type, resource_id, Some(session_id.into()))
    }

    /// The resource this subscription points at.
    pub fn resource(&self) -> Resource {
        Resource::new(self.resource_type.clone(), self.resource_id.clone())
    }

    /// Session-independent id used to correlate request/response messages.
    ///
    /// Never use this to store subscriptions: two sessions subscribed to the
    /// same resource share a correlation id. See [`StorageKey`].
    pub fn correlation_id(&self) -> String {
        format!("{}-{}", self.resource_type, self.resource_id)
    }

    /// Key that identifies this exact subscription in the registry.
    pub fn storage_key(&self) -> StorageKey {
        StorageKey {
            session_id: self.session_id.clone(),
            resource: self.resource(),
        }
    }
}

/// Registry key covering the full (session, type, id) triple.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorageKey {
    pub session_id: Option<String>,
    pub resource: Resource,
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({self})")
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.session_id {
            Some(session_id) => write!(f, "{}|{}", session_id, self.resource),
            None => write!(f, "<internal>|{}", self.resource),
        }
    }
}

/// Last published state of a resource, kept for replay to new subscribers.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub event_name: String,
    pub routing_key: String,
    pub message: Vec<u8>,
}

impl Snapshot {
    pub fn new(
        event_name: impl Into<String>,
        routing_key: impl Into<String>,
        message: Vec<u8>,
    ) -> Self {
        Self {
            event_name: event_name.into(),
            routing_key: routing_key.into(),
            message,
        }
    }
}
