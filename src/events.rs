//! Inbound and outbound message contracts.

use crate::error::{Result, SubscriptionError};
use crate::transport::Scope;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Header carrying the caller's session id.
pub const SESSION_ID_HEADER: &str = "x-session-id";
/// Header carrying the event name of a resource message.
pub const EVENT_TYPE_HEADER: &str = "x-event-type";
/// Header carrying the snapshot cache lifetime in seconds.
pub const CACHE_TTL_HEADER: &str = "x-cache-ttl";

/// Resource reference as it appears on the wire; either field may be absent.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSelector {
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
}

impl ResourceSelector {
    pub fn new(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            resource_id: Some(resource_id.into()),
        }
    }

    /// Every resource of one type.
    pub fn all_of_type(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: Some(resource_type.into()),
            resource_id: None,
        }
    }
}

/// `subscribe`: a client subscribes its session to resources.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscribe {
    pub resources: Vec<ResourceSelector>,
}

/// `subscribe-internal`: a backend service subscribes a session to one resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeInternal {
    #[serde(default)]
    pub resource_type: Option<String>,
    #[serde(default)]
    pub resource_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum UnsubscribeWire {
    Batch { resources: Vec<ResourceSelector> },
    Single(ResourceSelector),
}

impl From<UnsubscribeWire> for Unsubscribe {
    fn from(wire: UnsubscribeWire) -> Self {
        match wire {
            UnsubscribeWire::Batch { resources } => Unsubscribe { resources },
            UnsubscribeWire::Single(resource) => Unsubscribe {
                resources: vec![resource],
            },
        }
    }
}

/// `unsubscribe`: accepts both `{resources: [...]}` and a single
/// `{resource_type, resource_id}` body.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "UnsubscribeWire")]
pub struct Unsubscribe {
    pub resources: Vec<ResourceSelector>,
}

/// `session-closed`: a client session ended.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClosed {
    #[serde(default)]
    pub user_id: Option<String>,
    pub session_id: String,
}

/// A resource changed; `payload` is forwarded to its subscribers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceMessage {
    pub resource_type: String,
    pub resource_id: String,
    pub payload: serde_json::Value,
}

/// `subscribed` acknowledgement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscribed {
    pub resource_type: String,
    pub resource_id: String,
}

/// `unsubscribed` reply.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unsubscribed {
    pub resources: Vec<ResourceSelector>,
}

/// `snapshot-requested`: asks the resource owner to publish fresh state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRequested {
    pub resource_type: String,
    pub resource_id: String,
}

/// Name and audience of an outbound message type.
pub trait OutboundEvent: Serialize {
    const NAME: &'static str;
    const SCOPE: Scope;
}

impl OutboundEvent for Subscribed {
    const NAME: &'static str = "subscribed";
    const SCOPE: Scope = Scope::Session;
}

impl OutboundEvent for Unsubscribed {
    const NAME: &'static str = "unsubscribed";
    const SCOPE: Scope = Scope::Session;
}

impl OutboundEvent for SnapshotRequested {
    const NAME: &'static str = "snapshot-requested";
    const SCOPE: Scope = Scope::Internal;
}

/// Transport headers that accompany an inbound message.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EventContext {
    pub session_id: Option<String>,
    pub event_type: Option<String>,
    pub cache_ttl: Option<i64>,
}

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_event_type(mut self, event_type: impl Into<String>) -> Self {
        self.event_type = Some(event_type.into());
        self
    }

    pub fn with_cache_ttl(mut self, seconds: i64) -> Self {
        self.cache_ttl = Some(seconds);
        self
    }

    /// Build a context from raw transport headers.
    ///
    /// The cache TTL header must fit a signed 32-bit integer.
    pub fn from_headers(headers: &HashMap<String, String>) -> Result<Self> {
        let cache_ttl = headers
            .get(CACHE_TTL_HEADER)
            .map(|raw| {
                raw.trim().parse::<i32>().map(i64::from).map_err(|_| {
                    SubscriptionError::BadRequest(format!("invalid {CACHE_TTL_HEADER} header: {raw:?}"))
                })
            })
            .transpose()?;

        Ok(Self {
            session_id: headers.get(SESSION_ID_HEADER).cloned(),
            event_type: headers.get(EVENT_TYPE_HEADER).cloned(),
            cache_ttl,
        })
    }
}

/// Every message the router consumes.
#[derive(Clone, Debug, PartialEq)]
pub enum InboundEvent {
    Subscribe(Subscribe),
    SubscribeInternal(SubscribeInternal),
    Unsubscribe(Unsubscribe),
    SessionClosed(SessionClosed),
    ResourceUpdate(ResourceMessage),
}

impl InboundEvent {
    /// Decode a JSON body by its message name.
    pub fn decode(name: &str, body: &[u8]) -> Result<Self> {
        fn parse<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T> {
            serde_json::from_slice(body).map_err(|e| SubscriptionError::Deserialization(e.to_string()))
        }

        match name {
            "subscribe" => Ok(InboundEvent::Subscribe(parse(body)?)),
            "subscribe-internal" => Ok(InboundEvent::SubscribeInternal(parse(body)?)),
            "unsubscribe" => Ok(InboundEvent::Unsubscribe(parse(body)?)),
            "session-closed" => Ok(InboundEvent::SessionClosed(parse(body)?)),
            "resource-update" | "resource-message" => Ok(InboundEvent::ResourceUpdate(parse(body)?)),
            other => Err(SubscriptionError::BadRequest(format!("unknown message {other:?}"))),
        }
    }
}
