//! # Fan-out Registry
//!
//! Subscription registry and fan-out router for a message-bus gateway.
//! Client sessions subscribe to resources identified by a type and an id;
//! when a resource changes, its payload is delivered once to every
//! subscribed session.
//!
//! ## Core Concepts
//!
//! - **Registry**: Subscriptions indexed by resource and by session, kept
//!   in process or in a shared key-value store
//! - **Snapshot cache**: The last payload per resource, replayed to late
//!   subscribers until it expires
//! - **Router**: Turns inbound commands into registry changes and
//!   per-subscriber messages
//! - **Cleanup**: Periodic repair of index pointers whose records expired
//!
//! ## Example
//!
//! ```ignore
//! use fanout_registry::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryKvStore::new());
//! let registry = build_registry(&RegistryConfig::default(), None)?;
//! let (publisher, outbound) = ChannelPublisher::unbounded();
//! let router = FanoutRouter::new(
//!     SubscriptionManager::new(registry),
//!     SnapshotCache::new(store),
//!     publisher,
//!     RouterConfig::default(),
//! );
//!
//! let ctx = EventContext::new().with_session("s1");
//! router.subscribe(&Subscribe { resources: vec![ResourceSelector::new("inventory", "all")] }, &ctx)?;
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod kv;
pub mod manager;
pub mod registry;
pub mod router;
pub mod scheduler;
pub mod snapshot;
pub mod transport;
pub mod types;
pub mod validation;

// Re-exports
pub use config::{BackendKind, RegistryConfig, RouterConfig};
pub use error::{Result, SubscriptionError};
pub use events::{
    EventContext, InboundEvent, ResourceMessage, ResourceSelector, SessionClosed,
    SnapshotRequested, Subscribe, SubscribeInternal, Subscribed, Unsubscribe, Unsubscribed,
};
pub use kv::{KvError, KvStore, MemoryKvStore};
#[cfg(feature = "redis-store")]
pub use kv::RedisKvStore;
pub use manager::SubscriptionManager;
pub use registry::{
    build_registry, CleanupReport, InMemoryRegistry, KvRegistry, SubscriptionRegistry,
};
pub use router::{FanoutReport, FanoutRouter, HandlerResult};
pub use scheduler::CleanupScheduler;
pub use snapshot::{SnapshotCache, MAX_SNAPSHOT_TTL_SECS};
pub use transport::{
    ChannelPublisher, ExchangeType, OutboundMessage, OutboundReceiver, Publisher, RoutingDetails,
    Scope, TransportError,
};
pub use types::{Resource, Snapshot, StorageKey, Subscription};
pub use validation::{validate, ValidationError};
