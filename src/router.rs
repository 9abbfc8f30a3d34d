//! Fan-out router: turns inbound commands and resource updates into
//! registry changes and per-subscriber messages.
//!
//! On subscribe the router emits, in order:
//! 1. a `subscribed` acknowledgement to the session
//! 2. the cached snapshot of the resource, if one exists
//! 3. an internal `snapshot-requested` message so the owner publishes fresh state
//!
//! On a resource update it caches the payload when the message carries a
//! cache TTL, then emits one message per subscriber. A failed delivery is
//! logged and does not stop delivery to the remaining subscribers.

use crate::config::RouterConfig;
use crate::error::{Result, SubscriptionError};
use crate::events::{
    EventContext, InboundEvent, OutboundEvent, ResourceMessage, ResourceSelector, SessionClosed,
    SnapshotRequested, Subscribe, SubscribeInternal, Subscribed, Unsubscribe, Unsubscribed,
};
use crate::kv::KvStore;
use crate::manager::SubscriptionManager;
use crate::snapshot::SnapshotCache;
use crate::transport::{ExchangeType, Publisher, RoutingDetails, Scope};
use crate::types::{Snapshot, Subscription};
use crate::validation;
use tracing::{debug, info, warn};

/// Outcome of one resource update.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FanoutReport {
    /// Subscribers found for the resource.
    pub subscribers: usize,
    /// Messages accepted by the transport.
    pub delivered: usize,
    /// Messages the transport refused.
    pub failed: usize,
}

/// What a handler produced for an inbound message.
#[derive(Clone, Debug, PartialEq)]
pub enum HandlerResult {
    Done,
    Unsubscribed(Unsubscribed),
    Fanout(FanoutReport),
}

/// Routes subscriptions and resource updates.
pub struct FanoutRouter<P, S> {
    manager: SubscriptionManager,
    snapshots: SnapshotCache<S>,
    publisher: P,
    config: RouterConfig,
}

impl<P: Publisher, S: KvStore> FanoutRouter<P, S> {
    pub fn new(
        manager: SubscriptionManager,
        snapshots: SnapshotCache<S>,
        publisher: P,
        config: RouterConfig,
    ) -> Self {
        Self {
            manager,
            snapshots,
            publisher,
            config,
        }
    }

    pub fn manager(&self) -> &SubscriptionManager {
        &self.manager
    }

    /// Dispatch an inbound message to its handler.
    pub fn deliver(&self, event: InboundEvent, ctx: &EventContext) -> Result<HandlerResult> {
        match event {
            InboundEvent::Subscribe(subscribe) => {
                self.subscribe(&subscribe, ctx)?;
                Ok(HandlerResult::Done)
            }
            InboundEvent::SubscribeInternal(subscribe) => {
                self.subscribe_internal(&subscribe, ctx)?;
                Ok(HandlerResult::Done)
            }
            InboundEvent::Unsubscribe(unsubscribe) => {
                Ok(HandlerResult::Unsubscribed(self.unsubscribe(&unsubscribe, ctx)?))
            }
            InboundEvent::SessionClosed(closed) => {
                self.session_closed(&closed)?;
                Ok(HandlerResult::Done)
            }
            InboundEvent::ResourceUpdate(message) => {
                Ok(HandlerResult::Fanout(self.resource_updated(&message, ctx)?))
            }
        }
    }

    /// Subscribe the calling session to every listed resource.
    pub fn subscribe(&self, subscribe: &Subscribe, ctx: &EventContext) -> Result<()> {
        debug!(session_id = ?ctx.session_id, resources = subscribe.resources.len(), "subscribe received");
        for resource in &subscribe.resources {
            self.subscribe_resource(
                ctx.session_id.as_deref(),
                resource.resource_type.as_deref(),
                resource.resource_id.as_deref(),
            )?;
        }
        Ok(())
    }

    pub fn subscribe_internal(&self, subscribe: &SubscribeInternal, ctx: &EventContext) -> Result<()> {
        debug!(session_id = ?ctx.session_id, "subscribe-internal received");
        self.subscribe_resource(
            ctx.session_id.as_deref(),
            subscribe.resource_type.as_deref(),
            subscribe.resource_id.as_deref(),
        )
    }

    /// Remove the calling session's subscriptions to the listed resources.
    ///
    /// Every entry needs a resource type; an entry without a resource id
    /// removes all of the session's subscriptions to that type.
    pub fn unsubscribe(&self, unsubscribe: &Unsubscribe, ctx: &EventContext) -> Result<Unsubscribed> {
        debug!(session_id = ?ctx.session_id, resources = unsubscribe.resources.len(), "unsubscribe received");

        for resource in &unsubscribe.resources {
            match resource.resource_type.as_deref() {
                None | Some("") => {
                    return Err(SubscriptionError::BadRequest(
                        "missing resource type information".to_string(),
                    ))
                }
                Some(resource_type) if !validation::is_kebab_case(resource_type) => {
                    return Err(SubscriptionError::BadRequest(format!(
                        "resource type must be kebab-case, got {resource_type:?}"
                    )))
                }
                Some(_) => {}
            }
        }

        let reply = Unsubscribed {
            resources: unsubscribe.resources.clone(),
        };

        let Some(session_id) = ctx.session_id.as_deref() else {
            debug!("unsubscribe without session, nothing to remove");
            return Ok(reply);
        };

        for ResourceSelector {
            resource_type,
            resource_id,
        } in &unsubscribe.resources
        {
            let resource_type = resource_type.as_deref().unwrap_or_default();
            self.manager
                .unsubscribe(session_id, resource_type, resource_id.as_deref())?;
        }

        let routing = self.session_routing(
            Unsubscribed::NAME,
            self.session_routing_key(Unsubscribed::NAME),
            Some(session_id.to_string()),
        );
        self.send(&reply, routing.build())?;
        Ok(reply)
    }

    pub fn session_closed(&self, closed: &SessionClosed) -> Result<()> {
        info!(session_id = %closed.session_id, user_id = ?closed.user_id, "session closed");
        self.manager.unsubscribe_session(&closed.session_id)
    }

    /// Fan a resource update out to every subscriber.
    pub fn resource_updated(&self, message: &ResourceMessage, ctx: &EventContext) -> Result<FanoutReport> {
        let resource_type = message.resource_type.as_str();
        let resource_id = message.resource_id.as_str();
        let event_name = ctx
            .event_type
            .as_deref()
            .ok_or(SubscriptionError::MissingHeader(crate::events::EVENT_TYPE_HEADER))?;

        let payload = serde_json::to_vec(&message.payload)?;
        let routing_key = self.session_routing_key(event_name);

        if let Some(ttl) = ctx.cache_ttl {
            let snapshot = Snapshot::new(event_name, routing_key.clone(), payload.clone());
            if let Err(e) = self.snapshots.insert(resource_type, resource_id, &snapshot, ttl) {
                warn!(
                    resource_type = %resource_type,
                    resource_id = %resource_id,
                    error = %e,
                    "could not cache snapshot"
                );
            }
        }

        let subscriptions = self.manager.get_subscriptions(resource_type, resource_id)?;
        let mut report = FanoutReport {
            subscribers: subscriptions.len(),
            ..Default::default()
        };
        if subscriptions.is_empty() {
            return Ok(report);
        }

        for subscription in &subscriptions {
            let routing = self
                .session_routing(event_name, routing_key.clone(), subscription.session_id.clone())
                .subscription_id(subscription.correlation_id())
                .build();

            debug!(
                exchange = %routing.exchange,
                routing_key = %routing.routing_key,
                session_id = ?subscription.session_id,
                "sending resource message"
            );
            match self.publisher.publish(&routing, &payload) {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(
                        resource_type = %resource_type,
                        resource_id = %resource_id,
                        session_id = ?subscription.session_id,
                        error = %e,
                        "could not send resource message"
                    );
                }
            }
        }
        Ok(report)
    }

    fn subscribe_resource(
        &self,
        session_id: Option<&str>,
        resource_type: Option<&str>,
        resource_id: Option<&str>,
    ) -> Result<()> {
        let subscription = Subscription::new(
            resource_type.unwrap_or_default(),
            resource_id.unwrap_or_default(),
            session_id.map(str::to_string),
        );
        self.manager.add_subscription(&subscription)?;

        let correlation_id = subscription.correlation_id();
        let subscribed = Subscribed {
            resource_type: subscription.resource_type.clone(),
            resource_id: subscription.resource_id.clone(),
        };
        let routing = self
            .session_routing(
                Subscribed::NAME,
                self.session_routing_key(Subscribed::NAME),
                subscription.session_id.clone(),
            )
            .subscription_id(correlation_id.as_str())
            .build();
        self.send(&subscribed, routing)?;

        self.replay_snapshot(&subscription)?;
        self.request_snapshot(&subscription)
    }

    /// Send the cached snapshot, if any, to the new subscriber only.
    fn replay_snapshot(&self, subscription: &Subscription) -> Result<()> {
        let snapshot = match self
            .snapshots
            .get(&subscription.resource_type, &subscription.resource_id)
        {
            Ok(Some(snapshot)) => snapshot,
            Ok(None) => return Ok(()),
            Err(e) => {
                warn!(
                    resource_type = %subscription.resource_type,
                    resource_id = %subscription.resource_id,
                    error = %e,
                    "could not read cached snapshot, skipping replay"
                );
                return Ok(());
            }
        };

        info!(
            resource_type = %subscription.resource_type,
            resource_id = %subscription.resource_id,
            "found snapshot on subscribe, sending snapshot"
        );
        let routing = self
            .session_routing(
                &snapshot.event_name,
                snapshot.routing_key.clone(),
                subscription.session_id.clone(),
            )
            .subscription_id(subscription.correlation_id())
            .build();
        self.publisher.publish(&routing, &snapshot.message)?;
        Ok(())
    }

    fn request_snapshot(&self, subscription: &Subscription) -> Result<()> {
        let exchange = self.config.snapshot_requested_exchange.as_str();
        let routing = RoutingDetails::builder(exchange)
            .exchange(exchange)
            .exchange_type(ExchangeType::Topic)
            .routing_key(subscription.resource_type.as_str())
            .scope(SnapshotRequested::SCOPE)
            .subscription_id(subscription.correlation_id())
            .build();
        let request = SnapshotRequested {
            resource_type: subscription.resource_type.clone(),
            resource_id: subscription.resource_id.clone(),
        };
        self.send(&request, routing)
    }

    fn session_routing_key(&self, event_name: &str) -> String {
        format!("{}.{}", event_name, self.config.session_exchange)
    }

    fn session_routing(
        &self,
        event_name: &str,
        routing_key: String,
        session_id: Option<String>,
    ) -> crate::transport::RoutingDetailsBuilder {
        RoutingDetails::builder(event_name)
            .exchange(self.config.session_exchange.as_str())
            .exchange_type(ExchangeType::Topic)
            .routing_key(routing_key)
            .scope(Scope::Session)
            .session_id(session_id)
    }

    fn send<E: OutboundEvent>(&self, event: &E, routing: RoutingDetails) -> Result<()> {
        let payload = serde_json::to_vec(event)?;
        self.publisher.publish(&routing, &payload)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::MemoryKvStore;
    use crate::registry::InMemoryRegistry;
    use crate::transport::{ChannelPublisher, OutboundReceiver};
    use serde_json::json;
    use std::sync::Arc;

    fn router() -> (FanoutRouter<ChannelPublisher, Arc<MemoryKvStore>>, OutboundReceiver) {
        let (publisher, receiver) = ChannelPublisher::unbounded();
        let router = FanoutRouter::new(
            SubscriptionManager::new(Arc::new(InMemoryRegistry::new())),
            SnapshotCache::new(Arc::new(MemoryKvStore::new())),
            publisher,
            RouterConfig::default(),
        );
        (router, receiver)
    }

    #[test]
    fn test_subscribe_emits_ack_then_snapshot_request() {
        let (router, receiver) = router();
        let ctx = EventContext::new().with_session("s1");

        router
            .subscribe(
                &Subscribe {
                    resources: vec![ResourceSelector::new("inventory", "all")],
                },
                &ctx,
            )
            .unwrap();

        let messages = receiver.drain();
        assert_eq!(messages.len(), 2);

        let ack = &messages[0];
        assert_eq!(ack.routing.event_name, "subscribed");
        assert_eq!(ack.routing.routing_key, "subscribed.session");
        assert_eq!(ack.routing.scope, Scope::Session);
        assert_eq!(ack.routing.session_id.as_deref(), Some("s1"));
        assert_eq!(ack.routing.subscription_id.as_deref(), Some("inventory-all"));
        assert_eq!(ack.json().unwrap(), json!({"resource_type": "inventory", "resource_id": "all"}));

        let request = &messages[1];
        assert_eq!(request.routing.event_name, "snapshot-requested");
        assert_eq!(request.routing.exchange, "snapshot-requested");
        assert_eq!(request.routing.routing_key, "inventory");
        assert_eq!(request.routing.scope, Scope::Internal);
    }

    #[test]
    fn test_invalid_subscribe_emits_nothing() {
        let (router, receiver) = router();
        let ctx = EventContext::new().with_session("s1");

        let result = router.subscribe_internal(
            &SubscribeInternal {
                resource_type: Some("Inventory".to_string()),
                resource_id: Some("all".to_string()),
            },
            &ctx,
        );

        assert!(matches!(result, Err(SubscriptionError::Validation(_))));
        assert!(receiver.drain().is_empty());
    }

    #[test]
    fn test_update_without_event_type_fails() {
        let (router, _receiver) = router();
        let message = ResourceMessage {
            resource_type: "cart".to_string(),
            resource_id: "c1".to_string(),
            payload: json!({}),
        };

        let result = router.resource_updated(&message, &EventContext::new());
        assert!(matches!(result, Err(SubscriptionError::MissingHeader(_))));
    }

    #[test]
    fn test_unsubscribe_requires_resource_type() {
        let (router, receiver) = router();
        let ctx = EventContext::new().with_session("s1");

        let result = router.unsubscribe(
            &Unsubscribe {
                resources: vec![ResourceSelector::default()],
            },
            &ctx,
        );

        assert!(matches!(result, Err(SubscriptionError::BadRequest(_))));
        assert!(receiver.drain().is_empty());
    }

    #[test]
    fn test_unsubscribe_rejects_pattern_like_types() {
        let (router, receiver) = router();
        let ctx = EventContext::new().with_session("s1");
        router
            .subscribe(
                &Subscribe {
                    resources: vec![ResourceSelector::new("cart", "c1")],
                },
                &ctx,
            )
            .unwrap();
        receiver.drain();

        for resource_type in ["*", "car?", "Cart"] {
            let result = router.unsubscribe(
                &Unsubscribe {
                    resources: vec![ResourceSelector::all_of_type(resource_type)],
                },
                &ctx,
            );
            assert!(matches!(result, Err(SubscriptionError::BadRequest(_))), "{resource_type}");
        }

        assert!(receiver.drain().is_empty());
        assert_eq!(router.manager().session_subscriptions("s1").unwrap().len(), 1);
    }
}
