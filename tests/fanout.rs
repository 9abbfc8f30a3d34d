//! Router scenarios driven end to end through a channel publisher.

use fanout_registry::{
    ChannelPublisher, EventContext, FanoutReport, FanoutRouter, HandlerResult, InboundEvent,
    KvRegistry, KvStore, MemoryKvStore, OutboundReceiver, ResourceMessage, ResourceSelector,
    RouterConfig, Scope, SessionClosed, SnapshotCache, Subscribe, SubscriptionError,
    SubscriptionManager,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

type Router = FanoutRouter<ChannelPublisher, Arc<MemoryKvStore>>;

struct Gateway {
    store: Arc<MemoryKvStore>,
    router: Router,
    outbound: OutboundReceiver,
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

fn gateway_with(publisher: ChannelPublisher, outbound: OutboundReceiver) -> Gateway {
    init_tracing();
    let store = Arc::new(MemoryKvStore::new());
    let registry = Arc::new(KvRegistry::new(store.clone(), Duration::from_secs(3600)));
    let router = FanoutRouter::new(
        SubscriptionManager::new(registry),
        SnapshotCache::new(store.clone()),
        publisher,
        RouterConfig::default(),
    );
    Gateway {
        store,
        router,
        outbound,
    }
}

fn gateway() -> Gateway {
    let (publisher, outbound) = ChannelPublisher::unbounded();
    gateway_with(publisher, outbound)
}

fn subscribe(router: &Router, session: &str, resource_type: &str, resource_id: &str) {
    router
        .subscribe(
            &Subscribe {
                resources: vec![ResourceSelector::new(resource_type, resource_id)],
            },
            &EventContext::new().with_session(session),
        )
        .unwrap();
}

fn inventory_update(count: u32) -> ResourceMessage {
    ResourceMessage {
        resource_type: "inventory".to_string(),
        resource_id: "all".to_string(),
        payload: json!({"items": count}),
    }
}

fn event_names(outbound: &OutboundReceiver) -> Vec<String> {
    outbound
        .drain()
        .into_iter()
        .map(|m| m.routing.event_name)
        .collect()
}

// --- Fan-out ---

#[test]
fn test_update_reaches_every_subscriber_once() {
    let gw = gateway();
    for session in ["s1", "s2", "s3"] {
        subscribe(&gw.router, session, "inventory", "all");
    }
    subscribe(&gw.router, "s4", "cart", "c1");
    gw.outbound.drain();

    let ctx = EventContext::new().with_event_type("inventory-changed");
    let report = gw.router.resource_updated(&inventory_update(7), &ctx).unwrap();

    assert_eq!(
        report,
        FanoutReport {
            subscribers: 3,
            delivered: 3,
            failed: 0,
        }
    );

    let messages = gw.outbound.drain();
    let mut sessions: Vec<String> = messages
        .iter()
        .filter_map(|m| m.routing.session_id.clone())
        .collect();
    sessions.sort();
    assert_eq!(sessions, vec!["s1", "s2", "s3"]);

    for message in &messages {
        assert_eq!(message.routing.event_name, "inventory-changed");
        assert_eq!(message.routing.exchange, "session");
        assert_eq!(message.routing.routing_key, "inventory-changed.session");
        assert_eq!(message.routing.scope, Scope::Session);
        assert_eq!(message.routing.subscription_id.as_deref(), Some("inventory-all"));
        assert_eq!(message.json().unwrap(), json!({"items": 7}));
    }
}

#[test]
fn test_update_without_subscribers_sends_nothing() {
    let gw = gateway();
    let ctx = EventContext::new().with_event_type("inventory-changed");

    let report = gw.router.resource_updated(&inventory_update(1), &ctx).unwrap();

    assert_eq!(report, FanoutReport::default());
    assert!(gw.outbound.drain().is_empty());
}

#[test]
fn test_failed_delivery_does_not_stop_fanout() {
    let (publisher, outbound) = ChannelPublisher::unbounded();
    let gw = gateway_with(publisher, outbound);
    for session in ["s1", "s2", "s3"] {
        subscribe(&gw.router, session, "inventory", "all");
    }

    // Swap in a router whose transport holds only two messages.
    let (small, small_outbound) = ChannelPublisher::bounded(2);
    let registry = Arc::new(KvRegistry::new(gw.store.clone(), Duration::from_secs(3600)));
    let router = FanoutRouter::new(
        SubscriptionManager::new(registry),
        SnapshotCache::new(gw.store.clone()),
        small,
        RouterConfig::default(),
    );

    let ctx = EventContext::new().with_event_type("inventory-changed");
    let report = router.resource_updated(&inventory_update(3), &ctx).unwrap();

    assert_eq!(report.subscribers, 3);
    assert_eq!(report.delivered, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(small_outbound.drain().len(), 2);
}

#[test]
fn test_update_requires_event_type() {
    let gw = gateway();
    subscribe(&gw.router, "s1", "inventory", "all");
    gw.outbound.drain();

    let result = gw
        .router
        .resource_updated(&inventory_update(1), &EventContext::new().with_cache_ttl(30));

    assert!(matches!(result, Err(SubscriptionError::MissingHeader("x-event-type"))));
    assert!(gw.outbound.drain().is_empty());
    assert!(!gw.store.exists("resTypeResIdSnap|inventory|all").unwrap());
}

// --- Snapshots ---

#[test]
fn test_late_subscriber_receives_cached_snapshot() {
    let gw = gateway();
    let ctx = EventContext::new()
        .with_event_type("inventory-changed")
        .with_cache_ttl(60);
    gw.router.resource_updated(&inventory_update(5), &ctx).unwrap();

    subscribe(&gw.router, "s9", "inventory", "all");

    let messages = gw.outbound.drain();
    assert_eq!(messages.len(), 3);

    assert_eq!(messages[0].routing.event_name, "subscribed");

    let replay = &messages[1];
    assert_eq!(replay.routing.event_name, "inventory-changed");
    assert_eq!(replay.routing.routing_key, "inventory-changed.session");
    assert_eq!(replay.routing.session_id.as_deref(), Some("s9"));
    assert_eq!(replay.routing.subscription_id.as_deref(), Some("inventory-all"));
    assert_eq!(replay.json().unwrap(), json!({"items": 5}));

    let request = &messages[2];
    assert_eq!(request.routing.event_name, "snapshot-requested");
    assert_eq!(request.routing.routing_key, "inventory");
    assert_eq!(request.routing.scope, Scope::Internal);
    assert_eq!(request.routing.session_id, None);
    assert_eq!(
        request.json().unwrap(),
        json!({"resource_type": "inventory", "resource_id": "all"})
    );
}

#[test]
fn test_newer_update_replaces_snapshot() {
    let gw = gateway();
    let ctx = EventContext::new()
        .with_event_type("inventory-changed")
        .with_cache_ttl(60);
    gw.router.resource_updated(&inventory_update(1), &ctx).unwrap();
    gw.router.resource_updated(&inventory_update(2), &ctx).unwrap();

    subscribe(&gw.router, "s1", "inventory", "all");

    let messages = gw.outbound.drain();
    assert_eq!(messages[1].json().unwrap(), json!({"items": 2}));
}

#[test]
fn test_non_positive_ttl_is_not_cached() {
    let gw = gateway();
    let ctx = EventContext::new()
        .with_event_type("inventory-changed")
        .with_cache_ttl(0);
    gw.router.resource_updated(&inventory_update(1), &ctx).unwrap();

    subscribe(&gw.router, "s1", "inventory", "all");

    assert_eq!(
        event_names(&gw.outbound),
        vec!["subscribed", "snapshot-requested"]
    );
}

#[test]
fn test_oversized_cache_ttl_is_cached_without_panicking() {
    let gw = gateway();
    let event = InboundEvent::decode(
        "resource-update",
        br#"{"resource_type": "inventory", "resource_id": "all", "payload": {"items": 9}}"#,
    )
    .unwrap();
    let ctx = EventContext::new()
        .with_event_type("inventory-changed")
        .with_cache_ttl(i64::MAX);

    gw.router.deliver(event, &ctx).unwrap();
    assert!(gw.store.exists("resTypeResIdSnap|inventory|all").unwrap());

    subscribe(&gw.router, "s1", "inventory", "all");
    let messages = gw.outbound.drain();
    assert_eq!(messages[1].json().unwrap(), json!({"items": 9}));

    let headers = HashMap::from([("x-cache-ttl".to_string(), i64::MAX.to_string())]);
    assert!(matches!(
        EventContext::from_headers(&headers),
        Err(SubscriptionError::BadRequest(_))
    ));
}

#[test]
fn test_unreadable_snapshot_skips_replay() {
    let gw = gateway();
    gw.store
        .set("resTypeResIdSnap|inventory|all", b"garbage".to_vec(), None)
        .unwrap();

    subscribe(&gw.router, "s1", "inventory", "all");

    assert_eq!(
        event_names(&gw.outbound),
        vec!["subscribed", "snapshot-requested"]
    );
}

// --- Subscribe and Unsubscribe ---

#[test]
fn test_subscribe_batch_acknowledges_each_resource() {
    let gw = gateway();
    gw.router
        .subscribe(
            &Subscribe {
                resources: vec![
                    ResourceSelector::new("cart", "c1"),
                    ResourceSelector::new("order", "o1"),
                ],
            },
            &EventContext::new().with_session("s1"),
        )
        .unwrap();

    let acks: Vec<Option<String>> = gw
        .outbound
        .drain()
        .into_iter()
        .filter(|m| m.routing.event_name == "subscribed")
        .map(|m| m.routing.subscription_id)
        .collect();
    assert_eq!(
        acks,
        vec![Some("cart-c1".to_string()), Some("order-o1".to_string())]
    );
    assert_eq!(gw.router.manager().session_subscriptions("s1").unwrap().len(), 2);
}

#[test]
fn test_subscribe_without_session_is_rejected() {
    let gw = gateway();
    let result = gw.router.subscribe(
        &Subscribe {
            resources: vec![ResourceSelector::new("cart", "c1")],
        },
        &EventContext::new(),
    );

    assert!(matches!(result, Err(SubscriptionError::Validation(_))));
    assert!(gw.outbound.drain().is_empty());
}

#[test]
fn test_subscribe_surfaces_transport_failure() {
    let (publisher, outbound) = ChannelPublisher::unbounded();
    drop(outbound);
    let (_, unused) = ChannelPublisher::unbounded();
    let gw = gateway_with(publisher, unused);

    let result = gw.router.subscribe(
        &Subscribe {
            resources: vec![ResourceSelector::new("cart", "c1")],
        },
        &EventContext::new().with_session("s1"),
    );

    assert!(matches!(result, Err(SubscriptionError::Transport(_))));
}

#[test]
fn test_unsubscribe_then_update() {
    let gw = gateway();
    subscribe(&gw.router, "s1", "inventory", "all");
    subscribe(&gw.router, "s2", "inventory", "all");
    gw.outbound.drain();

    let ctx = EventContext::new().with_session("s1");
    let event = InboundEvent::decode(
        "unsubscribe",
        br#"{"resource_type": "inventory", "resource_id": "all"}"#,
    )
    .unwrap();
    let result = gw.router.deliver(event, &ctx).unwrap();

    assert!(matches!(
        &result,
        HandlerResult::Unsubscribed(reply) if reply.resources == vec![ResourceSelector::new("inventory", "all")]
    ));
    let reply = gw.outbound.drain();
    assert_eq!(reply.len(), 1);
    assert_eq!(reply[0].routing.event_name, "unsubscribed");
    assert_eq!(reply[0].routing.session_id.as_deref(), Some("s1"));

    let update_ctx = EventContext::new().with_event_type("inventory-changed");
    let report = gw.router.resource_updated(&inventory_update(1), &update_ctx).unwrap();
    assert_eq!(report.delivered, 1);
    assert_eq!(
        gw.outbound.drain()[0].routing.session_id.as_deref(),
        Some("s2")
    );
}

#[test]
fn test_unsubscribe_by_type() {
    let gw = gateway();
    subscribe(&gw.router, "s1", "cart", "c1");
    subscribe(&gw.router, "s1", "cart", "c2");
    subscribe(&gw.router, "s1", "order", "o1");

    let event = InboundEvent::decode("unsubscribe", br#"{"resources": [{"resource_type": "cart"}]}"#)
        .unwrap();
    gw.router
        .deliver(event, &EventContext::new().with_session("s1"))
        .unwrap();

    let remaining = gw.router.manager().session_subscriptions("s1").unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining.iter().all(|s| s.resource_type == "order"));
}

#[test]
fn test_unsubscribe_without_session_changes_nothing() {
    let gw = gateway();
    subscribe(&gw.router, "s1", "cart", "c1");
    gw.outbound.drain();

    let event = InboundEvent::decode("unsubscribe", br#"{"resource_type": "cart"}"#).unwrap();
    let result = gw.router.deliver(event, &EventContext::new()).unwrap();

    assert!(matches!(result, HandlerResult::Unsubscribed(_)));
    assert!(gw.outbound.drain().is_empty());
    assert_eq!(gw.router.manager().session_subscriptions("s1").unwrap().len(), 1);
}

// --- Session Lifecycle ---

#[test]
fn test_session_closed_stops_delivery() {
    let gw = gateway();
    subscribe(&gw.router, "s1", "inventory", "all");
    subscribe(&gw.router, "s1", "cart", "c1");
    gw.outbound.drain();

    let result = gw
        .router
        .deliver(
            InboundEvent::SessionClosed(SessionClosed {
                user_id: Some("u1".to_string()),
                session_id: "s1".to_string(),
            }),
            &EventContext::new(),
        )
        .unwrap();
    assert_eq!(result, HandlerResult::Done);

    let ctx = EventContext::new().with_event_type("inventory-changed");
    let report = gw.router.resource_updated(&inventory_update(1), &ctx).unwrap();
    assert_eq!(report.subscribers, 0);
    assert!(gw.outbound.drain().is_empty());
    assert_eq!(gw.store.len(), 0);
}

#[test]
fn test_deliver_from_raw_headers() {
    let gw = gateway();
    subscribe(&gw.router, "s1", "inventory", "all");
    gw.outbound.drain();

    let headers = HashMap::from([
        ("x-event-type".to_string(), "inventory-changed".to_string()),
        ("x-cache-ttl".to_string(), "120".to_string()),
    ]);
    let ctx = EventContext::from_headers(&headers).unwrap();
    let event = InboundEvent::decode(
        "resource-update",
        br#"{"resource_type": "inventory", "resource_id": "all", "payload": {"items": 4}}"#,
    )
    .unwrap();

    let result = gw.router.deliver(event, &ctx).unwrap();

    assert_eq!(
        result,
        HandlerResult::Fanout(FanoutReport {
            subscribers: 1,
            delivered: 1,
            failed: 0,
        })
    );
    assert!(gw.store.exists("resTypeResIdSnap|inventory|all").unwrap());
}
