//! Distributed registry against a live Redis server.
//!
//! Runs only with `--features redis-store` and `FANOUT_REDIS_URL` set, for
//! example `FANOUT_REDIS_URL=redis://127.0.0.1:6379/15`. The database is
//! shared, so every key is namespaced by a per-run session id.

#![cfg(feature = "redis-store")]

use fanout_registry::{
    KvRegistry, KvStore, RedisKvStore, Resource, Subscription, SubscriptionRegistry,
};
use std::process;
use std::sync::Arc;
use std::time::Duration;

fn store() -> Option<Arc<RedisKvStore>> {
    let url = std::env::var("FANOUT_REDIS_URL").ok()?;
    Some(Arc::new(RedisKvStore::connect(&url).unwrap()))
}

#[test]
fn test_registry_round_trip() {
    let Some(store) = store() else { return };
    let session = format!("it-{}", process::id());
    let registry = KvRegistry::new(store.clone(), Duration::from_secs(60));

    registry
        .insert(&Subscription::for_session("cart", "c1", session.as_str()))
        .unwrap();
    registry
        .insert(&Subscription::for_session("order", "o1", session.as_str()))
        .unwrap();

    assert_eq!(registry.get_by_session(&session).unwrap().len(), 2);
    assert!(registry
        .get_by_resource(&Resource::new("cart", "c1"))
        .unwrap()
        .contains(&Subscription::for_session("cart", "c1", session.as_str())));

    registry.remove(&session, "cart", None).unwrap();
    assert_eq!(registry.get_by_session(&session).unwrap().len(), 1);

    registry.remove_session(&session).unwrap();
    assert!(registry.get_by_session(&session).unwrap().is_empty());
    assert!(!store.exists(&format!("sessionIdSub|{session}")).unwrap());
}

#[test]
fn test_value_expiry() {
    let Some(store) = store() else { return };
    let key = format!("it-ttl-{}", process::id());

    store
        .set(&key, b"v".to_vec(), Some(Duration::from_millis(50)))
        .unwrap();
    assert_eq!(store.get(&key).unwrap(), Some(b"v".to_vec()));

    std::thread::sleep(Duration::from_millis(150));
    assert_eq!(store.get(&key).unwrap(), None);
}
