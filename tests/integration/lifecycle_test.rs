// tests/integration/lifecycle_test.rs

//! Connect, reconnect, and close behavior.

use super::fixtures::*;
use cachebus::core::broker::MemoryBroker;
use cachebus::core::events::PropertyMap;
use serde_json::json;
use std::time::Duration;

fn props(name: &str) -> PropertyMap {
    let mut map = PropertyMap::new();
    map.insert("name".to_string(), json!(name));
    map
}

#[tokio::test]
async fn test_connect_records_the_assigned_instance_id() {
    init_tracing();
    let broker = MemoryBroker::new();
    let (bus, _store) = node(&broker, test_config()).await;

    assert!(bus.is_connected());
    assert!(!bus.instance_id().unwrap().is_empty());
}

#[tokio::test]
async fn test_reconnect_swaps_the_instance_id() {
    init_tracing();
    let broker = MemoryBroker::new();
    let (bus, _store) = node(&broker, test_config()).await;

    let first_id = bus.instance_id().unwrap();
    bus.connect().await.unwrap();
    let second_id = bus.instance_id().unwrap();

    assert_ne!(first_id, second_id);
    assert!(bus.is_connected());
}

#[tokio::test]
async fn test_bus_still_works_after_reconnect() {
    init_tracing();
    let broker = MemoryBroker::new();
    let (bus_a, store_a) = node(&broker, test_config()).await;
    let (_bus_b, store_b) = node(&broker, test_config()).await;

    bus_a.connect().await.unwrap();

    let widgets_a = store_a.group(WIDGETS_GROUP).unwrap();
    let widgets_b = store_b.group(WIDGETS_GROUP).unwrap();
    widgets_a.insert(42, props("post-reconnect"));

    bus_a.cache_object_expired(WIDGETS, 42).await;

    wait_until("entity replicated after reconnect", || {
        widgets_b.get(42).is_some()
    })
    .await;

    // The reconnected node still suppresses its own echoes.
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(widgets_a.get(42).unwrap()["name"], json!("post-reconnect"));
}

#[tokio::test]
async fn test_close_stops_consumption_and_publication() {
    init_tracing();
    let broker = MemoryBroker::new();
    let (bus_a, store_a) = node(&broker, test_config()).await;
    let (bus_b, store_b) = node(&broker, test_config()).await;

    bus_b.close().await;
    assert!(!bus_b.is_connected());
    assert!(bus_b.instance_id().is_none());

    // A publication after close is dropped on the floor...
    let mut tap = TopicTap::new(&broker).await;
    bus_b.relation_add(ASSIGNMENTS_RELATION, 1, 2).await;
    tap.expect_silence(Duration::from_millis(200)).await;

    // ...and inbound traffic no longer reaches the closed node's store.
    let widgets_b = store_b.group(WIDGETS_GROUP).unwrap();
    let widgets_a = store_a.group(WIDGETS_GROUP).unwrap();
    widgets_a.insert(42, props("x"));
    bus_a.cache_object_expired(WIDGETS, 42).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(widgets_b.get(42).is_none());
}

#[tokio::test]
async fn test_close_is_idempotent() {
    init_tracing();
    let broker = MemoryBroker::new();
    let (bus, _store) = node(&broker, test_config()).await;

    bus.close().await;
    bus.close().await;
    assert!(!bus.is_connected());
}

#[tokio::test]
async fn test_messages_before_store_initialization_are_dropped() {
    init_tracing();
    let broker = MemoryBroker::new();
    let (bus_a, store_a) = node(&broker, test_config()).await;
    let (_bus_b, store_b) = node(&broker, test_config()).await;

    store_b.set_initialized(false);
    let widgets_a = store_a.group(WIDGETS_GROUP).unwrap();
    let widgets_b = store_b.group(WIDGETS_GROUP).unwrap();
    widgets_a.insert(42, props("early"));

    bus_a.cache_object_expired(WIDGETS, 42).await;
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(widgets_b.get(42).is_none());

    // Once initialized, the peer's next emission lands.
    store_b.set_initialized(true);
    bus_a.cache_object_expired(WIDGETS, 42).await;
    wait_until("entity applied once the store is initialized", || {
        widgets_b.get(42).is_some()
    })
    .await;
}
