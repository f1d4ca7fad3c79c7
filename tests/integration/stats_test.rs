// tests/integration/stats_test.rs

//! Statistics behavior observed through the consumer, with real envelopes.

use cachebus::core::bus::{Consumer, LocalIdentity, StatsAggregator};
use cachebus::core::events::{BroadcastMessage, CacheEvent, Envelope, RelationEvent, now_ms};
use cachebus::core::store::MemoryStore;
use std::sync::Arc;

const LOCAL_ID: &str = "local-node";
const REMOTE_ID: &str = "remote-node";

fn consumer_for(store: &Arc<MemoryStore>) -> Consumer {
    let identity = LocalIdentity::new();
    identity.set(LOCAL_ID.to_string());
    Consumer::new(store.clone(), identity, StatsAggregator::new(10))
}

fn frame(payload: BroadcastMessage) -> Vec<u8> {
    Envelope {
        sender_id: REMOTE_ID.to_string(),
        sent_at_ms: now_ms(),
        payload,
    }
    .encode()
    .unwrap()
    .to_vec()
}

#[test]
fn test_every_classified_event_is_accounted_under_its_key() {
    let store = MemoryStore::new();
    store.define_group(7, "widgets", true, true);
    store.define_relation(3, vec![]);
    let mut consumer = consumer_for(&store);

    for _ in 0..3 {
        consumer.handle_frame(&frame(BroadcastMessage::Cache(CacheEvent::GroupReset {
            group_id: 7,
        })));
    }
    consumer.handle_frame(&frame(BroadcastMessage::Relation(RelationEvent::Clear {
        relation_id: 3,
    })));

    let g7 = consumer.stats().slot("g7").unwrap();
    let r3 = consumer.stats().slot("r3").unwrap();
    assert_eq!(g7.count, 3);
    assert_eq!(r3.count, 1);
    assert!(g7.tx_min <= g7.tx_avg() && g7.tx_avg() <= g7.tx_max);
    assert!(g7.px_min <= g7.px_avg() && g7.px_avg() <= g7.px_max);
}

#[test]
fn test_flush_empties_the_window() {
    let store = MemoryStore::new();
    store.define_group(7, "widgets", true, true);
    let mut consumer = consumer_for(&store);

    consumer.handle_frame(&frame(BroadcastMessage::Cache(CacheEvent::GroupReset {
        group_id: 7,
    })));
    assert!(!consumer.stats().is_empty());

    consumer.flush_stats();
    assert!(consumer.stats().is_empty());
    assert_eq!(consumer.stats().collection_ms(), 0);
}

#[test]
fn test_suppressed_traffic_is_not_accounted() {
    let store = MemoryStore::new();
    store.define_group(7, "widgets", true, true);
    let mut consumer = consumer_for(&store);

    // Self-echo.
    let echo = Envelope {
        sender_id: LOCAL_ID.to_string(),
        sent_at_ms: now_ms(),
        payload: BroadcastMessage::Cache(CacheEvent::GroupReset { group_id: 7 }),
    };
    consumer.handle_frame(&echo.encode().unwrap());

    // Undecodable frame.
    consumer.handle_frame(b"garbage");

    assert!(consumer.stats().is_empty());
}
