// tests/property/codec_test.rs

//! Property-based tests for the wire codec: whatever a node stamps and
//! publishes, a peer decodes back unchanged.

use cachebus::core::events::{
    BroadcastMessage, CacheEvent, Envelope, PropertyMap, RelationEvent,
};
use proptest::prelude::*;
use serde_json::json;

fn property_map_strategy() -> impl Strategy<Value = PropertyMap> {
    prop::collection::hash_map("[a-z]{1,12}", ".{0,40}", 0..8)
        .prop_map(|m| m.into_iter().map(|(k, v)| (k, json!(v))).collect())
}

fn payload_strategy() -> impl Strategy<Value = BroadcastMessage> {
    let pairs = prop::collection::vec((any::<i64>(), any::<i64>()), 0..16);
    prop_oneof![
        Just(BroadcastMessage::Cache(CacheEvent::FullReset)),
        any::<i64>().prop_map(|group_id| BroadcastMessage::Cache(CacheEvent::GroupReset {
            group_id
        })),
        (any::<i64>(), any::<i64>(), property_map_strategy()).prop_map(
            |(group_id, object_id, properties)| BroadcastMessage::Cache(CacheEvent::ObjectReset {
                group_id,
                object_id,
                properties,
            })
        ),
        (any::<i64>(), any::<i64>()).prop_map(|(group_id, object_id)| {
            BroadcastMessage::Cache(CacheEvent::ObjectRemove {
                group_id,
                object_id,
            })
        }),
        (any::<i64>(), pairs.clone()).prop_map(|(relation_id, pairs)| {
            BroadcastMessage::Relation(RelationEvent::ReplaceAll { relation_id, pairs })
        }),
        (any::<i64>(), pairs).prop_map(|(relation_id, pairs)| {
            BroadcastMessage::Relation(RelationEvent::RemoveAll { relation_id, pairs })
        }),
        any::<i64>().prop_map(|relation_id| BroadcastMessage::Relation(RelationEvent::Reset {
            relation_id
        })),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 100,
        ..ProptestConfig::default()
    })]

    #[test]
    fn test_envelope_survives_the_wire(
        sender_id in "[a-f0-9-]{1,36}",
        sent_at_ms in any::<u64>(),
        payload in payload_strategy()
    ) {
        let envelope = Envelope { sender_id, sent_at_ms, payload };
        let frame = envelope.encode().unwrap();
        let decoded = Envelope::decode(&frame).unwrap();
        prop_assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_stats_key_and_action_are_stable_across_the_wire(
        payload in payload_strategy()
    ) {
        let envelope = Envelope {
            sender_id: "node".to_string(),
            sent_at_ms: 0,
            payload,
        };
        let decoded = Envelope::decode(&envelope.encode().unwrap()).unwrap();
        prop_assert_eq!(decoded.payload.stats_key(), envelope.payload.stats_key());
        prop_assert_eq!(decoded.payload.action(), envelope.payload.action());
    }
}
