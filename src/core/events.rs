// src/core/events.rs

//! Defines the broadcast event taxonomy carried on the coherence topic:
//! per-group cache events, per-relation events, and the envelope that
//! stamps them with the sending node's identity.

use crate::core::errors::BusError;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};
use strum_macros::IntoStaticStr;

/// The full serialized state of an entity, sufficient to reconstruct or
/// update it on a remote node.
pub type PropertyMap = HashMap<String, serde_json::Value>;

/// A single (left, right) membership of a cached relation.
pub type RelationPair = (i64, i64);

/// Mutations of a per-group entity cache.
#[derive(Serialize, Deserialize, IntoStaticStr, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheEvent {
    /// Reset every group on the receiving node. Never produced by this node;
    /// accepted for compatibility with older peers.
    FullReset,
    /// Reset the cache of a single entity group.
    GroupReset { group_id: i64 },
    /// Replace or create one entity from its serialized attribute map.
    ObjectReset {
        group_id: i64,
        object_id: i64,
        properties: PropertyMap,
    },
    /// Drop one entity from the receiving node's cache.
    ObjectRemove { group_id: i64, object_id: i64 },
}

impl CacheEvent {
    /// The group a cache event targets. `FullReset` addresses all groups.
    pub fn group_id(&self) -> Option<i64> {
        match self {
            CacheEvent::FullReset => None,
            CacheEvent::GroupReset { group_id }
            | CacheEvent::ObjectReset { group_id, .. }
            | CacheEvent::ObjectRemove { group_id, .. } => Some(*group_id),
        }
    }
}

/// Mutations of a cached relation (a set of (left, right) pairs).
#[derive(Serialize, Deserialize, IntoStaticStr, Debug, Clone, PartialEq)]
#[serde(tag = "action", rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationEvent {
    Add {
        relation_id: i64,
        left: i64,
        right: i64,
    },
    AddAll {
        relation_id: i64,
        pairs: Vec<RelationPair>,
    },
    Clear {
        relation_id: i64,
    },
    Remove {
        relation_id: i64,
        left: i64,
        right: i64,
    },
    RemoveAll {
        relation_id: i64,
        pairs: Vec<RelationPair>,
    },
    RemoveLeft {
        relation_id: i64,
        left: i64,
    },
    RemoveRight {
        relation_id: i64,
        right: i64,
    },
    ReplaceAll {
        relation_id: i64,
        pairs: Vec<RelationPair>,
    },
    /// Rebuild the relation from its authoritative source. Also what large
    /// bulk events collapse into on the send path.
    Reset {
        relation_id: i64,
    },
}

impl RelationEvent {
    /// Returns the relation targeted by this event.
    pub fn relation_id(&self) -> i64 {
        match self {
            RelationEvent::Add { relation_id, .. }
            | RelationEvent::AddAll { relation_id, .. }
            | RelationEvent::Clear { relation_id }
            | RelationEvent::Remove { relation_id, .. }
            | RelationEvent::RemoveAll { relation_id, .. }
            | RelationEvent::RemoveLeft { relation_id, .. }
            | RelationEvent::RemoveRight { relation_id, .. }
            | RelationEvent::ReplaceAll { relation_id, .. }
            | RelationEvent::Reset { relation_id } => *relation_id,
        }
    }
}

/// The tagged sum of everything that travels on the coherence topic.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BroadcastMessage {
    Cache(CacheEvent),
    Relation(RelationEvent),
}

impl BroadcastMessage {
    /// The wire name of the event's action, for log lines.
    pub fn action(&self) -> &'static str {
        match self {
            BroadcastMessage::Cache(ev) => ev.into(),
            BroadcastMessage::Relation(ev) => ev.into(),
        }
    }

    /// The per-key statistics bucket this event is accounted under:
    /// `g<group_id>` for cache events, `r<relation_id>` for relation events.
    /// A full reset addresses every group and is accounted under `g*`.
    pub fn stats_key(&self) -> String {
        match self {
            BroadcastMessage::Cache(ev) => match ev.group_id() {
                Some(group_id) => format!("g{group_id}"),
                None => "g*".to_string(),
            },
            BroadcastMessage::Relation(ev) => format!("r{}", ev.relation_id()),
        }
    }
}

/// The unit actually published to the topic: a payload stamped with the
/// sending node's broker-assigned identity and the send timestamp.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Broker-assigned identifier of the publishing node. Must be non-empty;
    /// the consumer drops envelopes without one.
    pub sender_id: String,
    /// Milliseconds since the UNIX epoch at publish time, read on the
    /// receiving side to compute transmission latency.
    pub sent_at_ms: u64,
    pub payload: BroadcastMessage,
}

impl Envelope {
    pub fn encode(&self) -> Result<Bytes, BusError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }

    /// Decodes a frame. An envelope without a sender identifier is rejected
    /// as malformed; every valid publication carries one.
    pub fn decode(frame: &[u8]) -> Result<Self, BusError> {
        let envelope: Envelope = serde_json::from_slice(frame)?;
        if envelope.sender_id.is_empty() {
            return Err(BusError::MissingSender);
        }
        Ok(envelope)
    }
}

/// Helper to get the current system time in milliseconds since the UNIX epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
