// src/core/bus/listener.rs

//! The notification surface the local store calls on its own mutations.
//! Each operation maps to one event kind; bulk relation operations go
//! through the size-threshold collapse policy first.

use crate::core::bus::CoherenceBus;
use crate::core::events::{BroadcastMessage, CacheEvent, RelationEvent, RelationPair};
use crate::core::store::{EntityGroup, EntityStore};
use tracing::{debug, info};

/// Decides whether a bulk relation event is too large to ship as itself.
/// A strategy seam: tests inject a threshold of zero (always collapse) or
/// `usize::MAX` (never collapse).
pub trait CollapsePolicy: Send + Sync {
    fn should_collapse(&self, pair_count: usize) -> bool;
}

/// The production policy: collapse once the pair count exceeds the
/// configured maximum relation size.
#[derive(Debug, Clone, Copy)]
pub struct SizeThresholdPolicy {
    maximum_relation_size: usize,
}

impl SizeThresholdPolicy {
    pub fn new(maximum_relation_size: usize) -> Self {
        Self {
            maximum_relation_size,
        }
    }
}

impl CollapsePolicy for SizeThresholdPolicy {
    fn should_collapse(&self, pair_count: usize) -> bool {
        pair_count > self.maximum_relation_size
    }
}

impl CoherenceBus {
    // --- Entity cache notifications ---

    /// Deliberately not distributed: a cluster-wide reset would send every
    /// node back to the database at once. Receiving a full reset from an
    /// older peer still works.
    pub async fn cache_full_reset(&self) {
        info!("Full cache reset requested locally; not distributed to peers.");
    }

    /// Broadcasts a reset of one entity group's cache.
    pub async fn cache_group_reset(&self, group_name: &str) {
        let Some(group) = self.store.group_by_name(group_name) else {
            debug!("Ignoring reset of unknown group '{}'.", group_name);
            return;
        };
        if !group.is_distributed() {
            return;
        }
        self.publish_swallowed(BroadcastMessage::Cache(CacheEvent::GroupReset {
            group_id: group.group_id(),
        }))
        .await;
    }

    /// Broadcasts the full serialized state of an entity that changed
    /// locally. If the entity can no longer be resolved the event is
    /// suppressed; a subsequent removal notification carries the truth.
    pub async fn cache_object_expired(&self, group_name: &str, object_id: i64) {
        let Some(group) = self.store.group_by_name(group_name) else {
            debug!("Ignoring expiry in unknown group '{}'.", group_name);
            return;
        };
        if !group.is_distributed() {
            return;
        }
        let Some(properties) = group.snapshot(object_id) else {
            debug!(
                "Object {} in group '{}' vanished before broadcast; relying on a later removal.",
                object_id, group_name
            );
            return;
        };
        self.publish_swallowed(BroadcastMessage::Cache(CacheEvent::ObjectReset {
            group_id: group.group_id(),
            object_id,
            properties,
        }))
        .await;
    }

    /// Broadcasts the removal of an entity from the group's cache.
    pub async fn remove_from_cache(&self, group_name: &str, object_id: i64) {
        let Some(group) = self.store.group_by_name(group_name) else {
            debug!("Ignoring removal in unknown group '{}'.", group_name);
            return;
        };
        if !group.is_distributed() {
            return;
        }
        self.publish_swallowed(BroadcastMessage::Cache(CacheEvent::ObjectRemove {
            group_id: group.group_id(),
            object_id,
        }))
        .await;
    }

    // --- Relation notifications ---

    pub async fn relation_add(&self, relation_id: i64, left: i64, right: i64) {
        self.publish_swallowed(BroadcastMessage::Relation(RelationEvent::Add {
            relation_id,
            left,
            right,
        }))
        .await;
    }

    pub async fn relation_add_all(&self, relation_id: i64, pairs: Vec<RelationPair>) {
        self.publish_relation_bulk(relation_id, pairs, |relation_id, pairs| {
            RelationEvent::AddAll { relation_id, pairs }
        })
        .await;
    }

    pub async fn relation_clear(&self, relation_id: i64) {
        self.publish_swallowed(BroadcastMessage::Relation(RelationEvent::Clear {
            relation_id,
        }))
        .await;
    }

    pub async fn relation_remove(&self, relation_id: i64, left: i64, right: i64) {
        self.publish_swallowed(BroadcastMessage::Relation(RelationEvent::Remove {
            relation_id,
            left,
            right,
        }))
        .await;
    }

    pub async fn relation_remove_all(&self, relation_id: i64, pairs: Vec<RelationPair>) {
        self.publish_relation_bulk(relation_id, pairs, |relation_id, pairs| {
            RelationEvent::RemoveAll { relation_id, pairs }
        })
        .await;
    }

    pub async fn relation_remove_left_value(&self, relation_id: i64, left: i64) {
        self.publish_swallowed(BroadcastMessage::Relation(RelationEvent::RemoveLeft {
            relation_id,
            left,
        }))
        .await;
    }

    pub async fn relation_remove_right_value(&self, relation_id: i64, right: i64) {
        self.publish_swallowed(BroadcastMessage::Relation(RelationEvent::RemoveRight {
            relation_id,
            right,
        }))
        .await;
    }

    pub async fn relation_replace_all(&self, relation_id: i64, pairs: Vec<RelationPair>) {
        self.publish_relation_bulk(relation_id, pairs, |relation_id, pairs| {
            RelationEvent::ReplaceAll { relation_id, pairs }
        })
        .await;
    }

    pub async fn relation_reset(&self, relation_id: i64) {
        self.publish_swallowed(BroadcastMessage::Relation(RelationEvent::Reset {
            relation_id,
        }))
        .await;
    }

    // --- Helpers ---

    /// Applies the size-threshold collapse rule: an oversized bulk event is
    /// replaced by a reset carrying no pair payload, and consumers rebuild
    /// the relation from its authoritative source instead.
    async fn publish_relation_bulk(
        &self,
        relation_id: i64,
        pairs: Vec<RelationPair>,
        build: impl FnOnce(i64, Vec<RelationPair>) -> RelationEvent,
    ) {
        let event = if self.collapse_policy.should_collapse(pairs.len()) {
            debug!(
                "Collapsing bulk event of {} pairs for relation {} into a reset.",
                pairs.len(),
                relation_id
            );
            RelationEvent::Reset { relation_id }
        } else {
            build(relation_id, pairs)
        };
        self.publish_swallowed(BroadcastMessage::Relation(event)).await;
    }

    /// Publishes and swallows failures: the local mutation is already
    /// committed, and the next mutation re-converges the cluster.
    async fn publish_swallowed(&self, payload: BroadcastMessage) {
        let Some(adapter) = self.adapter().await else {
            debug!(
                "Bus is not connected; dropping outbound {} event.",
                payload.action()
            );
            return;
        };
        let action = payload.action();
        if let Err(e) = adapter.publish(payload).await {
            info!("Failed to publish {} event: {}", action, e);
        }
    }
}
