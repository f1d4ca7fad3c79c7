// src/core/store/mod.rs

//! The seam between the bus and the local entity/relation store it keeps
//! coherent. Every mutating operation takes an [`Origin`] token: a store
//! implementation gates its own outbound notifications on `Origin::Local`,
//! which is what keeps consumed events from being re-broadcast.

pub mod memory;

use crate::core::errors::BusError;
use crate::core::events::{PropertyMap, RelationPair};
use std::sync::Arc;

pub use memory::{MemoryGroup, MemoryRelation, MemoryStore};

/// Where a store mutation came from. Mutations of remote origin must never
/// reach the broadcast path again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Local,
    Remote,
}

/// What applying a serialized entity did on the receiving node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The entity was absent and has been constructed and inserted.
    Inserted,
    /// The entity existed; its attributes were updated and re-ordered.
    Updated,
}

/// A typed collection of identifiable entities within the local store.
pub trait EntityGroup: Send + Sync {
    fn group_id(&self) -> i64;
    fn name(&self) -> &str;

    /// Whether this group's definition asks for cluster-wide coherence.
    /// Non-distributed groups are local-only caches and never broadcast.
    fn is_distributed(&self) -> bool;

    /// Whether this node maintains the group as a cache. Some peers cache a
    /// group that this node only passes through; events for such groups are
    /// no-ops here.
    fn is_caching(&self) -> bool;

    /// Serializes the full attribute map of a live entity, or `None` if the
    /// entity is no longer resolvable.
    fn snapshot(&self, object_id: i64) -> Option<PropertyMap>;

    /// Constructs or updates an entity from its serialized attribute map,
    /// re-applies the group's ordering, and notifies local listeners.
    fn apply_object(
        &self,
        object_id: i64,
        properties: PropertyMap,
        origin: Origin,
    ) -> Result<ApplyOutcome, BusError>;

    fn remove_object(&self, object_id: i64, origin: Origin);

    fn reset(&self, origin: Origin);
}

/// A cached set of (left, right) pairs kept coherent across the cluster.
pub trait CachedRelation: Send + Sync {
    fn relation_id(&self) -> i64;

    fn add(&self, left: i64, right: i64, origin: Origin);
    fn add_all(&self, pairs: &[RelationPair], origin: Origin);
    fn clear(&self, origin: Origin);
    fn remove(&self, left: i64, right: i64, origin: Origin);
    fn remove_all(&self, pairs: &[RelationPair], origin: Origin);
    fn remove_left(&self, left: i64, origin: Origin);
    fn remove_right(&self, right: i64, origin: Origin);
    fn replace_all(&self, pairs: &[RelationPair], origin: Origin);

    /// Rebuilds the relation from its authoritative source.
    fn reset(&self, origin: Origin);
}

/// The local store as the bus sees it.
pub trait EntityStore: Send + Sync {
    /// Inbound events arriving before the store reports itself initialized
    /// are dropped; the peer will re-emit or the cache cold-loads on demand.
    fn is_initialized(&self) -> bool;

    fn group_by_name(&self, name: &str) -> Option<Arc<dyn EntityGroup>>;
    fn group_by_id(&self, group_id: i64) -> Option<Arc<dyn EntityGroup>>;
    fn relation_by_id(&self, relation_id: i64) -> Option<Arc<dyn CachedRelation>>;

    /// Resets every group. Only ever invoked with `Origin::Remote`; the
    /// full-reset operation is disabled on the send path.
    fn reset_all(&self, origin: Origin);

    /// Refreshes derived method-value cache entries for one entity.
    fn method_value_cache_update(&self, group_id: i64, object_id: i64);

    /// Drops derived method-value cache entries for one entity.
    fn method_value_cache_delete(&self, group_id: i64, object_id: i64);
}
