// src/core/store/memory.rs

//! A reference in-memory implementation of the store contract, used by the
//! test suite and by single-binary deployments that want a coherent local
//! cache without an external database.

use crate::core::errors::BusError;
use crate::core::events::{PropertyMap, RelationPair};
use crate::core::store::{ApplyOutcome, CachedRelation, EntityGroup, EntityStore, Origin};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// An entity group backed by a hash map plus a sorted ordering index.
#[derive(Debug)]
pub struct MemoryGroup {
    group_id: i64,
    name: String,
    distributed: bool,
    caching: bool,
    objects: DashMap<i64, PropertyMap>,
    order: Mutex<Vec<i64>>,
}

impl MemoryGroup {
    pub fn new(group_id: i64, name: &str, distributed: bool, caching: bool) -> Arc<Self> {
        Arc::new(Self {
            group_id,
            name: name.to_string(),
            distributed,
            caching,
            objects: DashMap::new(),
            order: Mutex::new(Vec::new()),
        })
    }

    /// Seeds an entity without going through the coherence path.
    pub fn insert(&self, object_id: i64, properties: PropertyMap) {
        self.objects.insert(object_id, properties);
        let mut order = self.order.lock();
        if !order.contains(&object_id) {
            order.push(object_id);
        }
        order.sort_unstable();
    }

    pub fn get(&self, object_id: i64) -> Option<PropertyMap> {
        self.objects.get(&object_id).map(|e| e.value().clone())
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// The group's ordering index, re-applied after every remote update.
    pub fn ordered_ids(&self) -> Vec<i64> {
        self.order.lock().clone()
    }
}

impl EntityGroup for MemoryGroup {
    fn group_id(&self) -> i64 {
        self.group_id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_distributed(&self) -> bool {
        self.distributed
    }

    fn is_caching(&self) -> bool {
        self.caching
    }

    fn snapshot(&self, object_id: i64) -> Option<PropertyMap> {
        self.get(object_id)
    }

    fn apply_object(
        &self,
        object_id: i64,
        properties: PropertyMap,
        _origin: Origin,
    ) -> Result<ApplyOutcome, BusError> {
        let existed = self.objects.insert(object_id, properties).is_some();
        let mut order = self.order.lock();
        if !existed {
            order.push(object_id);
        }
        order.sort_unstable();
        Ok(if existed {
            ApplyOutcome::Updated
        } else {
            ApplyOutcome::Inserted
        })
    }

    fn remove_object(&self, object_id: i64, _origin: Origin) {
        self.objects.remove(&object_id);
        self.order.lock().retain(|id| *id != object_id);
    }

    fn reset(&self, _origin: Origin) {
        debug!("Resetting cache of group '{}' ({}).", self.name, self.group_id);
        self.objects.clear();
        self.order.lock().clear();
    }
}

/// A cached relation backed by an ordered pair set. Its authoritative
/// contents are captured at construction; `reset` reloads from them.
#[derive(Debug)]
pub struct MemoryRelation {
    relation_id: i64,
    pairs: Mutex<BTreeSet<RelationPair>>,
    authoritative: Vec<RelationPair>,
}

impl MemoryRelation {
    pub fn new(relation_id: i64, authoritative: Vec<RelationPair>) -> Arc<Self> {
        Arc::new(Self {
            relation_id,
            pairs: Mutex::new(authoritative.iter().copied().collect()),
            authoritative,
        })
    }

    pub fn contains(&self, left: i64, right: i64) -> bool {
        self.pairs.lock().contains(&(left, right))
    }

    pub fn len(&self) -> usize {
        self.pairs.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.lock().is_empty()
    }

    pub fn pairs(&self) -> Vec<RelationPair> {
        self.pairs.lock().iter().copied().collect()
    }
}

impl CachedRelation for MemoryRelation {
    fn relation_id(&self) -> i64 {
        self.relation_id
    }

    fn add(&self, left: i64, right: i64, _origin: Origin) {
        self.pairs.lock().insert((left, right));
    }

    fn add_all(&self, pairs: &[RelationPair], _origin: Origin) {
        self.pairs.lock().extend(pairs.iter().copied());
    }

    fn clear(&self, _origin: Origin) {
        self.pairs.lock().clear();
    }

    fn remove(&self, left: i64, right: i64, _origin: Origin) {
        self.pairs.lock().remove(&(left, right));
    }

    fn remove_all(&self, pairs: &[RelationPair], _origin: Origin) {
        let mut guard = self.pairs.lock();
        for pair in pairs {
            guard.remove(pair);
        }
    }

    fn remove_left(&self, left: i64, _origin: Origin) {
        self.pairs.lock().retain(|(l, _)| *l != left);
    }

    fn remove_right(&self, right: i64, _origin: Origin) {
        self.pairs.lock().retain(|(_, r)| *r != right);
    }

    fn replace_all(&self, pairs: &[RelationPair], _origin: Origin) {
        *self.pairs.lock() = pairs.iter().copied().collect();
    }

    fn reset(&self, _origin: Origin) {
        debug!("Reloading relation {} from its authoritative source.", self.relation_id);
        *self.pairs.lock() = self.authoritative.iter().copied().collect();
    }
}

/// The reference store: groups and relations addressable by id, plus a
/// versioned method-value cache standing in for derived computations.
#[derive(Debug, Default)]
pub struct MemoryStore {
    initialized: AtomicBool,
    groups: DashMap<i64, Arc<MemoryGroup>>,
    groups_by_name: DashMap<String, i64>,
    relations: DashMap<i64, Arc<MemoryRelation>>,
    method_value_versions: DashMap<(i64, i64), u64>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        let store: Self = Default::default();
        store.initialized.store(true, Ordering::Relaxed);
        Arc::new(store)
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::Relaxed);
    }

    pub fn define_group(
        &self,
        group_id: i64,
        name: &str,
        distributed: bool,
        caching: bool,
    ) -> Arc<MemoryGroup> {
        let group = MemoryGroup::new(group_id, name, distributed, caching);
        self.groups.insert(group_id, group.clone());
        self.groups_by_name.insert(name.to_string(), group_id);
        group
    }

    pub fn define_relation(
        &self,
        relation_id: i64,
        authoritative: Vec<RelationPair>,
    ) -> Arc<MemoryRelation> {
        let relation = MemoryRelation::new(relation_id, authoritative);
        self.relations.insert(relation_id, relation.clone());
        relation
    }

    /// Concrete group handle, for callers that need more than the
    /// [`EntityGroup`] contract (seeding, introspection).
    pub fn group(&self, group_id: i64) -> Option<Arc<MemoryGroup>> {
        self.groups.get(&group_id).map(|e| e.value().clone())
    }

    /// Concrete relation handle.
    pub fn relation(&self, relation_id: i64) -> Option<Arc<MemoryRelation>> {
        self.relations.get(&relation_id).map(|e| e.value().clone())
    }

    /// Current version of the derived method-value cache for one entity, or
    /// `None` if no derived values are cached.
    pub fn method_value_version(&self, group_id: i64, object_id: i64) -> Option<u64> {
        self.method_value_versions
            .get(&(group_id, object_id))
            .map(|e| *e.value())
    }
}

impl EntityStore for MemoryStore {
    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Relaxed)
    }

    fn group_by_name(&self, name: &str) -> Option<Arc<dyn EntityGroup>> {
        let group_id = *self.groups_by_name.get(name)?.value();
        self.group_by_id(group_id)
    }

    fn group_by_id(&self, group_id: i64) -> Option<Arc<dyn EntityGroup>> {
        self.groups
            .get(&group_id)
            .map(|e| e.value().clone() as Arc<dyn EntityGroup>)
    }

    fn relation_by_id(&self, relation_id: i64) -> Option<Arc<dyn CachedRelation>> {
        self.relations
            .get(&relation_id)
            .map(|e| e.value().clone() as Arc<dyn CachedRelation>)
    }

    fn reset_all(&self, origin: Origin) {
        for entry in self.groups.iter() {
            entry.value().reset(origin);
        }
    }

    fn method_value_cache_update(&self, group_id: i64, object_id: i64) {
        *self
            .method_value_versions
            .entry((group_id, object_id))
            .or_insert(0) += 1;
    }

    fn method_value_cache_delete(&self, group_id: i64, object_id: i64) {
        self.method_value_versions.remove(&(group_id, object_id));
    }
}
