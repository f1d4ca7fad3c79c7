// src/core/bus/consumer.rs

//! The inbound path: decodes frames from the topic, drops self-echoes,
//! dispatches on event kind and action, and applies the mutation to the
//! local store with `Origin::Remote` so nothing is re-broadcast.

use crate::core::bus::publisher::LocalIdentity;
use crate::core::bus::stats::StatsAggregator;
use crate::core::errors::BusError;
use crate::core::events::{BroadcastMessage, CacheEvent, Envelope, RelationEvent, now_ms};
use crate::core::store::{CachedRelation, EntityGroup, EntityStore, Origin};
use bytes::Bytes;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

/// Decodes and applies inbound frames, one at a time.
///
/// The consumer owns the statistics aggregator; funneling every delivery
/// through one `Consumer` is what lets the stats maps go without locks.
/// [`ConsumerTask`] does that funneling on tokio; an embedder on another
/// runtime can drive `handle_frame` from its own single worker instead.
pub struct Consumer {
    store: Arc<dyn EntityStore>,
    identity: LocalIdentity,
    stats: StatsAggregator,
}

impl Consumer {
    pub fn new(store: Arc<dyn EntityStore>, identity: LocalIdentity, stats: StatsAggregator) -> Self {
        Self {
            store,
            identity,
            stats,
        }
    }

    /// Runs one frame through the suppression filter and, if it survives,
    /// the state machine. Never panics the caller: application errors are
    /// logged and swallowed so one bad message cannot kill the subscriber.
    pub fn handle_frame(&mut self, frame: &[u8]) {
        let received_at_ms = now_ms();
        let processing_started = Instant::now();

        let envelope = match Envelope::decode(frame) {
            Ok(envelope) => envelope,
            Err(BusError::MissingSender) => {
                info!("Dropping message without a sender identifier.");
                return;
            }
            Err(e) => {
                info!("Dropping undecodable message from topic: {}", e);
                return;
            }
        };

        // Self-echo: the broker cannot filter our own publications on a
        // topic, so the sender stamp is the only defense. No log, hot path.
        if self.identity.matches(&envelope.sender_id) {
            return;
        }

        if !self.store.is_initialized() {
            debug!(
                "Store not initialized yet; dropping {} event from {}.",
                envelope.payload.action(),
                envelope.sender_id
            );
            return;
        }

        let action = envelope.payload.action();
        let key = envelope.payload.stats_key();

        match self.apply(&envelope.payload) {
            Ok(()) => {}
            Err(BusError::UnknownGroup(group_id)) => {
                // The peer may be running a newer schema.
                info!("Dropping {} event for unknown group {}.", action, group_id);
            }
            Err(BusError::UnknownRelation(relation_id)) => {
                info!(
                    "Dropping {} event for unknown relation {}.",
                    action, relation_id
                );
            }
            Err(e) => {
                error!("Failed to apply {} event from {}: {}", action, envelope.sender_id, e);
            }
        }

        let tx_ms = received_at_ms.saturating_sub(envelope.sent_at_ms);
        let px_ms = processing_started.elapsed().as_millis() as u64;
        self.stats.record(&key, action, tx_ms, px_ms);
    }

    fn apply(&self, payload: &BroadcastMessage) -> Result<(), BusError> {
        match payload {
            BroadcastMessage::Cache(event) => self.apply_cache_event(event),
            BroadcastMessage::Relation(event) => self.apply_relation_event(event),
        }
    }

    fn apply_cache_event(&self, event: &CacheEvent) -> Result<(), BusError> {
        match event {
            CacheEvent::FullReset => {
                info!("Peer requested a full cache reset; resetting every group.");
                self.store.reset_all(Origin::Remote);
            }
            CacheEvent::GroupReset { group_id } => {
                let group = self
                    .store
                    .group_by_id(*group_id)
                    .ok_or(BusError::UnknownGroup(*group_id))?;
                group.reset(Origin::Remote);
            }
            CacheEvent::ObjectReset {
                group_id,
                object_id,
                properties,
            } => {
                let group = self
                    .store
                    .group_by_id(*group_id)
                    .ok_or(BusError::UnknownGroup(*group_id))?;
                if group.is_caching() {
                    let outcome =
                        group.apply_object(*object_id, properties.clone(), Origin::Remote)?;
                    debug!(
                        "Applied remote state of object {} in group '{}' ({:?}).",
                        object_id,
                        group.name(),
                        outcome
                    );
                }
                // Derived values are recomputed whether or not this node
                // caches the group or the entity existed before the event.
                self.store.method_value_cache_update(*group_id, *object_id);
            }
            CacheEvent::ObjectRemove {
                group_id,
                object_id,
            } => {
                let group = self
                    .store
                    .group_by_id(*group_id)
                    .ok_or(BusError::UnknownGroup(*group_id))?;
                if group.is_caching() {
                    group.remove_object(*object_id, Origin::Remote);
                }
                self.store.method_value_cache_delete(*group_id, *object_id);
            }
        }
        Ok(())
    }

    fn apply_relation_event(&self, event: &RelationEvent) -> Result<(), BusError> {
        let relation_id = event.relation_id();
        let relation = self
            .store
            .relation_by_id(relation_id)
            .ok_or(BusError::UnknownRelation(relation_id))?;

        match event {
            RelationEvent::Add { left, right, .. } => {
                relation.add(*left, *right, Origin::Remote);
            }
            RelationEvent::AddAll { pairs, .. } => {
                relation.add_all(pairs, Origin::Remote);
            }
            RelationEvent::Clear { .. } => {
                relation.clear(Origin::Remote);
            }
            RelationEvent::Remove { left, right, .. } => {
                relation.remove(*left, *right, Origin::Remote);
            }
            RelationEvent::RemoveAll { pairs, .. } => {
                relation.remove_all(pairs, Origin::Remote);
            }
            RelationEvent::RemoveLeft { left, .. } => {
                relation.remove_left(*left, Origin::Remote);
            }
            RelationEvent::RemoveRight { right, .. } => {
                relation.remove_right(*right, Origin::Remote);
            }
            RelationEvent::ReplaceAll { pairs, .. } => {
                relation.replace_all(pairs, Origin::Remote);
            }
            RelationEvent::Reset { .. } => {
                relation.reset(Origin::Remote);
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> &StatsAggregator {
        &self.stats
    }

    pub fn flush_stats(&mut self) {
        self.stats.flush();
    }
}

/// The background task that funnels the broker subscription into a single
/// [`Consumer`] and flushes statistics once per reporting window.
pub(crate) struct ConsumerTask {
    consumer: Consumer,
    inbound: mpsc::Receiver<Bytes>,
    stats_period: Duration,
}

impl ConsumerTask {
    pub(crate) fn new(
        consumer: Consumer,
        inbound: mpsc::Receiver<Bytes>,
        stats_period: Duration,
    ) -> Self {
        Self {
            consumer,
            inbound,
            stats_period,
        }
    }

    pub(crate) async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) {
        debug!("Coherence consumer started.");

        // An interval of zero would panic; a zero-length reporting window
        // degenerates to flushing on every tick.
        let period = self.stats_period.max(Duration::from_millis(1));
        let mut flush_tick = tokio::time::interval(period);
        flush_tick.tick().await; // The first tick completes immediately.

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Coherence consumer shutting down.");
                    return;
                }
                _ = flush_tick.tick() => {
                    self.consumer.flush_stats();
                }
                maybe_frame = self.inbound.recv() => {
                    match maybe_frame {
                        Some(frame) => self.consumer.handle_frame(&frame),
                        None => {
                            info!("Broker subscription closed; coherence consumer stopping.");
                            return;
                        }
                    }
                }
            }
        }
    }
}
