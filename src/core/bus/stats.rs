// src/core/bus/stats.rs

//! Per-key latency accounting for consumed coherence events.
//!
//! Every classified event lands in a slot keyed by its group or relation
//! (`g7`, `r3`). Slots live for one reporting window: the periodic flush
//! logs a per-key summary plus an overall one, then drops every slot.

use std::collections::HashMap;
use std::time::Instant;
use tracing::{debug, info};

/// The per-key aggregate for one reporting window.
#[derive(Debug, Default, Clone, Copy)]
pub struct StatsSlot {
    pub count: u64,
    pub tx_min: u64,
    pub tx_max: u64,
    pub tx_sum: u64,
    pub px_min: u64,
    pub px_max: u64,
    pub px_sum: u64,
}

impl StatsSlot {
    /// Folds one observation in. Returns whether the transmission and
    /// processing values set a new maximum for this slot.
    fn record(&mut self, tx_ms: u64, px_ms: u64) -> (bool, bool) {
        let first = self.count == 0;
        let tx_new_max = first || tx_ms > self.tx_max;
        let px_new_max = first || px_ms > self.px_max;

        if first {
            self.tx_min = tx_ms;
            self.px_min = px_ms;
        } else {
            self.tx_min = self.tx_min.min(tx_ms);
            self.px_min = self.px_min.min(px_ms);
        }
        self.tx_max = self.tx_max.max(tx_ms);
        self.px_max = self.px_max.max(px_ms);
        self.tx_sum += tx_ms;
        self.px_sum += px_ms;
        self.count += 1;

        (tx_new_max, px_new_max)
    }

    fn merge(&mut self, other: &StatsSlot) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = *other;
            return;
        }
        self.count += other.count;
        self.tx_min = self.tx_min.min(other.tx_min);
        self.tx_max = self.tx_max.max(other.tx_max);
        self.tx_sum += other.tx_sum;
        self.px_min = self.px_min.min(other.px_min);
        self.px_max = self.px_max.max(other.px_max);
        self.px_sum += other.px_sum;
    }

    pub fn tx_avg(&self) -> u64 {
        if self.count == 0 { 0 } else { self.tx_sum / self.count }
    }

    pub fn px_avg(&self) -> u64 {
        if self.count == 0 { 0 } else { self.px_sum / self.count }
    }
}

/// Aggregates latency observations between flushes.
///
/// The aggregator is owned by the consumer task and is never touched from
/// another thread, so it needs no interior locking.
#[derive(Debug)]
pub struct StatsAggregator {
    slots: HashMap<String, StatsSlot>,
    /// Cumulative time spent inside the aggregator itself this window.
    collection_ms: u64,
    log_max_threshold_ms: u64,
}

impl StatsAggregator {
    pub fn new(log_max_threshold_ms: u64) -> Self {
        Self {
            slots: HashMap::new(),
            collection_ms: 0,
            log_max_threshold_ms,
        }
    }

    /// Folds one consumed event into its key's slot. A new per-slot maximum
    /// above the configured threshold is logged immediately; the "must be a
    /// new max" condition is what rate-limits these lines.
    pub fn record(&mut self, key: &str, action: &'static str, tx_ms: u64, px_ms: u64) {
        let started = Instant::now();

        let slot = self.slots.entry(key.to_string()).or_default();
        let (tx_new_max, px_new_max) = slot.record(tx_ms, px_ms);

        if tx_new_max && tx_ms > self.log_max_threshold_ms {
            info!(
                "New transmission-time maximum for {}: {}ms ({} event).",
                key, tx_ms, action
            );
        }
        if px_new_max && px_ms > self.log_max_threshold_ms {
            info!(
                "New processing-time maximum for {}: {}ms ({} event).",
                key, px_ms, action
            );
        }

        self.collection_ms += started.elapsed().as_millis() as u64;
    }

    /// Logs the per-key and overall summaries for the closing window, then
    /// resets every slot and the collection-time counter.
    pub fn flush(&mut self) {
        if self.slots.is_empty() {
            debug!("No coherence traffic in this reporting window.");
        } else {
            let mut overall = StatsSlot::default();
            let mut keys: Vec<&String> = self.slots.keys().collect();
            keys.sort();
            for key in keys {
                let slot = &self.slots[key];
                info!(
                    "Coherence stats {}: count={} tx(max/min/avg)={}/{}/{}ms px(max/min/avg)={}/{}/{}ms",
                    key,
                    slot.count,
                    slot.tx_max,
                    slot.tx_min,
                    slot.tx_avg(),
                    slot.px_max,
                    slot.px_min,
                    slot.px_avg()
                );
                overall.merge(slot);
            }
            info!(
                "Coherence stats overall: count={} tx(max/min/sum)={}/{}/{}ms px(max/min/sum)={}/{}/{}ms collection={}ms",
                overall.count,
                overall.tx_max,
                overall.tx_min,
                overall.tx_sum,
                overall.px_max,
                overall.px_min,
                overall.px_sum,
                self.collection_ms
            );
        }

        self.slots.clear();
        self.collection_ms = 0;
    }

    pub fn slot(&self, key: &str) -> Option<StatsSlot> {
        self.slots.get(key).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn collection_ms(&self) -> u64 {
        self.collection_ms
    }
}
