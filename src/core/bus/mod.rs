// src/core/bus/mod.rs

//! The coherence bus itself: lifecycle control plus the outbound and
//! inbound halves wired to one broker session at a time.

pub mod consumer;
pub mod listener;
pub mod publisher;
pub mod stats;

pub use consumer::Consumer;
pub use listener::{CollapsePolicy, SizeThresholdPolicy};
pub use publisher::{LocalIdentity, PublisherAdapter};
pub use stats::{StatsAggregator, StatsSlot};

use crate::config::BusConfig;
use crate::core::broker::BrokerClient;
use crate::core::bus::consumer::ConsumerTask;
use crate::core::errors::BusError;
use crate::core::store::EntityStore;
use std::sync::Arc;
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use tracing::info;

/// One live connection epoch: the outbound adapter plus the consumer task
/// draining the subscription.
struct ActiveSession {
    adapter: Arc<PublisherAdapter>,
    shutdown_tx: broadcast::Sender<()>,
    consumer: JoinHandle<()>,
}

/// Keeps per-node caches of typed entities and relations consistent across
/// a cluster by broadcasting mutation events on a shared topic.
///
/// Lifecycle: built in a configured state, [`connect`](Self::connect) opens
/// a broker session (idempotent, also used for reconnection), and
/// [`close`](Self::close) tears it down. The notification operations the
/// local store calls live in [`listener`].
pub struct CoherenceBus {
    pub(crate) config: BusConfig,
    pub(crate) store: Arc<dyn EntityStore>,
    broker: Arc<dyn BrokerClient>,
    pub(crate) collapse_policy: Arc<dyn CollapsePolicy>,
    identity: LocalIdentity,
    session: Mutex<Option<ActiveSession>>,
}

impl CoherenceBus {
    pub fn new(
        config: BusConfig,
        store: Arc<dyn EntityStore>,
        broker: Arc<dyn BrokerClient>,
    ) -> Self {
        let collapse_policy: Arc<dyn CollapsePolicy> =
            Arc::new(SizeThresholdPolicy::new(config.maximum_relation_size));
        Self {
            config,
            store,
            broker,
            collapse_policy,
            identity: LocalIdentity::new(),
            session: Mutex::new(None),
        }
    }

    /// Replaces the size-threshold collapse policy. Meant for tests and for
    /// deployments that collapse on something other than pair count.
    pub fn with_collapse_policy(mut self, policy: Arc<dyn CollapsePolicy>) -> Self {
        self.collapse_policy = policy;
        self
    }

    /// Opens a fresh broker session, recording the instance identifier the
    /// broker assigned, and starts the consumer. Any existing session is
    /// closed first, which makes `connect` idempotent and usable for
    /// reconnection.
    pub async fn connect(&self) -> Result<(), BusError> {
        self.close().await;

        let session = self.broker.connect(&self.config.topic).await?;
        info!(
            "Connected to topic '{}' as instance {}.",
            self.config.topic, session.instance_id
        );
        self.identity.set(session.instance_id);

        let adapter = Arc::new(PublisherAdapter::new(
            self.identity.clone(),
            session.publisher,
            self.config.delivery_mode,
        ));

        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let consumer = Consumer::new(
            self.store.clone(),
            self.identity.clone(),
            StatsAggregator::new(self.config.stats_log_max_threshold_ms),
        );
        let task = ConsumerTask::new(consumer, session.inbound, self.config.stats_period);
        let handle = tokio::spawn(task.run(shutdown_rx));

        *self.session.lock().await = Some(ActiveSession {
            adapter,
            shutdown_tx,
            consumer: handle,
        });
        Ok(())
    }

    /// Shuts down the consumer and forgets the session. In-flight message
    /// handling completes before the consumer stops; anything arriving
    /// afterwards is ignored. Safe to call when already closed.
    pub async fn close(&self) {
        let session = self.session.lock().await.take();
        if let Some(session) = session {
            let _ = session.shutdown_tx.send(());
            let _ = session.consumer.await;
            self.identity.clear();
            info!("Coherence bus closed.");
        }
    }

    /// The broker-assigned identifier for the current connection epoch.
    pub fn instance_id(&self) -> Option<String> {
        self.identity.get().map(|id| id.to_string())
    }

    pub fn is_connected(&self) -> bool {
        self.identity.get().is_some()
    }

    pub(crate) async fn adapter(&self) -> Option<Arc<PublisherAdapter>> {
        self.session.lock().await.as_ref().map(|s| s.adapter.clone())
    }
}
