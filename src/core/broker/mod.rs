// src/core/broker/mod.rs

//! The seam between the bus and the message broker: connection factory,
//! topic publisher, and the subscriber channel a connection delivers into.

pub mod memory;

use crate::core::errors::BusError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

pub use memory::MemoryBroker;

/// The single pub/sub destination every node publishes to and subscribes on.
pub const CACHE_TOPIC: &str = "CACHE.TOPIC";

/// Broker delivery mode for outgoing events.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeliveryMode {
    #[default]
    Persistent,
    NonPersistent,
}

/// One live connection epoch to the broker.
///
/// The broker assigns `instance_id` at connect time; it identifies this node
/// for the lifetime of the connection and is what the suppression filter
/// compares inbound sender stamps against.
pub struct BrokerSession {
    pub instance_id: String,
    pub publisher: Arc<dyn TopicPublisher>,
    /// Raw frames delivered by the subscription, funneled into a single
    /// receiver so the consumer processes one message at a time.
    pub inbound: mpsc::Receiver<Bytes>,
}

/// Connection factory for a broker. `connect` is called once per connection
/// epoch; reconnection simply asks for a fresh session.
#[async_trait]
pub trait BrokerClient: Send + Sync {
    async fn connect(&self, topic: &str) -> Result<BrokerSession, BusError>;
}

/// Outbound half of a broker session.
#[async_trait]
pub trait TopicPublisher: Send + Sync {
    async fn publish(&self, frame: Bytes, mode: DeliveryMode) -> Result<(), BusError>;
}
