// src/core/bus/publisher.rs

//! The outbound path: stamps every event with the local instance identity
//! and hands it to the broker's topic publisher.

use crate::core::broker::{DeliveryMode, TopicPublisher};
use crate::core::errors::BusError;
use crate::core::events::{BroadcastMessage, Envelope, now_ms};
use parking_lot::RwLock;
use std::sync::Arc;

/// The broker-assigned identity of this node for the current connection
/// epoch. Shared between the publisher adapter (which stamps outbound
/// events) and the suppression filter (which drops inbound self-echoes);
/// reconnection swaps the identifier atomically so there is no window in
/// which a self-echo carries an identifier the filter no longer knows.
#[derive(Debug, Clone, Default)]
pub struct LocalIdentity {
    inner: Arc<RwLock<Option<Arc<str>>>>,
}

impl LocalIdentity {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn set(&self, instance_id: String) {
        *self.inner.write() = Some(instance_id.into());
    }

    pub fn clear(&self) {
        *self.inner.write() = None;
    }

    pub fn get(&self) -> Option<Arc<str>> {
        self.inner.read().clone()
    }

    /// Whether an inbound sender stamp names this node.
    pub fn matches(&self, sender_id: &str) -> bool {
        self.inner
            .read()
            .as_deref()
            .is_some_and(|id| id == sender_id)
    }
}

/// The only code path that reads the instance identity for outbound traffic.
pub struct PublisherAdapter {
    identity: LocalIdentity,
    publisher: Arc<dyn TopicPublisher>,
    delivery_mode: DeliveryMode,
}

impl PublisherAdapter {
    pub fn new(
        identity: LocalIdentity,
        publisher: Arc<dyn TopicPublisher>,
        delivery_mode: DeliveryMode,
    ) -> Self {
        Self {
            identity,
            publisher,
            delivery_mode,
        }
    }

    /// Wraps the payload in an envelope stamped with the local identity and
    /// the send timestamp, then publishes it with the configured delivery
    /// mode. Callers on the notification path log and swallow the error;
    /// the local mutation is already committed.
    pub async fn publish(&self, payload: BroadcastMessage) -> Result<(), BusError> {
        let Some(instance_id) = self.identity.get() else {
            return Err(BusError::NotConnected);
        };

        let envelope = Envelope {
            sender_id: instance_id.to_string(),
            sent_at_ms: now_ms(),
            payload,
        };
        let frame = envelope.encode()?;
        self.publisher.publish(frame, self.delivery_mode).await
    }
}
