// src/core/broker/memory.rs

//! An in-process broker for tests and single-binary deployments.
//! It manages one broadcast channel per topic; every session subscribes to
//! the topic it connects to and receives every frame published on it,
//! including its own (the suppression filter deals with self-echoes).

use crate::core::broker::{BrokerClient, BrokerSession, DeliveryMode, TopicPublisher};
use crate::core::errors::BusError;
use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;
use uuid::Uuid;

/// The capacity of each topic's broadcast channel. A subscriber that lags
/// behind by more than this many frames loses the overflow.
const TOPIC_CAPACITY: usize = 1024;

/// `MemoryBroker` is a topic registry shared by every node in the process.
#[derive(Debug, Default)]
pub struct MemoryBroker {
    topics: DashMap<String, broadcast::Sender<Bytes>>,
}

impl MemoryBroker {
    pub fn new() -> Arc<Self> {
        Arc::new(Default::default())
    }

    fn topic_sender(&self, topic: &str) -> broadcast::Sender<Bytes> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .value()
            .clone()
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn connect(&self, topic: &str) -> Result<BrokerSession, BusError> {
        let sender = self.topic_sender(topic);
        let mut topic_rx = sender.subscribe();
        let (inbound_tx, inbound_rx) = mpsc::channel(TOPIC_CAPACITY);
        let instance_id = Uuid::new_v4().to_string();

        // Funnel the broadcast subscription into a single mpsc receiver so
        // the consumer side processes frames one at a time. The task exits
        // when the session's receiver is dropped.
        let session_id = instance_id.clone();
        tokio::spawn(async move {
            loop {
                match topic_rx.recv().await {
                    Ok(frame) => {
                        if inbound_tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(
                            "Broker session {} lagged behind and lost {} frames.",
                            session_id, missed
                        );
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        });

        Ok(BrokerSession {
            instance_id,
            publisher: Arc::new(MemoryTopicPublisher { sender }),
            inbound: inbound_rx,
        })
    }
}

struct MemoryTopicPublisher {
    sender: broadcast::Sender<Bytes>,
}

#[async_trait]
impl TopicPublisher for MemoryTopicPublisher {
    async fn publish(&self, frame: Bytes, _mode: DeliveryMode) -> Result<(), BusError> {
        // An in-process broker has no persistence, so the delivery mode is
        // accepted and ignored. A topic with no subscribers is not an error.
        let _ = self.sender.send(frame);
        Ok(())
    }
}
