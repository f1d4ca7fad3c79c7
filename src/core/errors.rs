// src/core/errors.rs

//! Defines the primary error type for the entire crate.

use std::sync::Arc;
use thiserror::Error;

/// The main error enum, representing all possible failures within the bus.
/// Using `thiserror` allows for clean error definitions and automatic `From` trait implementations.
#[derive(Error, Debug, Clone)]
pub enum BusError {
    #[error("IO Error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Codec Error: {0}")]
    Codec(String),

    #[error("Inbound message is missing a sender identifier")]
    MissingSender,

    #[error("Bus is not connected to a broker")]
    NotConnected,

    #[error("Unknown entity group {0}")]
    UnknownGroup(i64),

    #[error("Unknown relation {0}")]
    UnknownRelation(i64),

    #[error("Store Error: {0}")]
    Store(String),

    #[error("Internal Error: {0}")]
    Internal(String),
}

// --- From trait implementations for easy error conversion ---

impl From<std::io::Error> for BusError {
    fn from(e: std::io::Error) -> Self {
        BusError::Io(Arc::new(e))
    }
}

impl From<serde_json::Error> for BusError {
    fn from(e: serde_json::Error) -> Self {
        BusError::Codec(e.to_string())
    }
}
