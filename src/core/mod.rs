// src/core/mod.rs

//! The central module containing the core logic and data structures of CacheBus.

pub mod broker;
pub mod bus;
pub mod errors;
pub mod events;
pub mod store;

pub use bus::CoherenceBus;
pub use errors::BusError;
pub use events::{BroadcastMessage, CacheEvent, Envelope, RelationEvent};
