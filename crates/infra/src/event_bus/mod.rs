//! Infrastructure event bus implementations.
//!
//! The bus abstraction and the in-memory bus live in `bankledger-events`.
//! This module adds broker-backed transports.

#[cfg(feature = "redis")]
pub mod redis_pubsub;

#[cfg(feature = "redis")]
pub use redis_pubsub::{RedisBusError, RedisPubSubEventBus};
