//! External key/value store seam.
//!
//! The engine treats the store as three facilities: a keyed JSON sink for
//! snapshots, named lists used as work queues, and a publish/subscribe bus
//! for outbound events. Workers block on `QueueConsumer::pop` with a short
//! timeout so shutdown is observed promptly.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "store error: {}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError(err.to_string())
    }
}

/// A blocking list consumer. Each worker thread holds its own, so one
/// worker's blocked pop never stalls another's.
pub trait QueueConsumer: Send {
    /// Pop the head of `queue`, waiting up to `timeout`. `None` on timeout.
    fn pop(&mut self, queue: &str, timeout: Duration) -> Result<Option<String>, StoreError>;
}

pub trait EngineStore: Send + Sync {
    fn ping(&self) -> Result<(), StoreError>;

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Append to the tail of a named list.
    fn rpush(&self, queue: &str, value: &str) -> Result<(), StoreError>;

    /// Fire-and-forget publish on a named channel.
    fn publish(&self, channel: &str, message: &str) -> Result<(), StoreError>;

    /// A dedicated blocking consumer for the input queue.
    fn queue_consumer(&self) -> Result<Box<dyn QueueConsumer>, StoreError>;
}
