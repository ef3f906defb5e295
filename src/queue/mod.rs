//! Work-message transport.
//!
//! The dispatcher publishes one message per item; workers receive, process
//! and acknowledge them. Delivery is at-least-once: a message that is not
//! acknowledged comes back.

#[cfg(test)]
mod memory;
mod sqlite;

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
pub use memory::MemoryQueue;
pub use sqlite::SqliteQueue;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue is closed")]
    Closed,

    #[error("message rejected: {0}")]
    Rejected(String),

    #[error("unknown delivery: {0}")]
    UnknownDelivery(String),

    #[error("queue storage error: {0}")]
    Storage(#[from] sqlx::Error),
}

/// A received message awaiting `ack` or `nack`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub id: String,
    pub payload: Vec<u8>,
    /// 1 on first delivery, incremented on every redelivery.
    pub attempt: u32,
}

#[async_trait]
pub trait MessagePublisher: Send + Sync {
    /// Enqueues a payload and returns the transport's message id.
    async fn publish(&self, payload: Vec<u8>) -> Result<String, QueueError>;
}

#[async_trait]
pub trait MessageConsumer: Send + Sync {
    /// Next visible message, or `None` when the queue is currently empty.
    async fn receive(&self) -> Result<Option<Delivery>, QueueError>;

    async fn ack(&self, delivery_id: &str) -> Result<(), QueueError>;

    /// Makes the message visible again for redelivery.
    async fn nack(&self, delivery_id: &str) -> Result<(), QueueError>;
}
