use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::{Mutex, mpsc};
use tracing::debug;

use super::{Delivery, MessageConsumer, MessagePublisher, QueueError};

/// In-process queue on a tokio channel, for single-process runs and tests.
///
/// Received messages are held in flight until acknowledged; `nack` puts them
/// back at the tail with the attempt counter bumped.
pub struct MemoryQueue {
    sender: mpsc::UnboundedSender<Delivery>,
    receiver: Mutex<mpsc::UnboundedReceiver<Delivery>>,
    in_flight: Mutex<HashMap<String, Delivery>>,
    queued: AtomicUsize,
    next_id: AtomicU64,
    closed: AtomicBool,
}

impl MemoryQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            sender,
            receiver: Mutex::new(receiver),
            in_flight: Mutex::new(HashMap::new()),
            queued: AtomicUsize::new(0),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
        }
    }

    /// Rejects further publishes. Already queued messages stay receivable.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub async fn in_flight(&self) -> usize {
        self.in_flight.lock().await.len()
    }

    /// Nothing queued and nothing awaiting acknowledgement.
    pub async fn is_drained(&self) -> bool {
        let in_flight = self.in_flight.lock().await;
        in_flight.is_empty() && self.queued.load(Ordering::SeqCst) == 0
    }
}

impl Default for MemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessagePublisher for MemoryQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<String, QueueError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(QueueError::Closed);
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        self.queued.fetch_add(1, Ordering::SeqCst);
        self.sender
            .send(Delivery {
                id: id.clone(),
                payload,
                attempt: 0,
            })
            .map_err(|_| QueueError::Closed)?;
        debug!(message_id = %id, "message queued");
        Ok(id)
    }
}

#[async_trait]
impl MessageConsumer for MemoryQueue {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let mut receiver = self.receiver.lock().await;
        match receiver.try_recv() {
            Ok(mut delivery) => {
                delivery.attempt += 1;
                let mut in_flight = self.in_flight.lock().await;
                in_flight.insert(delivery.id.clone(), delivery.clone());
                self.queued.fetch_sub(1, Ordering::SeqCst);
                Ok(Some(delivery))
            }
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => Err(QueueError::Closed),
        }
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), QueueError> {
        self.in_flight
            .lock()
            .await
            .remove(delivery_id)
            .map(|_| ())
            .ok_or_else(|| QueueError::UnknownDelivery(delivery_id.to_string()))
    }

    async fn nack(&self, delivery_id: &str) -> Result<(), QueueError> {
        let mut in_flight = self.in_flight.lock().await;
        let delivery = in_flight
            .remove(delivery_id)
            .ok_or_else(|| QueueError::UnknownDelivery(delivery_id.to_string()))?;
        self.queued.fetch_add(1, Ordering::SeqCst);
        self.sender.send(delivery).map_err(|_| QueueError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn delivers_in_publish_order() {
        let queue = MemoryQueue::new();
        queue.publish(b"a".to_vec()).await.unwrap();
        queue.publish(b"b".to_vec()).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(first.payload, b"a");
        assert_eq!(second.payload, b"b");
        assert_eq!(first.attempt, 1);
        assert!(queue.receive().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn nack_redelivers_with_next_attempt() {
        let queue = MemoryQueue::new();
        queue.publish(b"x".to_vec()).await.unwrap();

        let d = queue.receive().await.unwrap().unwrap();
        queue.nack(&d.id).await.unwrap();
        let again = queue.receive().await.unwrap().unwrap();
        assert_eq!(again.id, d.id);
        assert_eq!(again.attempt, 2);

        assert!(!queue.is_drained().await);
        queue.ack(&again.id).await.unwrap();
        assert_eq!(queue.in_flight().await, 0);
        assert!(queue.is_drained().await);
        assert!(matches!(queue.ack(&again.id).await, Err(QueueError::UnknownDelivery(_))));
    }

    #[tokio::test]
    async fn closed_queue_rejects_publish() {
        let queue = MemoryQueue::new();
        queue.close();
        assert!(matches!(queue.publish(b"x".to_vec()).await, Err(QueueError::Closed)));
    }
}
