//! Queue consumer loop.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::error::PipelineError;
use crate::orchestrator::ItemOrchestrator;
use crate::queue::{Delivery, MessageConsumer, QueueError};

/// How a delivery was settled with the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Settled {
    Processed,
    Dropped,
    Retried,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Acknowledged after the orchestrator produced a report.
    pub processed: usize,
    /// Undecodable payloads, acknowledged without processing.
    pub dropped: usize,
    /// Handed back to the queue for redelivery.
    pub retried: usize,
}

impl WorkerStats {
    fn record(&mut self, settled: Settled) {
        match settled {
            Settled::Processed => self.processed += 1,
            Settled::Dropped => self.dropped += 1,
            Settled::Retried => self.retried += 1,
        }
    }
}

pub struct Worker {
    consumer: Arc<dyn MessageConsumer>,
    orchestrator: Arc<ItemOrchestrator>,
    concurrency: usize,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(
        consumer: Arc<dyn MessageConsumer>,
        orchestrator: Arc<ItemOrchestrator>,
        concurrency: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            consumer,
            orchestrator,
            concurrency: concurrency.max(1),
            poll_interval,
        }
    }

    /// Processes messages until `shutdown` resolves, then waits for the items
    /// already in flight.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) -> Result<WorkerStats, QueueError> {
        tokio::pin!(shutdown);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut tasks: JoinSet<Settled> = JoinSet::new();
        let mut stats = WorkerStats::default();
        info!(concurrency = self.concurrency, "worker started");

        loop {
            while let Some(joined) = tasks.try_join_next() {
                record_joined(&mut stats, joined);
            }

            let permit = tokio::select! {
                _ = &mut shutdown => break,
                permit = semaphore.clone().acquire_owned() => permit.map_err(|_| QueueError::Closed)?,
            };

            let delivery = match self.consumer.receive().await {
                Ok(Some(delivery)) => delivery,
                Ok(None) => {
                    drop(permit);
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.poll_interval) => continue,
                    }
                }
                Err(e) => {
                    drop(permit);
                    warn!(error = %e, "receive failed");
                    tokio::select! {
                        _ = &mut shutdown => break,
                        _ = tokio::time::sleep(self.poll_interval) => continue,
                    }
                }
            };

            let consumer = self.consumer.clone();
            let orchestrator = self.orchestrator.clone();
            tasks.spawn(async move {
                let settled = settle(consumer.as_ref(), &orchestrator, delivery).await;
                drop(permit);
                settled
            });
        }

        info!(in_flight = tasks.len(), "shutting down, waiting for in-flight items");
        while let Some(joined) = tasks.join_next().await {
            record_joined(&mut stats, joined);
        }
        info!(
            processed = stats.processed,
            dropped = stats.dropped,
            retried = stats.retried,
            "worker stopped"
        );
        Ok(stats)
    }
}

fn record_joined(stats: &mut WorkerStats, joined: Result<Settled, tokio::task::JoinError>) {
    match joined {
        Ok(settled) => stats.record(settled),
        Err(e) => error!(error = %e, "item task panicked"),
    }
}

async fn settle(
    consumer: &dyn MessageConsumer,
    orchestrator: &ItemOrchestrator,
    delivery: Delivery,
) -> Settled {
    let result = orchestrator.handle_payload(&delivery.payload).await;
    let settled = match &result {
        Ok(_) => Settled::Processed,
        Err(PipelineError::Validation(reason)) => {
            warn!(message_id = %delivery.id, reason = %reason, "dropping invalid message");
            Settled::Dropped
        }
        Err(e) => {
            warn!(message_id = %delivery.id, attempt = delivery.attempt, error = %e, "item not settled, returning message");
            Settled::Retried
        }
    };

    let acked = match settled {
        Settled::Retried => consumer.nack(&delivery.id).await,
        _ => consumer.ack(&delivery.id).await,
    };
    if let Err(e) = acked {
        error!(message_id = %delivery.id, error = %e, "failed to settle message");
    }
    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::generation::OutputShape;
    use crate::orchestrator::tests::{ShapePort, functional_reply, sqlite_orchestrator};
    use crate::queue::{MemoryQueue, MessagePublisher};
    use crate::repository::fixtures::{seed_item, status_of};
    use crate::state_machine::SourceType;
    use serde_json::json;

    async fn drained(queue: Arc<MemoryQueue>) {
        while !queue.is_drained().await {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    #[tokio::test]
    async fn processes_valid_and_drops_invalid_messages() {
        let pool = memory_pool().await;
        for id in ["i1", "i2"] {
            seed_item(&pool, SourceType::Tracked, id, "Search", "Search by name", &[], &[]).await;
        }
        let port = Arc::new(
            ShapePort::default()
                .reply(OutputShape::FunctionalSuite, functional_reply(2))
                .reply(OutputShape::ComplianceTags, json!({"tags": []})),
        );
        let orchestrator = Arc::new(sqlite_orchestrator(&pool, port));

        let queue = Arc::new(MemoryQueue::new());
        for payload in [
            r#"{"jobId":"j","issueId":"i1"}"#,
            r#"{"jobId":"j","issueId":"i2","source":"jira"}"#,
            r#"{"jobId":"j","issueId":"gone"}"#,
            "garbage",
        ] {
            queue.publish(payload.as_bytes().to_vec()).await.unwrap();
        }

        let worker = Worker::new(queue.clone(), orchestrator, 2, Duration::from_millis(5));
        let stats = worker.run(drained(queue.clone())).await.unwrap();

        assert_eq!(
            stats,
            WorkerStats {
                processed: 3,
                dropped: 1,
                retried: 0
            }
        );
        for id in ["i1", "i2"] {
            assert_eq!(status_of(&pool, SourceType::Tracked, id).await.0, "completed");
        }
    }

    #[tokio::test]
    async fn stops_immediately_when_idle() {
        let pool = memory_pool().await;
        let orchestrator = Arc::new(sqlite_orchestrator(&pool, Arc::new(ShapePort::default())));
        let queue = Arc::new(MemoryQueue::new());

        let worker = Worker::new(queue, orchestrator, 1, Duration::from_millis(5));
        let stats = worker.run(async {}).await.unwrap();
        assert_eq!(stats, WorkerStats::default());
    }
}
