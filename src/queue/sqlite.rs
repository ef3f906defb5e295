use std::time::Duration;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use super::{Delivery, MessageConsumer, MessagePublisher, QueueError};

/// Durable queue on the `work_queue` outbox table.
///
/// `receive` claims the oldest visible row and hides it for the visibility
/// timeout. Rows are deleted on `ack`; a worker that dies mid-item simply
/// lets the claim expire and the message is delivered again.
#[derive(Clone)]
pub struct SqliteQueue {
    pool: SqlitePool,
    visibility: Duration,
}

fn row_id(delivery_id: &str) -> Result<i64, QueueError> {
    delivery_id
        .parse()
        .map_err(|_| QueueError::UnknownDelivery(delivery_id.to_string()))
}

fn timestamp(at: chrono::DateTime<Utc>) -> String {
    // Fixed width so claim timestamps compare correctly as text.
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl SqliteQueue {
    pub fn new(pool: SqlitePool, visibility: Duration) -> Self {
        Self { pool, visibility }
    }

    /// Messages not yet acknowledged, claimed or not.
    pub async fn len(&self) -> Result<i64, QueueError> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM work_queue")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl MessagePublisher for SqliteQueue {
    async fn publish(&self, payload: Vec<u8>) -> Result<String, QueueError> {
        let payload = String::from_utf8(payload)
            .map_err(|e| QueueError::Rejected(format!("payload is not UTF-8: {e}")))?;
        let id = sqlx::query("INSERT INTO work_queue (payload, enqueued_at) VALUES (?, ?)")
            .bind(payload)
            .bind(timestamp(Utc::now()))
            .execute(&self.pool)
            .await?
            .last_insert_rowid();
        debug!(message_id = id, "message queued");
        Ok(id.to_string())
    }
}

#[async_trait]
impl MessageConsumer for SqliteQueue {
    async fn receive(&self) -> Result<Option<Delivery>, QueueError> {
        let now = Utc::now();
        let visibility = chrono::Duration::from_std(self.visibility)
            .map_err(|e| QueueError::Rejected(format!("visibility timeout out of range: {e}")))?;
        let expired_before = timestamp(now - visibility);

        let row = sqlx::query(
            r#"
            UPDATE work_queue
            SET claimed_at = ?, attempts = attempts + 1
            WHERE id = (
                SELECT id FROM work_queue
                WHERE claimed_at IS NULL OR claimed_at < ?
                ORDER BY id
                LIMIT 1
            )
            RETURNING id, payload, attempts
            "#,
        )
        .bind(timestamp(now))
        .bind(expired_before)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: i64 = row.try_get("id")?;
        let payload: String = row.try_get("payload")?;
        let attempts: i64 = row.try_get("attempts")?;
        Ok(Some(Delivery {
            id: id.to_string(),
            payload: payload.into_bytes(),
            attempt: u32::try_from(attempts).unwrap_or(u32::MAX),
        }))
    }

    async fn ack(&self, delivery_id: &str) -> Result<(), QueueError> {
        let done = sqlx::query("DELETE FROM work_queue WHERE id = ?")
            .bind(row_id(delivery_id)?)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(QueueError::UnknownDelivery(delivery_id.to_string()));
        }
        Ok(())
    }

    async fn nack(&self, delivery_id: &str) -> Result<(), QueueError> {
        let done = sqlx::query("UPDATE work_queue SET claimed_at = NULL WHERE id = ?")
            .bind(row_id(delivery_id)?)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(QueueError::UnknownDelivery(delivery_id.to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;

    #[tokio::test]
    async fn claimed_message_is_hidden_until_acked() {
        let queue = SqliteQueue::new(memory_pool().await, Duration::from_secs(60));
        let id = queue.publish(br#"{"issueId":"i1"}"#.to_vec()).await.unwrap();

        let d = queue.receive().await.unwrap().unwrap();
        assert_eq!(d.id, id);
        assert_eq!(d.attempt, 1);
        assert_eq!(d.payload, br#"{"issueId":"i1"}"#);
        assert!(queue.receive().await.unwrap().is_none());

        queue.ack(&d.id).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn expired_claim_is_redelivered() {
        let queue = SqliteQueue::new(memory_pool().await, Duration::ZERO);
        queue.publish(b"{}".to_vec()).await.unwrap();

        let first = queue.receive().await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = queue.receive().await.unwrap().unwrap();
        assert_eq!(second.id, first.id);
        assert_eq!(second.attempt, 2);
    }

    #[tokio::test]
    async fn nack_makes_message_visible_again() {
        let queue = SqliteQueue::new(memory_pool().await, Duration::from_secs(60));
        queue.publish(b"a".to_vec()).await.unwrap();
        queue.publish(b"b".to_vec()).await.unwrap();

        let a = queue.receive().await.unwrap().unwrap();
        queue.nack(&a.id).await.unwrap();
        let again = queue.receive().await.unwrap().unwrap();
        assert_eq!(again.payload, b"a");
        assert_eq!(again.attempt, 2);

        assert!(matches!(queue.ack("999").await, Err(QueueError::UnknownDelivery(_))));
    }

    #[tokio::test]
    async fn rejects_non_utf8_payload() {
        let queue = SqliteQueue::new(memory_pool().await, Duration::from_secs(60));
        let err = queue.publish(vec![0xff, 0xfe]).await.unwrap_err();
        assert!(matches!(err, QueueError::Rejected(_)));
    }
}
