//! Fan-out of one job into per-item work messages.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::queue::MessagePublisher;
use crate::state_machine::SourceType;

/// Batch handed to the dispatcher by the trigger adapter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub issue_ids: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceType>,
}

impl DispatchRequest {
    pub fn from_json(body: &[u8]) -> PipelineResult<Self> {
        serde_json::from_slice(body)
            .map_err(|e| PipelineError::Validation(format!("invalid dispatch payload: {e}")))
    }

    fn validate(&self) -> PipelineResult<()> {
        if self.job_id.trim().is_empty() {
            return Err(PipelineError::Validation("missing jobId".into()));
        }
        if self.issue_ids.is_empty() {
            return Err(PipelineError::Validation("issueIds must not be empty".into()));
        }
        Ok(())
    }
}

/// One queued unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(alias = "itemId")]
    pub issue_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl WorkMessage {
    /// Decodes an inbound payload. Unknown sources and missing item ids are
    /// validation errors.
    pub fn decode(payload: &[u8]) -> PipelineResult<Self> {
        let message: WorkMessage = serde_json::from_slice(payload)
            .map_err(|e| PipelineError::Validation(format!("invalid work message: {e}")))?;
        if message.issue_id.trim().is_empty() {
            return Err(PipelineError::Validation("work message has an empty item id".into()));
        }
        Ok(message)
    }

    /// Messages without a declared source come from the tracker sync.
    pub fn source(&self) -> SourceType {
        self.source.unwrap_or(SourceType::Tracked)
    }
}

/// Result of one dispatch call. `unprocessed_issues` holds `(item id, error)`
/// pairs in request order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchOutcome {
    pub success: bool,
    pub errors: bool,
    pub unprocessed_issues: Vec<(String, String)>,
}

pub struct Dispatcher {
    publisher: Arc<dyn MessagePublisher>,
}

impl Dispatcher {
    pub fn new(publisher: Arc<dyn MessagePublisher>) -> Self {
        Self { publisher }
    }

    /// Publishes one message per item. A publish failure is recorded against
    /// its item and the remaining items are still attempted.
    #[instrument(skip_all, fields(job_id = %request.job_id, items = request.issue_ids.len()))]
    pub async fn dispatch(&self, request: &DispatchRequest) -> PipelineResult<DispatchOutcome> {
        request.validate()?;

        let mut unprocessed = Vec::new();
        for issue_id in &request.issue_ids {
            let message = WorkMessage {
                job_id: Some(request.job_id.clone()),
                issue_id: issue_id.clone(),
                source: request.source,
                timestamp: Some(Utc::now()),
            };
            let payload = serde_json::to_vec(&message)?;
            if let Err(e) = self.publisher.publish(payload).await {
                warn!(issue_id = %issue_id, error = %e, "failed to enqueue item");
                unprocessed.push((issue_id.clone(), e.to_string()));
            }
        }

        info!(
            published = request.issue_ids.len() - unprocessed.len(),
            failed = unprocessed.len(),
            "dispatch finished"
        );
        Ok(DispatchOutcome {
            success: true,
            errors: !unprocessed.is_empty(),
            unprocessed_issues: unprocessed,
        })
    }
}
