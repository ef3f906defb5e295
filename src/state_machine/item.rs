use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::status::{ItemStatus, StatusMachine};

/// Which storage schema an item lives in.
///
/// Tracked items come from a synced issue tracker, standalone items from
/// requirement documents uploaded directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    #[serde(alias = "jira")]
    Tracked,
    #[serde(alias = "manual")]
    Standalone,
}

impl std::fmt::Display for SourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceType::Tracked => write!(f, "tracked"),
            SourceType::Standalone => write!(f, "standalone"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl std::str::FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Severity::Low),
            "medium" => Ok(Severity::Medium),
            "high" => Ok(Severity::High),
            "critical" => Ok(Severity::Critical),
            other => Err(format!("unknown severity: {other}")),
        }
    }
}

/// A project-specific rule the compliance phase must respect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomRule {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

/// Everything the generation phases need from a pending item.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemInput {
    pub compliance_frameworks: Vec<String>,
    pub custom_rules: Vec<CustomRule>,
    pub summary: String,
    pub description: String,
}

/// How one delivery of a work message ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ItemOutcome {
    /// Test cases persisted and the item marked completed.
    Completed { test_cases: usize },
    /// Item marked failed with this reason.
    Failed { reason: String },
    /// Item was no longer pending; the delivery was a redelivery.
    Skipped,
    /// Invocation deadline hit during generation; item left in progress.
    TimedOut,
}

impl ItemOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            ItemOutcome::Completed { .. } => "completed",
            ItemOutcome::Failed { .. } => "failed",
            ItemOutcome::Skipped => "skipped",
            ItemOutcome::TimedOut => "timed_out",
        }
    }
}

/// Structured record produced for every processed message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemReport {
    pub item_id: String,
    pub job_id: Option<String>,
    pub source: SourceType,
    pub outcome: ItemOutcome,
    pub status_transitions: Vec<ItemStatus>,
    pub functional_cases: usize,
    pub compliance_cases: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_ms: i64,
}

impl ItemReport {
    pub fn new(
        item_id: &str,
        job_id: Option<&str>,
        source: SourceType,
        started_at: DateTime<Utc>,
        machine: &StatusMachine,
        outcome: ItemOutcome,
    ) -> Self {
        let now = Utc::now();
        Self {
            item_id: item_id.to_string(),
            job_id: job_id.map(str::to_string),
            source,
            outcome,
            status_transitions: machine.transitions(),
            functional_cases: 0,
            compliance_cases: 0,
            started_at,
            finished_at: now,
            duration_ms: (now - started_at).num_milliseconds(),
        }
    }

    pub fn with_counts(mut self, functional: usize, compliance: usize) -> Self {
        self.functional_cases = functional;
        self.compliance_cases = compliance;
        self
    }
}
