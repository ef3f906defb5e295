use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// The four statuses of a work item.
///
/// Each item flows through: PENDING → IN_PROGRESS → COMPLETED | FAILED
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ItemStatus {
    /// Column value used by both storage schemas.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::Pending => "pending",
            ItemStatus::InProgress => "in_progress",
            ItemStatus::Completed => "completed",
            ItemStatus::Failed => "failed",
        }
    }

    /// Whether the status machine allows moving from `self` to `next`.
    ///
    /// - `Pending` may only be claimed (`InProgress`) or failed outright when a
    ///   fault hits before the claim.
    /// - `InProgress` ends in `Completed` or `Failed`.
    /// - `Completed` and `Failed` are terminal.
    pub fn can_transition_to(&self, next: ItemStatus) -> bool {
        matches!(
            (self, next),
            (ItemStatus::Pending, ItemStatus::InProgress)
                | (ItemStatus::Pending, ItemStatus::Failed)
                | (ItemStatus::InProgress, ItemStatus::Completed)
                | (ItemStatus::InProgress, ItemStatus::Failed)
        )
    }

    /// The statuses an item may be in right before moving to `self`.
    pub fn sources(&self) -> &'static [ItemStatus] {
        match self {
            ItemStatus::Pending => &[],
            ItemStatus::InProgress => &[ItemStatus::Pending],
            ItemStatus::Completed => &[ItemStatus::InProgress],
            ItemStatus::Failed => &[ItemStatus::Pending, ItemStatus::InProgress],
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ItemStatus::Pending),
            "in_progress" => Ok(ItemStatus::InProgress),
            "completed" => Ok(ItemStatus::Completed),
            "failed" => Ok(ItemStatus::Failed),
            other => Err(PipelineError::Validation(format!(
                "unknown item status: {other}"
            ))),
        }
    }
}

/// Tracks the status walk of one item inside a single invocation.
#[derive(Debug, Clone)]
pub struct StatusMachine {
    item_id: String,
    current: ItemStatus,
    history: Vec<ItemStatus>,
}

impl StatusMachine {
    /// Starts a walk for an item observed in `Pending`.
    pub fn new(item_id: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            current: ItemStatus::Pending,
            history: Vec::new(),
        }
    }

    pub fn current(&self) -> ItemStatus {
        self.current
    }

    /// Every status visited so far, oldest first, including the current one.
    pub fn transitions(&self) -> Vec<ItemStatus> {
        let mut all = self.history.clone();
        all.push(self.current);
        all
    }

    /// Applies a transition, rejecting anything the status graph forbids.
    pub fn advance(&mut self, next: ItemStatus) -> Result<(), PipelineError> {
        if !self.current.can_transition_to(next) {
            return Err(PipelineError::IllegalTransition {
                item_id: self.item_id.clone(),
                from: self.current.to_string(),
                to: next.to_string(),
            });
        }
        self.history.push(self.current);
        self.current = next;
        Ok(())
    }
}
