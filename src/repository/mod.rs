//! Source-agnostic access to work items.
//!
//! Tracked issues and standalone requirements live in different tables but
//! expose the same contract; the caller picks the variant once, from the
//! message's declared [`SourceType`].

mod sqlite;

use async_trait::async_trait;

pub use sqlite::SqliteRepositories;
#[cfg(test)]
pub(crate) use sqlite::fixtures;

use crate::error::PipelineResult;
use crate::generation::TestCase;
use crate::state_machine::{ItemInput, SourceType};

#[async_trait]
pub trait ItemRepository: Send + Sync {
    fn source(&self) -> SourceType;

    /// Reads the generation input of a `pending` item. Anything else,
    /// including an item already claimed by an earlier delivery, is `NotFound`.
    async fn fetch_input(&self, item_id: &str) -> PipelineResult<ItemInput>;

    /// pending → in_progress.
    async fn mark_in_progress(&self, item_id: &str) -> PipelineResult<()>;

    /// → failed, persisting a non-empty reason.
    async fn mark_failed(&self, item_id: &str, reason: &str) -> PipelineResult<()>;

    /// in_progress → completed. Only valid once the test cases are stored.
    async fn mark_completed(&self, item_id: &str) -> PipelineResult<()>;

    /// Stores every case or none of them.
    async fn persist_test_cases(&self, item_id: &str, cases: &[TestCase]) -> PipelineResult<()>;
}

/// Hands out a repository scoped to one item invocation.
#[async_trait]
pub trait RepositoryProvider: Send + Sync {
    async fn open(&self, source: SourceType) -> PipelineResult<Box<dyn ItemRepository>>;
}
