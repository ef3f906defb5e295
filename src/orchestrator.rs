use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, instrument, warn};

use crate::compliance::{ComplianceResolver, NO_TAGS_ISSUE};
use crate::dispatch::WorkMessage;
use crate::error::PipelineResult;
use crate::generation::{FunctionalGenerator, TestCase, build_prompt};
use crate::repository::{ItemRepository, RepositoryProvider};
use crate::state_machine::{ItemOutcome, ItemReport, ItemStatus, StatusMachine};

/// Reason stored when the backend fails the functional phase without saying why.
const UNEXPLAINED_FAILURE: &str = "functional generation reported failure without an issue";

/// Drives one work item through pending → in_progress → completed | failed.
pub struct ItemOrchestrator {
    repositories: Arc<dyn RepositoryProvider>,
    functional: FunctionalGenerator,
    compliance: ComplianceResolver,
    /// Upper bound on the concurrent generation step.
    deadline: Option<Duration>,
}

/// Where `run` stopped, with the case counts it produced.
struct Finished {
    outcome: ItemOutcome,
    functional: usize,
    compliance: usize,
}

impl Finished {
    fn bare(outcome: ItemOutcome) -> Self {
        Self {
            outcome,
            functional: 0,
            compliance: 0,
        }
    }
}

impl ItemOrchestrator {
    pub fn new(
        repositories: Arc<dyn RepositoryProvider>,
        functional: FunctionalGenerator,
        compliance: ComplianceResolver,
    ) -> Self {
        Self {
            repositories,
            functional,
            compliance,
            deadline: None,
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Decodes a raw queue payload and processes it.
    pub async fn handle_payload(&self, payload: &[u8]) -> PipelineResult<ItemReport> {
        let message = WorkMessage::decode(payload)?;
        self.process(&message).await
    }

    /// Processes one work message.
    ///
    /// Business failures and faults after the item was read end as a
    /// `Failed` report with the reason persisted. `Err` is returned only when
    /// the message is invalid or the failure could not be recorded, so the
    /// transport can redeliver it.
    #[instrument(skip_all, fields(item_id = %message.issue_id, job_id = ?message.job_id, source = %message.source()))]
    pub async fn process(&self, message: &WorkMessage) -> PipelineResult<ItemReport> {
        let started_at = Utc::now();
        let source = message.source();
        let item_id = message.issue_id.as_str();
        let mut machine = StatusMachine::new(item_id);

        // Held for the whole invocation; dropped on every return below.
        let repo = self.repositories.open(source).await?;
        debug!(schema = %repo.source(), "repository opened");

        let finished = match self.run(repo.as_ref(), item_id, &mut machine).await {
            Ok(finished) => finished,
            Err(e) if !e.is_fault() && machine.current() == ItemStatus::Pending => {
                info!("item is not pending, treating delivery as a duplicate");
                Finished::bare(ItemOutcome::Skipped)
            }
            Err(fault) => {
                error!(error = %fault, status = %machine.current(), "item processing fault");
                let reason = fault.to_string();
                if let Err(e) = repo.mark_failed(item_id, &reason).await {
                    error!(error = %e, "could not record item failure");
                    return Err(fault);
                }
                machine.advance(ItemStatus::Failed)?;
                Finished::bare(ItemOutcome::Failed { reason })
            }
        };

        let report = ItemReport::new(
            item_id,
            message.job_id.as_deref(),
            source,
            started_at,
            &machine,
            finished.outcome,
        )
        .with_counts(finished.functional, finished.compliance);
        info!(outcome = report.outcome.label(), duration_ms = report.duration_ms, "item processed");
        Ok(report)
    }

    async fn run(
        &self,
        repo: &dyn ItemRepository,
        item_id: &str,
        machine: &mut StatusMachine,
    ) -> PipelineResult<Finished> {
        let input = repo.fetch_input(item_id).await?;
        repo.mark_in_progress(item_id).await?;
        machine.advance(ItemStatus::InProgress)?;

        let prompt = build_prompt(&input.summary, &input.description);
        let both = async {
            tokio::join!(
                self.functional.generate(&prompt),
                self.compliance
                    .resolve(&prompt, &input.compliance_frameworks, &input.custom_rules),
            )
        };
        let (functional, compliance) = match self.deadline {
            Some(limit) => match tokio::time::timeout(limit, both).await {
                Ok(results) => results,
                Err(_) => {
                    // Both calls are cancelled with the dropped future.
                    warn!(
                        target: "stalled_items",
                        item_id,
                        deadline_ms = limit.as_millis() as u64,
                        "generation deadline exceeded, item left in progress"
                    );
                    return Ok(Finished::bare(ItemOutcome::TimedOut));
                }
            },
            None => both.await,
        };

        let functional = functional?;
        if !functional.success {
            if let Err(e) = &compliance {
                debug!(error = %e, "compliance result discarded");
            }
            let reason = if functional.issue.trim().is_empty() {
                UNEXPLAINED_FAILURE.to_string()
            } else {
                functional.issue
            };
            warn!(reason = %reason, "functional phase failed");
            repo.mark_failed(item_id, &reason).await?;
            machine.advance(ItemStatus::Failed)?;
            return Ok(Finished::bare(ItemOutcome::Failed { reason }));
        }

        let compliance = compliance?;
        let compliance_cases = if compliance.success {
            compliance.data
        } else {
            if compliance.issue == NO_TAGS_ISSUE {
                debug!("no compliance tags, functional cases only");
            } else {
                warn!(issue = %compliance.issue, "compliance phase produced no cases");
            }
            Vec::new()
        };

        let functional_count = functional.data.len();
        let compliance_count = compliance_cases.len();
        let cases: Vec<TestCase> = functional
            .data
            .into_iter()
            .chain(compliance_cases)
            .map(|case| TestCase::new(item_id, case))
            .collect();

        repo.persist_test_cases(item_id, &cases).await?;
        repo.mark_completed(item_id).await?;
        machine.advance(ItemStatus::Completed)?;

        Ok(Finished {
            outcome: ItemOutcome::Completed {
                test_cases: cases.len(),
            },
            functional: functional_count,
            compliance: compliance_count,
        })
    }
}
