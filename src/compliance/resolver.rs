use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, error, info, instrument};

use super::index::{ComplianceClause, ComplianceIndex};
use crate::error::PipelineError;
use crate::generation::{
    CaseKind, Envelope, GeneratedCase, GenerationPort, GenerationRequest, Instructions, OutputShape,
    TagExtraction, generate_as,
};
use crate::state_machine::CustomRule;

pub const NO_TAGS_ISSUE: &str = "No compliance tags found";

const NO_STANDARDS: &str = "No specific project compliance requirements provided.";
const NO_CUSTOM_RULES: &str = "No specific project custom rules provided.";

/// Two-phase compliance generation: tag extraction, then clause-grounded
/// test case generation.
pub struct ComplianceResolver {
    port: Arc<dyn GenerationPort>,
    index: Arc<ComplianceIndex>,
    tags_instruction: String,
    cases_instruction: String,
}

impl ComplianceResolver {
    pub fn new(
        port: Arc<dyn GenerationPort>,
        index: Arc<ComplianceIndex>,
        instructions: &Instructions,
    ) -> Self {
        Self {
            port,
            index,
            tags_instruction: instructions.compliance_tags.clone(),
            cases_instruction: instructions.compliance_cases.clone(),
        }
    }

    #[instrument(skip_all, fields(frameworks = frameworks.len(), custom_rules = custom_rules.len()))]
    pub async fn resolve(
        &self,
        prompt: &str,
        frameworks: &[String],
        custom_rules: &[CustomRule],
    ) -> Result<Envelope<GeneratedCase>, PipelineError> {
        let tags = self.extract_tags(prompt).await?;
        if tags.is_empty() {
            info!("requirement has no compliance relevance");
            return Ok(Envelope::failure(NO_TAGS_ISSUE));
        }

        let clauses = self.clauses_for(&tags)?;
        debug!(tags = ?tags, clauses = clauses.len(), "compliance clauses resolved");

        let request = GenerationRequest::new(prompt, self.cases_instruction.as_str(), OutputShape::ComplianceSuite)
            .with_message(format!(
                "The relevant compliance clauses are: {}",
                serde_json::to_string(&clauses)?
            ))
            .with_message(if frameworks.is_empty() {
                NO_STANDARDS.to_string()
            } else {
                format!(
                    "Project compliance standards to consider: {}",
                    serde_json::to_string(frameworks)?
                )
            })
            .with_message(if custom_rules.is_empty() {
                NO_CUSTOM_RULES.to_string()
            } else {
                format!(
                    "Project custom rules to ensure: {}",
                    serde_json::to_string(custom_rules)?
                )
            });

        let envelope: Envelope<GeneratedCase> = generate_as(self.port.as_ref(), &request).await?;

        if let Some(stray) = envelope
            .data
            .iter()
            .find(|case| case.kind() != CaseKind::Compliance)
        {
            return Err(PipelineError::MalformedOutput(format!(
                "compliance suite contains a {:?} case: {}",
                stray.kind(),
                stray.summary
            )));
        }
        Ok(envelope)
    }

    async fn extract_tags(&self, prompt: &str) -> Result<Vec<String>, PipelineError> {
        let vocabulary = serde_json::to_string(&self.index.tags())?;
        let request = GenerationRequest::new(prompt, self.tags_instruction.as_str(), OutputShape::ComplianceTags)
            .with_message(format!("Allowed compliance tags: {vocabulary}"));
        let extraction: TagExtraction = generate_as(self.port.as_ref(), &request).await?;

        let mut tags: Vec<String> = Vec::new();
        for tag in extraction.tags {
            let tag = tag.trim();
            if !tag.is_empty() && !tags.iter().any(|t| t == tag) {
                tags.push(tag.to_string());
            }
        }
        Ok(tags)
    }

    /// Maps tags to their deduplicated clauses. Any miss means the tag
    /// vocabulary and the index have drifted apart.
    fn clauses_for(&self, tags: &[String]) -> Result<Vec<&ComplianceClause>, PipelineError> {
        let mut ids: BTreeSet<&str> = BTreeSet::new();
        for tag in tags {
            let Some(found) = self.index.clause_ids_for(tag) else {
                error!(target: "compliance_drift", tag = %tag, "tag has no reverse index entry");
                return Err(PipelineError::Configuration(format!(
                    "compliance tag '{tag}' is not in the reverse index"
                )));
            };
            ids.extend(found.iter().map(String::as_str));
        }

        ids.into_iter()
            .map(|id| {
                self.index.clause(id).ok_or_else(|| {
                    error!(target: "compliance_drift", clause_id = id, "clause missing from forward index");
                    PipelineError::Configuration(format!(
                        "clause '{id}' is not in the forward index"
                    ))
                })
            })
            .collect()
    }
}
