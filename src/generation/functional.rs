use std::sync::Arc;

use tracing::{debug, instrument};

use super::{CaseKind, Envelope, GeneratedCase, GenerationPort, GenerationRequest, OutputShape, generate_as};
use crate::error::PipelineError;

/// Produces functional and non-functional cases in a single backend call.
pub struct FunctionalGenerator {
    port: Arc<dyn GenerationPort>,
    instruction: String,
}

impl FunctionalGenerator {
    pub fn new(port: Arc<dyn GenerationPort>, instruction: impl Into<String>) -> Self {
        Self {
            port,
            instruction: instruction.into(),
        }
    }

    /// Returns the backend envelope as-is. A `success = false` answer is a
    /// value, not an error; its `issue` text is the only diagnostic.
    #[instrument(skip_all)]
    pub async fn generate(&self, prompt: &str) -> Result<Envelope<GeneratedCase>, PipelineError> {
        let request = GenerationRequest::new(prompt, self.instruction.as_str(), OutputShape::FunctionalSuite);
        let envelope: Envelope<GeneratedCase> = generate_as(self.port.as_ref(), &request).await?;

        if let Some(stray) = envelope
            .data
            .iter()
            .find(|case| case.kind() == CaseKind::Compliance)
        {
            return Err(PipelineError::MalformedOutput(format!(
                "functional suite contains a compliance case: {}",
                stray.summary
            )));
        }

        debug!(success = envelope.success, cases = envelope.data.len(), "functional phase done");
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generation::GenerationError;
    use async_trait::async_trait;
    use serde_json::{Value, json};
    use std::sync::Mutex;

    struct ScriptedPort {
        reply: Value,
        seen: Mutex<Vec<GenerationRequest>>,
    }

    #[async_trait]
    impl GenerationPort for ScriptedPort {
        async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
            self.seen.lock().unwrap().push(request.clone());
            Ok(self.reply.clone())
        }
    }

    fn port(reply: Value) -> Arc<ScriptedPort> {
        Arc::new(ScriptedPort {
            reply,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn sends_prompt_once_with_functional_shape() {
        let p = port(json!({"success": true, "issue": "", "data": []}));
        let generator = FunctionalGenerator::new(p.clone(), "be thorough");

        let env = generator.generate("**Requirement Title**\n- x").await.unwrap();
        assert!(env.success);

        let seen = p.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].shape, OutputShape::FunctionalSuite);
        assert_eq!(seen[0].system_instruction, "be thorough");
        assert_eq!(seen[0].messages, vec!["**Requirement Title**\n- x".to_string()]);
    }

    #[tokio::test]
    async fn backend_issue_is_passed_through_verbatim() {
        let p = port(json!({"success": false, "issue": "Requirement text is empty", "data": []}));
        let env = FunctionalGenerator::new(p, "i").generate("p").await.unwrap();
        assert!(!env.success);
        assert_eq!(env.issue, "Requirement text is empty");
    }

    #[tokio::test]
    async fn compliance_case_in_functional_suite_is_malformed() {
        let p = port(json!({
            "success": true,
            "issue": "",
            "data": [{
                "summary": "COMPLIANCE - audit",
                "description": {
                    "type": "compliance",
                    "compliance_rule": "HIPAA 164.312(b)",
                    "preconditions": "",
                    "testing_procedure": [],
                    "expected_result": "",
                    "compliance_impact": ""
                }
            }]
        }));
        let err = FunctionalGenerator::new(p, "i").generate("p").await.unwrap_err();
        assert!(matches!(err, PipelineError::MalformedOutput(_)));
    }
}
