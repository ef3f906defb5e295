pub mod cases;
pub mod client;
pub mod error;
pub mod functional;
pub mod instructions;
pub mod prompt;
pub mod shape;
pub mod types;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::PipelineError;

pub use cases::{CaseKind, Envelope, GeneratedCase, TagExtraction, TestCase};
pub use client::{API_URL, AnthropicGenerator};
pub use error::GenerationError;
pub use functional::FunctionalGenerator;
pub use instructions::Instructions;
pub use prompt::build_prompt;
pub use shape::OutputShape;

/// One structured-output request: user turns, a system instruction and the
/// shape the answer must take.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub messages: Vec<String>,
    pub system_instruction: String,
    pub shape: OutputShape,
}

impl GenerationRequest {
    pub fn new(prompt: impl Into<String>, system_instruction: impl Into<String>, shape: OutputShape) -> Self {
        Self {
            messages: vec![prompt.into()],
            system_instruction: system_instruction.into(),
            shape,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.messages.push(message.into());
        self
    }
}

/// Capability for obtaining structured JSON from a text-generation backend.
#[async_trait]
pub trait GenerationPort: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError>;
}

/// Runs a request and decodes the answer into the type its shape promises.
pub async fn generate_as<T: DeserializeOwned>(
    port: &dyn GenerationPort,
    request: &GenerationRequest,
) -> Result<T, PipelineError> {
    let value = port.generate(request).await?;
    serde_json::from_value(value).map_err(|e| {
        PipelineError::MalformedOutput(format!("{} response: {e}", request.shape.name()))
    })
}
