use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use super::error::GenerationError;
use super::types::{Message, MessagesRequest, MessagesResponse};
use super::{GenerationPort, GenerationRequest};

pub const API_URL: &str = "https://api.anthropic.com/v1/messages";

pub struct AnthropicGenerator {
    api_key: String,
    client: Client,
    base_url: String,
    model: String,
    max_tokens: u32,
}

impl AnthropicGenerator {
    /// Create a client for the Messages endpoint at `base_url`.
    pub fn with_base_url(
        api_key: String,
        base_url: String,
        model: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Result<Self, GenerationError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()?;
        Ok(Self {
            api_key,
            client,
            base_url,
            model,
            max_tokens,
        })
    }

    fn build_request(&self, request: &GenerationRequest) -> MessagesRequest {
        let schema = serde_json::to_string_pretty(&request.shape.json_schema())
            .unwrap_or_else(|_| "{}".to_string());
        let system = format!(
            "{}\n\nRespond with ONLY a JSON value, no other text, matching this JSON schema:\n{schema}",
            request.system_instruction
        );
        MessagesRequest {
            model: self.model.clone(),
            max_tokens: self.max_tokens,
            system: Some(system),
            messages: request.messages.iter().map(Message::user).collect(),
        }
    }

    async fn send_message(&self, req: &MessagesRequest) -> Result<MessagesResponse, GenerationError> {
        let response = self
            .client
            .post(&self.base_url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(req)
            .send()
            .await?;

        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(|secs| secs * 1000)
                .unwrap_or(1000);
            return Err(GenerationError::RateLimited {
                retry_after_ms: retry_after,
            });
        }

        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            return Err(GenerationError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = response.json::<MessagesResponse>().await?;
        Ok(body)
    }
}

#[async_trait]
impl GenerationPort for AnthropicGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Value, GenerationError> {
        let req = self.build_request(request);
        let response = self.send_message(&req).await?;
        debug!(
            shape = request.shape.name(),
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "generation call finished"
        );

        let text = response
            .first_text()
            .ok_or_else(|| GenerationError::Unparsable("response has no text block".into()))?;
        parse_json_text(text)
    }
}

/// Parses a model reply as JSON, tolerating a surrounding Markdown code fence.
fn parse_json_text(text: &str) -> Result<Value, GenerationError> {
    let trimmed = text.trim();
    let body = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .unwrap_or(trimmed);
    serde_json::from_str(body.trim()).map_err(|e| GenerationError::Unparsable(e.to_string()))
}
