//! HTTP client for the OpenAI-compatible completion service.

use std::time::Instant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::CompletionConfig;
use crate::services::analyzer::{ChatMessage, Completion, CompletionError, CompletionService};

/// Client against a chat-completions endpoint.
pub struct CompletionClient {
    client: reqwest::Client,
    config: CompletionConfig,
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<ApiMessage<'a>>,
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    model: Option<String>,
    choices: Vec<Choice>,
    usage: Option<Usage>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct Usage {
    prompt_tokens: Option<i32>,
    completion_tokens: Option<i32>,
}

impl CompletionClient {
    pub fn new(config: CompletionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl CompletionService for CompletionClient {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<Completion, CompletionError> {
        let request = ChatCompletionRequest {
            model: &self.config.model,
            messages: messages
                .iter()
                .map(|m| ApiMessage {
                    role: &m.role,
                    content: &m.content,
                })
                .collect(),
        };

        let started = Instant::now();

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| CompletionError(format!("Request failed: {}", e)))?;

        let latency_ms = started.elapsed().as_millis() as i64;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError(format!(
                "Completion service returned {}: {}",
                status, body
            )));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| CompletionError(format!("Invalid response body: {}", e)))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| CompletionError("Response contained no choices".to_string()))?;

        let usage = parsed.usage.unwrap_or(Usage {
            prompt_tokens: None,
            completion_tokens: None,
        });

        debug!(latency_ms, "Completion call finished");

        Ok(Completion {
            content,
            model_name: parsed.model.unwrap_or_else(|| self.config.model.clone()),
            latency_ms,
            input_tokens: usage.prompt_tokens.unwrap_or(0),
            output_tokens: usage.completion_tokens.unwrap_or(0),
        })
    }
}
