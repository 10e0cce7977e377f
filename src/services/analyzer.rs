//! Batch analyzer driving per-sample completion calls.
//!
//! Samples are processed strictly sequentially, never concurrently, to bound
//! load on the completion service, with a fixed pause between calls as
//! deliberate self-throttling. No call-level timeout is imposed: a
//! collaborator call that never returns stalls the whole batch. That is a
//! documented limitation of this pipeline, not an oversight.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::models::{ConversationSample, ResultStatus};

/// Placeholder substituted with the sample's user query.
pub const USER_QUERY_PLACEHOLDER: &str = "{user_query}";
/// Placeholder substituted with the sample's model reply.
pub const MODEL_REPLY_PLACEHOLDER: &str = "{model_reply}";

/// Pause inserted between samples regardless of outcome.
const SAMPLE_PAUSE: Duration = Duration::from_millis(200);

/// One message in a completion request.
#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Successful completion response.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub model_name: String,
    pub latency_ms: i64,
    pub input_tokens: i32,
    pub output_tokens: i32,
}

/// Opaque completion failure (provider, quota, or auth errors alike).
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct CompletionError(pub String);

/// Text-generation collaborator invoked once per sample.
#[async_trait]
pub trait CompletionService: Send + Sync {
    async fn generate(&self, messages: &[ChatMessage]) -> Result<Completion, CompletionError>;
}

/// Outcome of analyzing one sample.
#[derive(Debug, Clone)]
pub struct SampleOutcome {
    pub status: ResultStatus,
    /// The rendered prompt as sent, kept for audit on failures too.
    pub rendered_prompt: String,
    /// Raw completion output; empty on failure.
    pub content: String,
    pub model_name: Option<String>,
    pub latency_ms: i64,
    pub input_tokens: i32,
    pub output_tokens: i32,
    pub error_message: Option<String>,
}

/// Drives the per-sample completion calls for one chunk of samples.
#[derive(Clone)]
pub struct BatchAnalyzer {
    completion: Arc<dyn CompletionService>,
    pause: Duration,
}

impl BatchAnalyzer {
    pub fn new(completion: Arc<dyn CompletionService>) -> Self {
        Self {
            completion,
            pause: SAMPLE_PAUSE,
        }
    }

    #[cfg(test)]
    pub(crate) fn with_pause(completion: Arc<dyn CompletionService>, pause: Duration) -> Self {
        Self { completion, pause }
    }

    /// Substitute the sample's query and reply into the template.
    /// Plain string substitution; unknown placeholders are left untouched.
    pub fn render_prompt(template: &str, sample: &ConversationSample) -> String {
        template
            .replace(USER_QUERY_PLACEHOLDER, &sample.user_query)
            .replace(MODEL_REPLY_PLACEHOLDER, &sample.model_reply)
    }

    /// Analyze a batch of samples, one outcome per sample in input order.
    pub async fn analyze_batch(
        &self,
        samples: &[ConversationSample],
        template: &str,
    ) -> Vec<SampleOutcome> {
        let mut outcomes = Vec::with_capacity(samples.len());

        for sample in samples {
            let rendered = Self::render_prompt(template, sample);
            let messages = [ChatMessage::user(rendered.clone())];

            let outcome = match self.completion.generate(&messages).await {
                Ok(completion) => {
                    debug!(
                        tenant_id = %sample.tenant_id,
                        latency_ms = completion.latency_ms,
                        "Sample analyzed"
                    );
                    SampleOutcome {
                        status: ResultStatus::Success,
                        rendered_prompt: rendered,
                        content: completion.content,
                        model_name: Some(completion.model_name),
                        latency_ms: completion.latency_ms,
                        input_tokens: completion.input_tokens,
                        output_tokens: completion.output_tokens,
                        error_message: None,
                    }
                }
                Err(e) => {
                    warn!(tenant_id = %sample.tenant_id, "Completion call failed: {}", e);
                    SampleOutcome {
                        status: ResultStatus::Failed,
                        rendered_prompt: rendered,
                        content: String::new(),
                        model_name: None,
                        latency_ms: 0,
                        input_tokens: 0,
                        output_tokens: 0,
                        error_message: Some(e.to_string()),
                    }
                }
            };

            outcomes.push(outcome);
            tokio::time::sleep(self.pause).await;
        }

        outcomes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Mutex;

    /// Scripted completion service: pops responses in order.
    struct ScriptedCompletion {
        responses: Mutex<Vec<Result<Completion, CompletionError>>>,
        prompts_seen: Mutex<Vec<String>>,
    }

    impl ScriptedCompletion {
        fn new(responses: Vec<Result<Completion, CompletionError>>) -> Self {
            Self {
                responses: Mutex::new(responses),
                prompts_seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        async fn generate(&self, messages: &[ChatMessage]) -> Result<Completion, CompletionError> {
            self.prompts_seen
                .lock()
                .unwrap()
                .push(messages[0].content.clone());
            self.responses.lock().unwrap().remove(0)
        }
    }

    fn ok_completion(content: &str) -> Result<Completion, CompletionError> {
        Ok(Completion {
            content: content.to_string(),
            model_name: "test-model".to_string(),
            latency_ms: 120,
            input_tokens: 50,
            output_tokens: 30,
        })
    }

    fn sample(query: &str, reply: &str) -> ConversationSample {
        ConversationSample {
            timestamp: Utc::now(),
            tenant_id: "acme".to_string(),
            session_id: None,
            user_query: query.to_string(),
            model_reply: reply.to_string(),
        }
    }

    #[test]
    fn test_render_prompt_substitutes_both_placeholders() {
        let s = sample("How do I reset?", "Press the red button.");
        let rendered =
            BatchAnalyzer::render_prompt("Q: {user_query}\nA: {model_reply}\nScore it.", &s);
        assert_eq!(rendered, "Q: How do I reset?\nA: Press the red button.\nScore it.");
    }

    #[test]
    fn test_render_prompt_leaves_unknown_placeholders() {
        let s = sample("q", "a");
        let rendered = BatchAnalyzer::render_prompt("{user_query} {something_else}", &s);
        assert_eq!(rendered, "q {something_else}");
    }

    #[tokio::test]
    async fn test_outcomes_preserve_input_order() {
        let service = Arc::new(ScriptedCompletion::new(vec![
            ok_completion("first"),
            ok_completion("second"),
            ok_completion("third"),
        ]));
        let analyzer = BatchAnalyzer::with_pause(service, Duration::from_millis(0));

        let samples = vec![sample("q1", "a1"), sample("q2", "a2"), sample("q3", "a3")];
        let outcomes = analyzer.analyze_batch(&samples, "{user_query}").await;

        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].content, "first");
        assert_eq!(outcomes[1].content, "second");
        assert_eq!(outcomes[2].content, "third");
    }

    #[tokio::test]
    async fn test_failed_call_keeps_prompt_and_zeroes_usage() {
        let service = Arc::new(ScriptedCompletion::new(vec![
            ok_completion("ok"),
            Err(CompletionError("quota exceeded".to_string())),
        ]));
        let analyzer = BatchAnalyzer::with_pause(service, Duration::from_millis(0));

        let samples = vec![sample("q1", "a1"), sample("q2", "a2")];
        let outcomes = analyzer
            .analyze_batch(&samples, "analyze: {user_query} / {model_reply}")
            .await;

        let failed = &outcomes[1];
        assert_eq!(failed.status, ResultStatus::Failed);
        assert_eq!(failed.rendered_prompt, "analyze: q2 / a2");
        assert!(failed.content.is_empty());
        assert_eq!(failed.latency_ms, 0);
        assert_eq!(failed.input_tokens, 0);
        assert_eq!(failed.output_tokens, 0);
        assert_eq!(failed.error_message.as_deref(), Some("quota exceeded"));

        // The preceding success is unaffected
        assert_eq!(outcomes[0].status, ResultStatus::Success);
        assert_eq!(outcomes[0].model_name.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_calls_are_sequential_one_message_each() {
        let service = Arc::new(ScriptedCompletion::new(vec![
            ok_completion("a"),
            ok_completion("b"),
        ]));
        let analyzer = BatchAnalyzer::with_pause(service.clone(), Duration::from_millis(0));

        let samples = vec![sample("first?", "r1"), sample("second?", "r2")];
        analyzer.analyze_batch(&samples, "{user_query}").await;

        let prompts = service.prompts_seen.lock().unwrap();
        assert_eq!(prompts.as_slice(), &["first?", "second?"]);
    }
}
