//! The model client shared by every stage.
//!
//! Wraps a [`Provider`] with the two policies the stages rely on: transient
//! provider errors are retried with exponential backoff, and JSON answers
//! that fail to parse are re-prompted with a corrective message.

use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use qr_core::{CompletionRequest, Error, Message, Provider};

use crate::prompts::corrective_prompt;

/// Upper bound on a single backoff sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

pub struct ResearchModel {
    provider: Arc<dyn Provider>,
    model: Option<String>,
    temperature: Option<f32>,
    max_retries: u32,
    json_retries: u32,
    backoff: Duration,
}

impl ResearchModel {
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self {
            provider,
            model: None,
            temperature: None,
            max_retries: 2,
            json_retries: 1,
            backoff: Duration::from_millis(500),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_json_retries(mut self, json_retries: u32) -> Self {
        self.json_retries = json_retries;
        self
    }

    /// Base delay of the exponential backoff between provider retries.
    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    /// Ask for a free-text answer. The reply is trimmed.
    pub async fn complete_text(&self, system: &str, user: &str) -> Result<String, Error> {
        let messages = vec![Message::system(system), Message::user(user)];
        let text = self.complete(messages).await?;
        Ok(text.trim().to_string())
    }

    /// Ask for a JSON answer and decode it into `T`.
    ///
    /// A reply that does not decode is answered with a corrective prompt up
    /// to `json_retries` times; after that the call fails with
    /// [`Error::MalformedOutput`] tagged with `stage`.
    pub async fn complete_json<T: DeserializeOwned>(
        &self,
        stage: &str,
        system: &str,
        user: &str,
    ) -> Result<T, Error> {
        let mut messages = vec![Message::system(system), Message::user(user)];
        let mut attempt = 0;

        loop {
            let raw = self.complete(messages.clone()).await?;
            match serde_json::from_str::<T>(strip_code_blocks(&raw)) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.json_retries => {
                    attempt += 1;
                    warn!(stage, attempt, error = %e, "Model returned malformed JSON, re-prompting");
                    messages.push(Message::assistant(raw));
                    messages.push(Message::user(corrective_prompt(&e.to_string())));
                }
                Err(e) => {
                    return Err(Error::malformed(
                        stage,
                        format!("{} in reply: {}", e, preview(&raw, 200)),
                    ));
                }
            }
        }
    }

    async fn complete(&self, messages: Vec<Message>) -> Result<String, Error> {
        let mut request = CompletionRequest::new(messages);
        if let Some(model) = &self.model {
            request = request.with_model(model.clone());
        }
        if let Some(temperature) = self.temperature {
            request = request.with_temperature(temperature);
        }

        let mut retries = 0;
        loop {
            match self.provider.complete(request.clone()).await {
                Ok(response) => {
                    debug!(
                        provider = self.provider.name(),
                        model = %response.model,
                        prompt_tokens = response.usage.prompt_tokens,
                        completion_tokens = response.usage.completion_tokens,
                        "Completion received"
                    );
                    return Ok(response.text().to_string());
                }
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    let delay = self.retry_delay(retries);
                    retries += 1;
                    warn!(error = %e, retry = retries, delay_ms = delay.as_millis() as u64, "Provider call failed, retrying");
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Delay before retry number `retries + 1`, doubling from the base and
    /// capped at [`MAX_BACKOFF`].
    fn retry_delay(&self, retries: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(retries))
            .min(MAX_BACKOFF)
    }
}

/// Strip a surrounding markdown code fence from a model reply.
pub fn strip_code_blocks(response: &str) -> &str {
    response
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim()
}

fn preview(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qr_core::testing::MockProvider;
    use qr_core::Role;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Answer {
        value: u32,
    }

    fn model(provider: &Arc<MockProvider>) -> ResearchModel {
        ResearchModel::new(provider.clone()).with_backoff(Duration::ZERO)
    }

    #[test]
    fn test_strip_code_blocks() {
        assert_eq!(strip_code_blocks("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_blocks("```\n{}\n```"), "{}");
        assert_eq!(strip_code_blocks("  {\"a\":1} "), "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_complete_text_trims() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("  a summary \n");

        let text = model(&provider)
            .with_model("llama3.2:3b")
            .complete_text("system", "user")
            .await
            .unwrap();
        assert_eq!(text, "a summary");

        let request = provider.last_request().unwrap();
        assert_eq!(request.model.as_deref(), Some("llama3.2:3b"));
        assert_eq!(request.messages[0].role, Role::System);
        assert_eq!(request.messages[1].content, "user");
    }

    #[tokio::test]
    async fn test_complete_json_tolerates_fence() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("```json\n{\"value\": 7}\n```");

        let answer: Answer = model(&provider).complete_json("test", "s", "u").await.unwrap();
        assert_eq!(answer, Answer { value: 7 });
        assert_eq!(provider.request_count(), 1);
    }

    #[tokio::test]
    async fn test_complete_json_reprompts_once() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("Sure! Here is the JSON you asked for.");
        provider.queue_response("{\"value\": 3}");

        let answer: Answer = model(&provider).complete_json("test", "s", "u").await.unwrap();
        assert_eq!(answer.value, 3);

        let request = provider.last_request().unwrap();
        assert_eq!(request.messages.len(), 4);
        assert_eq!(request.messages[2].role, Role::Assistant);
        assert!(request.messages[3].content.contains("could not be parsed"));
    }

    #[tokio::test]
    async fn test_complete_json_gives_up() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_response("not json");
        provider.queue_response("still not json");

        let err = model(&provider)
            .complete_json::<Answer>("create_query", "s", "u")
            .await
            .unwrap_err();
        match err {
            Error::MalformedOutput { stage, .. } => assert_eq!(stage, "create_query"),
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_retries_transient_errors() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_error(Error::network("connection reset"));
        provider.queue_error(Error::rate_limit("slow down"));
        provider.queue_response("done");

        let text = model(&provider).complete_text("s", "u").await.unwrap();
        assert_eq!(text, "done");
        assert_eq!(provider.request_count(), 3);
    }

    #[tokio::test]
    async fn test_retry_budget_is_bounded() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_error(Error::network("down"));
        provider.queue_error(Error::network("down"));

        let err = model(&provider)
            .with_max_retries(1)
            .complete_text("s", "u")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Network(_)));
        assert_eq!(provider.request_count(), 2);
    }

    #[tokio::test]
    async fn test_large_retry_budget_does_not_overflow() {
        let provider = Arc::new(MockProvider::new());
        for _ in 0..40 {
            provider.queue_error(Error::network("down"));
        }
        provider.queue_response("back up");

        let text = model(&provider)
            .with_max_retries(40)
            .complete_text("s", "u")
            .await
            .unwrap();
        assert_eq!(text, "back up");
        assert_eq!(provider.request_count(), 41);
    }

    #[test]
    fn test_retry_delay_is_capped() {
        let provider = Arc::new(MockProvider::new());
        let model = ResearchModel::new(provider);
        assert_eq!(model.retry_delay(0), Duration::from_millis(500));
        assert_eq!(model.retry_delay(2), Duration::from_secs(2));
        assert_eq!(model.retry_delay(6), MAX_BACKOFF);
        assert_eq!(model.retry_delay(40), MAX_BACKOFF);
        assert_eq!(model.retry_delay(u32::MAX), MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_auth_errors_are_not_retried() {
        let provider = Arc::new(MockProvider::new());
        provider.queue_error(Error::auth("bad key"));

        let err = model(&provider).complete_text("s", "u").await.unwrap_err();
        assert!(err.is_auth_error());
        assert_eq!(provider.request_count(), 1);
    }
}
