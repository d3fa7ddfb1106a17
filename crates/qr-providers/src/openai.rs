use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use qr_core::{
    strip_thinking_tags, CompletionRequest, CompletionResponse, Error, FinishReason, Message,
    Provider, Role, Usage,
};

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Chat-completions client for OpenAI and compatible servers (Ollama,
/// vLLM, llama.cpp, LM Studio).
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    base_url: String,
    default_model: Option<String>,
}

impl OpenAIProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            client: build_client(DEFAULT_TIMEOUT),
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: None,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = Some(model.into());
        self
    }

    /// Local models can take minutes on long pages; the default is generous.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.client = build_client(timeout);
        self
    }

    fn build_request(&self, request: &CompletionRequest) -> OpenAIChatRequest {
        // Model priority: request > provider default
        // If neither is set, don't send model field (let API use its default)
        let model = request
            .model
            .clone()
            .or_else(|| self.default_model.clone());

        let messages = request
            .messages
            .iter()
            .map(|m| OpenAIMessage {
                role: match m.role {
                    Role::System => "system",
                    Role::User => "user",
                    Role::Assistant => "assistant",
                }
                .to_string(),
                content: Some(m.content.clone()),
                reasoning_content: None,
            })
            .collect();

        OpenAIChatRequest {
            model,
            messages,
            temperature: request.temperature,
            stream: false,
        }
    }

    fn parse_response(&self, response: OpenAIChatResponse) -> Result<CompletionResponse, Error> {
        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::api(500, "No choices in response"))?;

        let mut content = choice.message.content.unwrap_or_default();

        // Some servers embed reasoning in the content with tags
        let (clean, extracted) = strip_thinking_tags(&content);
        if extracted.is_some() {
            content = clean;
        }
        if let Some(reasoning) = choice.message.reasoning_content.or(extracted) {
            debug!(chars = reasoning.len(), "Discarded model reasoning");
        }

        let finish_reason = match choice.finish_reason.as_deref() {
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            _ => FinishReason::Stop,
        };

        let usage = response
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens));

        Ok(CompletionResponse {
            message: Message::assistant(content),
            usage: usage.unwrap_or_default(),
            model: response.model.unwrap_or_default(),
            finish_reason,
        })
    }

    fn parse_error(&self, status: u16, body: &str) -> Error {
        #[derive(Deserialize)]
        struct ErrorResponse {
            error: ErrorDetail,
        }

        #[derive(Deserialize)]
        struct ErrorDetail {
            message: String,
        }

        if let Ok(err) = serde_json::from_str::<ErrorResponse>(body) {
            match status {
                401 => Error::auth(err.error.message),
                429 => Error::rate_limit(err.error.message),
                400 => Error::invalid_request(err.error.message),
                _ => Error::api(status, err.error.message),
            }
        } else {
            Error::api(status, body.to_string())
        }
    }
}

fn build_client(timeout: Duration) -> Client {
    Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

#[async_trait]
impl Provider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, Error> {
        let api_request = self.build_request(&request);
        debug!(
            model = ?api_request.model,
            messages = api_request.messages.len(),
            "OpenAI request"
        );

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    Error::Timeout(e.to_string())
                } else {
                    Error::network(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(self.parse_error(status.as_u16(), &error_text));
        }

        let api_response: OpenAIChatResponse = response
            .json()
            .await
            .map_err(|e| Error::serialization(e.to_string()))?;

        self.parse_response(api_response)
    }
}

// OpenAI API types

#[derive(Debug, Serialize)]
struct OpenAIChatRequest {
    /// Model to use. Optional for servers that have a default model.
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<String>,
    messages: Vec<OpenAIMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAIMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    /// Reasoning content from reasoning models (response only).
    #[serde(skip_serializing_if = "Option::is_none", default)]
    reasoning_content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChatResponse {
    #[serde(default)]
    model: Option<String>,
    choices: Vec<OpenAIChoice>,
    usage: Option<OpenAIUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAIUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, routing::post, Json, Router};
    use std::net::SocketAddr;

    async fn serve(app: Router) -> SocketAddr {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    #[test]
    fn test_provider_creation() {
        let provider = OpenAIProvider::new("test-key");
        assert_eq!(provider.name(), "openai");
        assert_eq!(provider.default_model, None);
    }

    #[test]
    fn test_build_request() {
        let provider = OpenAIProvider::new("test-key").with_default_model("llama3.2:3b");
        let request = CompletionRequest::new(vec![
            Message::system("Return JSON"),
            Message::user("rust"),
        ]);
        let api_request = provider.build_request(&request);

        assert_eq!(api_request.model, Some("llama3.2:3b".to_string()));
        assert_eq!(api_request.messages.len(), 2);
        assert_eq!(api_request.messages[0].role, "system");
        assert!(!api_request.stream);
    }

    #[test]
    fn test_build_request_no_model() {
        let provider = OpenAIProvider::new("test-key");
        let request = CompletionRequest::new(vec![Message::user("Hello")]);
        let api_request = provider.build_request(&request);

        // No model configured - field should be None (skipped in serialization)
        assert_eq!(api_request.model, None);
    }

    #[test]
    fn test_parse_response_strips_think_tags() {
        let provider = OpenAIProvider::new("k");
        let response: OpenAIChatResponse = serde_json::from_value(serde_json::json!({
            "model": "deepseek-r1",
            "choices": [{
                "message": {"role": "assistant", "content": "<think>hmm</think>{\"query\":\"q\"}"},
                "finish_reason": "stop"
            }]
        }))
        .unwrap();

        let parsed = provider.parse_response(response).unwrap();
        assert_eq!(parsed.text(), "{\"query\":\"q\"}");
        assert_eq!(parsed.model, "deepseek-r1");
    }

    #[test]
    fn test_parse_response_ignores_reasoning_content() {
        let provider = OpenAIProvider::new("k");
        let response: OpenAIChatResponse = serde_json::from_value(serde_json::json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "A summary.",
                    "reasoning_content": "Let me think about this."
                },
                "finish_reason": "length"
            }]
        }))
        .unwrap();

        let parsed = provider.parse_response(response).unwrap();
        assert_eq!(parsed.text(), "A summary.");
        assert_eq!(parsed.finish_reason, FinishReason::Length);
    }

    #[test]
    fn test_parse_error_status_mapping() {
        let provider = OpenAIProvider::new("k");
        let body = r#"{"error":{"message":"slow down","type":"rate_limit"}}"#;
        assert!(matches!(provider.parse_error(429, body), Error::RateLimit(_)));
        assert!(matches!(provider.parse_error(401, body), Error::Auth(_)));
        assert!(matches!(
            provider.parse_error(502, "<html>bad gateway</html>"),
            Error::Api { status: 502, .. }
        ));
    }

    #[tokio::test]
    async fn test_complete_against_local_server() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|Json(body): Json<serde_json::Value>| async move {
                let model = body["model"].as_str().unwrap_or("none").to_string();
                Json(serde_json::json!({
                    "model": model,
                    "choices": [{
                        "message": {"role": "assistant", "content": "hello back"},
                        "finish_reason": "stop"
                    }],
                    "usage": {"prompt_tokens": 3, "completion_tokens": 2}
                }))
            }),
        );
        let addr = serve(app).await;

        let provider = OpenAIProvider::new("ollama")
            .with_base_url(format!("http://{}/v1/", addr))
            .with_default_model("llama3.2:3b");
        let response = provider
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap();

        assert_eq!(response.text(), "hello back");
        assert_eq!(response.model, "llama3.2:3b");
        assert_eq!(response.usage.total_tokens, 5);
    }

    #[tokio::test]
    async fn test_complete_surfaces_http_errors() {
        let app = Router::new().route(
            "/v1/chat/completions",
            post(|| async {
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    r#"{"error":{"message":"model loading"}}"#,
                )
            }),
        );
        let addr = serve(app).await;

        let provider = OpenAIProvider::new("k").with_base_url(format!("http://{}/v1", addr));
        let err = provider
            .complete(CompletionRequest::new(vec![Message::user("hi")]))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Api { status: 503, .. }));
        assert!(err.is_retryable());
    }
}
