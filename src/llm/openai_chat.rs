//! Chat completions client for OpenAI-compatible endpoints.
//!
//! Behaviour:
//! - One `POST` per call, bearer credential, bounded timeout, no retries.
//! - Transport failures (connect, timeout, body read) are errors.
//! - Any body without `choices[0].message.content` is reported as `Ok(None)`,
//!   including non-2xx responses.

use std::future::Future;
use std::pin::Pin;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assistant::core::config::LlmConfig;
use crate::assistant::core::turn::ConversationTurn;

/// Transport-level failure talking to the completion API.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// HTTP client failure, including timeouts.
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    /// Failure produced by a non-HTTP backend.
    #[error("{0}")]
    Backend(String),
}

/// Boxed future type for completion calls.
pub type CompletionFuture<'a> =
    Pin<Box<dyn Future<Output = Result<Option<String>, CompletionError>> + Send + 'a>>;

/// A chat completion backend.
pub trait CompletionBackend: Send + Sync {
    /// Send `messages` and return the first choice's content, trimmed.
    ///
    /// `Ok(None)` means the API answered but the payload lacked the content.
    ///
    /// # Errors
    /// Returns an error on transport failure or timeout.
    fn complete<'a>(
        &'a self,
        api_key: &'a str,
        messages: &'a [ConversationTurn],
    ) -> CompletionFuture<'a>;
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ConversationTurn],
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatChoiceMessage>,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

/// Async client for the chat completions endpoint.
pub struct OpenAiChatClient {
    client: Client,
    endpoint: String,
    model: String,
}

impl OpenAiChatClient {
    /// Build a client from the completion settings.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &LlmConfig) -> Result<Self, CompletionError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
        })
    }

    /// Model identifier sent with each request.
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }

    async fn post_chat(
        &self,
        api_key: &str,
        messages: &[ConversationTurn],
    ) -> Result<Option<String>, CompletionError> {
        let request = ChatCompletionRequest {
            model: &self.model,
            messages,
        };

        tracing::debug!(
            model = %self.model,
            messages = messages.len(),
            "sending chat completion request"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "completion API returned an error status");
        }

        Ok(parse_first_content(&body))
    }
}

impl CompletionBackend for OpenAiChatClient {
    fn complete<'a>(
        &'a self,
        api_key: &'a str,
        messages: &'a [ConversationTurn],
    ) -> CompletionFuture<'a> {
        Box::pin(self.post_chat(api_key, messages))
    }
}

/// Extract `choices[0].message.content`, trimmed, from a response body.
#[must_use]
pub fn parse_first_content(body: &str) -> Option<String> {
    let parsed: ChatCompletionResponse = serde_json::from_str(body).ok()?;
    parsed
        .choices
        .into_iter()
        .next()?
        .message?
        .content
        .map(|content| content.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{json, Value};

    async fn fake_completions(headers: HeaderMap, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
        let authorized = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            == Some("Bearer sk-test");
        if !authorized {
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({"error": {"message": "Incorrect API key provided"}})),
            );
        }

        let messages = body["messages"].as_array().cloned().unwrap_or_default();
        let last = messages
            .last()
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string();
        let content = format!("  {} via {} ({} messages)\n", last, body["model"].as_str().unwrap_or_default(), messages.len());
        (
            StatusCode::OK,
            Json(json!({"choices": [{"message": {"role": "assistant", "content": content}}]})),
        )
    }

    async fn slow_completions() -> Json<Value> {
        tokio::time::sleep(std::time::Duration::from_secs(3)).await;
        Json(json!({"choices": []}))
    }

    async fn spawn_fake(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, router).await;
        });
        format!("http://{addr}/v1/chat/completions")
    }

    fn config(endpoint: String) -> LlmConfig {
        LlmConfig {
            endpoint,
            timeout_secs: 1,
            ..LlmConfig::default()
        }
    }

    #[tokio::test]
    async fn test_successful_completion_is_trimmed() {
        let endpoint = spawn_fake(Router::new().route("/v1/chat/completions", post(fake_completions))).await;
        let client = OpenAiChatClient::new(&config(endpoint)).unwrap();
        let messages = vec![
            ConversationTurn::system("be brief"),
            ConversationTurn::user("hello"),
        ];

        let reply = client.complete("sk-test", &messages).await.unwrap();
        assert_eq!(reply.as_deref(), Some("hello via gpt-3.5-turbo (2 messages)"));
    }

    #[tokio::test]
    async fn test_error_status_yields_no_content() {
        let endpoint = spawn_fake(Router::new().route("/v1/chat/completions", post(fake_completions))).await;
        let client = OpenAiChatClient::new(&config(endpoint)).unwrap();

        let reply = client
            .complete("sk-wrong", &[ConversationTurn::user("hello")])
            .await
            .unwrap();
        assert_eq!(reply, None);
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = OpenAiChatClient::new(&config(format!("http://{addr}/v1/chat/completions"))).unwrap();
        let result = client.complete("sk-test", &[ConversationTurn::user("hello")]).await;
        assert!(matches!(result, Err(CompletionError::Transport(_))));
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        let endpoint = spawn_fake(Router::new().route("/v1/chat/completions", post(slow_completions))).await;
        let client = OpenAiChatClient::new(&config(endpoint)).unwrap();

        let result = client.complete("sk-test", &[ConversationTurn::user("hello")]).await;
        match result {
            Err(CompletionError::Transport(err)) => assert!(err.is_timeout()),
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_first_content() {
        assert_eq!(
            parse_first_content(r#"{"choices":[{"message":{"content":"  hi  "}}]}"#).as_deref(),
            Some("hi")
        );
        assert_eq!(parse_first_content(r#"{"choices":[]}"#), None);
        assert_eq!(parse_first_content(r#"{"choices":[{"message":{"content":null}}]}"#), None);
        assert_eq!(parse_first_content("<html>bad gateway</html>"), None);
    }
}
