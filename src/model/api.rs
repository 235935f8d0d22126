//! OpenAI-compatible chat completion client.
//!
//! Provides typed request/response structures and the [`LlmClient`] that
//! implements [`CompletionBackend`] for the decision loop.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::traits::CompletionBackend;
use crate::config::ModelConfig;

/// Content of the turn inserted when a conversation must open with `user`.
const PLACEHOLDER_USER_TURN: &str = "Continue.";

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// A single message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// The role of the message author: `"system"`, `"user"`, or `"assistant"`.
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".to_string(),
            content: content.into(),
        }
    }
}

/// A single completion choice returned by the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Choice {
    pub index: usize,
    pub message: ChatMessage,
    /// The reason the model stopped generating (e.g. `"stop"`, `"length"`).
    pub finish_reason: Option<String>,
}

/// Token usage statistics for a request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub total_tokens: usize,
}

/// A chat completion response from the API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub id: String,
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub usage: Usage,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for an OpenAI-compatible chat completions API, bound to one
/// model and sampling configuration.
#[derive(Debug, Clone)]
pub struct LlmClient {
    api_base: String,
    api_key: String,
    model_id: String,
    temperature: f64,
    max_tokens: usize,
    leading_user_turn: bool,
    http: reqwest::Client,
}

impl LlmClient {
    /// Create a new client pointing at `base_url` (e.g. `"https://api.openai.com/v1"`).
    pub fn new(base_url: &str, api_key: &str, model_id: &str) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("failed to build reqwest client for chat completions")?;

        Ok(Self {
            api_base: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model_id: model_id.to_string(),
            temperature: 0.0,
            max_tokens: 1024,
            leading_user_turn: false,
            http,
        })
    }

    /// Build a client from the `model` configuration section.
    pub fn from_config(config: &ModelConfig) -> Result<Self> {
        let mut client = Self::new(
            &config.chat_api_base,
            &config.chat_api_key,
            &config.chat_model_id,
        )?;
        client.temperature = config.temperature;
        client.max_tokens = config.max_tokens;
        client.leading_user_turn = config.leading_user_turn;
        Ok(client)
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_leading_user_turn(mut self, enabled: bool) -> Self {
        self.leading_user_turn = enabled;
        self
    }

    /// Send a chat completion request and return the parsed response.
    ///
    /// Calls `POST {base_url}/chat/completions`.
    pub async fn chat_completion(&self, messages: &[ChatMessage]) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let messages = if self.leading_user_turn {
            normalize_roles(messages)
        } else {
            messages.to_vec()
        };
        debug!(
            model = %self.model_id,
            messages = messages.len(),
            "sending chat completion request"
        );

        let body = serde_json::json!({
            "model": self.model_id,
            "messages": messages,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
        });

        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .context("failed to send chat completion request")?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat completion API returned {status}: {text}");
        }

        let chat_response: ChatResponse = resp
            .json()
            .await
            .context("failed to parse chat completion response")?;

        info!(
            model = %self.model_id,
            prompt_tokens = chat_response.usage.prompt_tokens,
            completion_tokens = chat_response.usage.completion_tokens,
            "chat completion succeeded"
        );

        Ok(chat_response)
    }
}

impl CompletionBackend for LlmClient {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let response = self.chat_completion(messages).await?;
        let choice = response
            .choices
            .into_iter()
            .next()
            .context("chat completion response contained no choices")?;
        Ok(choice.message.content)
    }
}

/// Make the first non-system turn a `user` turn, inserting a placeholder when
/// the conversation opens with anything else.
pub fn normalize_roles(messages: &[ChatMessage]) -> Vec<ChatMessage> {
    let leading_system = messages
        .iter()
        .take_while(|m| m.role == "system")
        .count();

    let mut normalized = messages.to_vec();
    let opens_with_user = messages
        .get(leading_system)
        .is_some_and(|m| m.role == "user");
    if !opens_with_user {
        normalized.insert(leading_system, ChatMessage::user(PLACEHOLDER_USER_TURN));
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_response_deserialization() {
        let json = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "answer:10"}, "finish_reason": "stop"}
            ],
            "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
        }"#;

        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.choices[0].message.content, "answer:10");
        assert_eq!(resp.usage.total_tokens, 15);
    }

    #[test]
    fn test_chat_response_without_usage() {
        let json = r#"{"id": "x", "choices": []}"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(resp.choices.is_empty());
        assert_eq!(resp.usage.prompt_tokens, 0);
    }

    #[test]
    fn test_normalize_roles_inserts_user_after_system() {
        let messages = vec![
            ChatMessage::system("be terse"),
            ChatMessage::assistant("hello"),
        ];
        let normalized = normalize_roles(&messages);
        assert_eq!(normalized.len(), 3);
        assert_eq!(normalized[0].role, "system");
        assert_eq!(normalized[1], ChatMessage::user(PLACEHOLDER_USER_TURN));
        assert_eq!(normalized[2].role, "assistant");
    }

    #[test]
    fn test_normalize_roles_leaves_user_first_untouched() {
        let messages = vec![ChatMessage::user("plan this")];
        assert_eq!(normalize_roles(&messages), messages);
    }

    #[test]
    fn test_normalize_roles_empty_conversation() {
        let normalized = normalize_roles(&[]);
        assert_eq!(normalized, vec![ChatMessage::user(PLACEHOLDER_USER_TURN)]);
    }

    #[tokio::test]
    async fn test_complete_sends_normalized_conversation() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({
                "model": "tiny",
                "messages": [
                    {"role": "user", "content": "Continue."},
                    {"role": "assistant", "content": "hi"}
                ]
            })))
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"id": "c1", "choices": [{"index": 0, "message": {"role": "assistant", "content": "answer:3"}, "finish_reason": "stop"}]}"#,
            )
            .create_async()
            .await;

        let client = LlmClient::new(&server.url(), "sk-test", "tiny")
            .unwrap()
            .with_leading_user_turn(true);
        let reply = client.complete(&[ChatMessage::assistant("hi")]).await.unwrap();
        assert_eq!(reply, "answer:3");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_reports_api_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(429)
            .with_body("slow down")
            .create_async()
            .await;

        let client = LlmClient::new(&server.url(), "k", "tiny").unwrap();
        let err = client.complete(&[ChatMessage::user("x")]).await.unwrap_err();
        assert!(err.to_string().contains("429"));
    }
}
