//! Chat completion client for the judge model.
//!
//! Speaks the OpenAI `/v1/chat/completions` wire format, which most hosted
//! and self-hosted model servers accept.

use crate::config::LlmConfig;
use crate::error::{EvalError, Result};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

/// One chat turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Asks the server to constrain output to a JSON object.
#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    /// Some compatible servers reject multiple completions; always ask for one.
    n: u32,
    response_format: ResponseFormat,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

#[derive(Debug, Deserialize)]
struct CompletionChoice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Error body returned on non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    message: String,
}

/// Client for the judge model's chat endpoint.
#[derive(Clone)]
pub struct LlmClient {
    http: Client,
    config: LlmConfig,
}

impl LlmClient {
    /// Build a client; every request carries the configured timeout.
    pub fn new(config: LlmConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    /// Model name requests are sent to.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Completions URL; accepts a base with or without a trailing `/v1`.
    fn endpoint(&self) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        let root = base.strip_suffix("/v1").unwrap_or(base);
        format!("{}/v1/chat/completions", root)
    }

    fn request<'a>(&'a self, messages: &'a [Message]) -> CompletionRequest<'a> {
        CompletionRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            n: 1,
            response_format: ResponseFormat {
                kind: "json_object",
            },
        }
    }

    /// Send the conversation and return the first choice's text, which the
    /// server is asked to keep to a single JSON object.
    pub async fn chat_json(&self, messages: &[Message]) -> Result<String> {
        self.send(self.request(messages)).await
    }

    async fn send(&self, request: CompletionRequest<'_>) -> Result<String> {
        let response = self
            .http
            .post(self.endpoint())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorBody>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(EvalError::LlmApi(format!("HTTP {}: {}", status, message)));
        }

        let completion: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| EvalError::LlmParse(format!("{}: {}", e, body)))?;

        completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| EvalError::LlmApi("response carried no choices".to_string()))
    }

    /// System prompt plus one user turn, answered as a JSON object.
    pub async fn complete_json(&self, system: &str, user: &str) -> Result<String> {
        let messages = [Message::system(system), Message::user(user)];
        self.chat_json(&messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client_for(api_base: &str) -> LlmClient {
        LlmClient::new(LlmConfig {
            api_base: api_base.to_string(),
            api_key: "test".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_endpoint_with_and_without_version() {
        assert_eq!(
            client_for("https://api.example.com/").endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(
            client_for("https://api.example.com/v1").endpoint(),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn test_json_mode_request() {
        let client = client_for("https://api.example.com");
        let messages = [Message::system("judge"), Message::user("score this")];

        let json = serde_json::to_value(client.request(&messages)).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][1]["role"], "user");
        assert_eq!(json["n"], 1);
        assert_eq!(json["response_format"]["type"], "json_object");
    }
}
