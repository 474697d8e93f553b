//! HTTP client for a LightRAG-compatible engine.

use super::RagBackend;
use crate::config::{RagConfig, UploadMode};
use crate::error::{EvalError, Result};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Request body for the query endpoint.
#[derive(Debug, Serialize)]
struct QueryRequest<'a> {
    query: &'a str,
    mode: &'a str,
    top_k: usize,
    include_references: bool,
    response_type: &'a str,
}

/// Request body for the text ingestion endpoint.
#[derive(Debug, Serialize)]
struct TextUploadRequest<'a> {
    text: &'a str,
    file_source: &'a str,
}

/// Client for the RAG engine's HTTP API.
#[derive(Clone)]
pub struct RagClient {
    client: Client,
    config: RagConfig,
}

impl RagClient {
    /// Create a new client. Every request carries the configured timeout.
    pub fn new(config: RagConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self { client, config })
    }

    /// Build an endpoint URL from a path.
    fn endpoint(&self, path: &str) -> String {
        let base = self.config.api_base.trim_end_matches('/');
        format!("{}/{}", base, path.trim_start_matches('/'))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.config.api_key.is_empty() {
            request
        } else {
            request.header("X-API-Key", &self.config.api_key)
        }
    }

    /// Send a query and return the raw JSON body.
    pub async fn query(&self, question: &str) -> Result<Value> {
        let request = QueryRequest {
            query: question,
            mode: &self.config.mode,
            top_k: self.config.top_k,
            include_references: true,
            response_type: &self.config.response_type,
        };

        let response = self
            .authorized(self.client.post(self.endpoint("query")))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(EvalError::RagApi(format!(
                "Query failed ({}): {}",
                status, body
            )));
        }

        let value: Value = serde_json::from_str(&body)?;
        debug!(body_len = body.len(), "query response received");
        Ok(value)
    }

    /// Upload a document using the configured upload mode.
    pub async fn upload(&self, file_source: &str, content: String) -> Result<()> {
        let request = match self.config.upload_mode {
            UploadMode::Text => self
                .client
                .post(self.endpoint("documents/text"))
                .json(&TextUploadRequest {
                    text: &content,
                    file_source,
                }),
            UploadMode::Multipart => {
                let part = Part::bytes(content.into_bytes())
                    .file_name(file_source.to_string())
                    .mime_str("text/markdown")?;
                self.client
                    .post(self.endpoint("documents/upload"))
                    .header("accept", "application/json")
                    .multipart(Form::new().part("file", part))
            }
        };

        let response = self.authorized(request).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status != StatusCode::OK {
            return Err(EvalError::RagApi(format!("HTTP {}: {}", status, body)));
        }

        debug!(file = file_source, "upload accepted");
        Ok(())
    }

    /// Test connectivity to the query endpoint.
    pub async fn test_connection(&self) -> Result<()> {
        self.query("ping").await.map(|_| ())
    }
}

impl RagBackend for RagClient {
    async fn query(&self, question: &str) -> Result<Value> {
        RagClient::query(self, question).await
    }

    async fn ingest(&self, file_source: &str, content: String) -> Result<()> {
        self.upload(file_source, content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_construction() {
        let config = RagConfig {
            api_base: "http://localhost:9621/".to_string(),
            ..Default::default()
        };
        let client = RagClient::new(config).unwrap();
        assert_eq!(client.endpoint("query"), "http://localhost:9621/query");
        assert_eq!(
            client.endpoint("/documents/text"),
            "http://localhost:9621/documents/text"
        );

        // Without trailing slash
        let config2 = RagConfig {
            api_base: "http://localhost:9621".to_string(),
            ..Default::default()
        };
        let client2 = RagClient::new(config2).unwrap();
        assert_eq!(client2.endpoint("query"), "http://localhost:9621/query");
    }

    #[test]
    fn test_query_request_shape() {
        let request = QueryRequest {
            query: "What is RAG?",
            mode: "mix",
            top_k: 10,
            include_references: true,
            response_type: "Multiple Paragraphs",
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["query"], "What is RAG?");
        assert_eq!(json["mode"], "mix");
        assert_eq!(json["top_k"], 10);
        assert_eq!(json["include_references"], true);
        assert_eq!(json["response_type"], "Multiple Paragraphs");
    }

    #[tokio::test]
    async fn test_unreachable_engine_is_an_error() {
        let config = RagConfig {
            api_base: "http://127.0.0.1:1".to_string(),
            timeout_secs: 2,
            ..Default::default()
        };
        let client = RagClient::new(config).unwrap();
        let err = client.query("hello").await.unwrap_err();
        assert!(matches!(err, EvalError::Http(_)));
    }
}
