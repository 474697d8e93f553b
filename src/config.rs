//! Configuration for the evaluation pipeline.
//!
//! Supports both environment variables and YAML config file.
//! Environment variables take precedence over config file values.
//! The resulting [`Config`] is passed explicitly to every component; nothing
//! below the CLI reads the process environment.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

/// How documents are sent to the ingestion endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadMode {
    /// `POST /documents/text` with a `{text, file_source}` JSON body.
    Text,
    /// `POST /documents/upload` with a multipart `file` part.
    Multipart,
}

impl UploadMode {
    /// Parse from string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" => Some(UploadMode::Text),
            "multipart" | "upload" => Some(UploadMode::Multipart),
            _ => None,
        }
    }
}

/// RAG engine connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Base URL of the RAG engine (e.g., "http://localhost:9621")
    pub api_base: String,

    /// Value for the `X-API-Key` header; empty disables the header
    #[serde(default)]
    pub api_key: String,

    /// Retrieval mode sent with every query
    #[serde(default = "default_mode")]
    pub mode: String,

    /// Number of items retrieved per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Requested answer style
    #[serde(default = "default_response_type")]
    pub response_type: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Ingestion request shape
    #[serde(default = "default_upload_mode")]
    pub upload_mode: UploadMode,
}

fn default_api_base() -> String {
    "http://localhost:9621".to_string()
}

fn default_mode() -> String {
    "mix".to_string()
}

fn default_top_k() -> usize {
    10
}

fn default_response_type() -> String {
    "Multiple Paragraphs".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_upload_mode() -> UploadMode {
    UploadMode::Text
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            api_base: default_api_base(),
            api_key: String::new(),
            mode: default_mode(),
            top_k: default_top_k(),
            response_type: default_response_type(),
            timeout_secs: default_timeout_secs(),
            upload_mode: default_upload_mode(),
        }
    }
}

/// Evaluation run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalConfig {
    /// Maximum number of queries in flight
    pub max_concurrent: usize,

    /// Directory that receives the report artifacts
    pub results_dir: PathBuf,

    /// Directory of documents to ingest before querying
    pub input_dir: PathBuf,

    /// Skip ingestion and evaluate against the existing corpus
    pub skip_ingestion: bool,

    /// Seconds to wait after ingestion so indexing can settle
    pub settle_secs: u64,

    /// Question sent after ingestion to confirm retrieval works
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smoke_query: Option<String>,

    /// Base directories used to resolve relative `file_path` references
    pub reference_dirs: Vec<PathBuf>,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 2,
            results_dir: PathBuf::from("results"),
            input_dir: PathBuf::from("data/inputs/__enqueued__"),
            skip_ingestion: false,
            settle_secs: 5,
            smoke_query: None,
            reference_dirs: vec![
                PathBuf::from("data/inputs/__enqueued__"),
                PathBuf::from("data/inputs"),
                PathBuf::from("data"),
            ],
        }
    }
}

/// LLM configuration for the semantic-metrics judge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL for the LLM API (e.g., "https://api.openai.com")
    pub api_base: String,

    /// API key for authentication
    pub api_key: String,

    /// Model name (e.g., "gpt-4o-mini")
    pub model: String,

    /// Maximum tokens for response (optional)
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Temperature for generation (optional)
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Per-request timeout in seconds
    #[serde(default = "default_llm_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.0
}

fn default_llm_timeout_secs() -> u64 {
    180
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            api_base: "https://api.openai.com".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_llm_timeout_secs(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// RAG engine settings
    pub rag: RagConfig,
    /// Evaluation run settings
    pub eval: EvalConfig,
    /// Judge LLM settings for semantic metrics
    pub judge: LlmConfig,
}

/// Configuration file structure (YAML format).
#[derive(Debug, Deserialize)]
struct ConfigFile {
    rag: Option<RagFileSection>,
    eval: Option<EvalFileSection>,
    judge: Option<LlmFileSection>,
}

#[derive(Debug, Deserialize)]
struct RagFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    mode: Option<String>,
    top_k: Option<usize>,
    response_type: Option<String>,
    timeout_secs: Option<u64>,
    upload_mode: Option<UploadMode>,
}

#[derive(Debug, Deserialize)]
struct EvalFileSection {
    max_concurrent: Option<usize>,
    results_dir: Option<PathBuf>,
    input_dir: Option<PathBuf>,
    skip_ingestion: Option<bool>,
    settle_secs: Option<u64>,
    smoke_query: Option<String>,
    reference_dirs: Option<Vec<PathBuf>>,
}

#[derive(Debug, Deserialize)]
struct LlmFileSection {
    api_base: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    max_tokens: Option<u32>,
    temperature: Option<f32>,
    timeout_secs: Option<u64>,
}

impl Config {
    /// Load configuration from environment variables and optional config file.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (LIGHTRAG_API_URL, EVAL_MAX_CONCURRENT, ...)
    /// 2. Config file (~/.config/rag-eval/config.yaml)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        let mut config = Config::default();

        if let Some(config_path) = Self::config_file_path() {
            if config_path.exists() {
                config = Self::load_from_file(&config_path)?;
            }
        }

        config.apply_env(|key| env::var(key).ok());
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, filling gaps with defaults.
    pub fn from_yaml(content: &str) -> Result<Self> {
        let file_config: ConfigFile = serde_yaml::from_str(content)
            .map_err(|e| EvalError::Config(format!("Failed to parse config file: {}", e)))?;

        let mut config = Config::default();

        if let Some(rag) = file_config.rag {
            if let Some(api_base) = rag.api_base {
                config.rag.api_base = api_base;
            }
            if let Some(api_key) = rag.api_key {
                config.rag.api_key = api_key;
            }
            if let Some(mode) = rag.mode {
                config.rag.mode = mode;
            }
            if let Some(top_k) = rag.top_k {
                config.rag.top_k = top_k;
            }
            if let Some(response_type) = rag.response_type {
                config.rag.response_type = response_type;
            }
            if let Some(timeout_secs) = rag.timeout_secs {
                config.rag.timeout_secs = timeout_secs;
            }
            if let Some(upload_mode) = rag.upload_mode {
                config.rag.upload_mode = upload_mode;
            }
        }

        if let Some(eval) = file_config.eval {
            if let Some(max_concurrent) = eval.max_concurrent {
                config.eval.max_concurrent = max_concurrent;
            }
            if let Some(results_dir) = eval.results_dir {
                config.eval.results_dir = results_dir;
            }
            if let Some(input_dir) = eval.input_dir {
                config.eval.input_dir = input_dir;
            }
            if let Some(skip) = eval.skip_ingestion {
                config.eval.skip_ingestion = skip;
            }
            if let Some(settle_secs) = eval.settle_secs {
                config.eval.settle_secs = settle_secs;
            }
            if eval.smoke_query.is_some() {
                config.eval.smoke_query = eval.smoke_query;
            }
            if let Some(dirs) = eval.reference_dirs {
                config.eval.reference_dirs = dirs;
            }
        }

        if let Some(judge) = file_config.judge {
            if let Some(api_base) = judge.api_base {
                config.judge.api_base = api_base;
            }
            if let Some(api_key) = judge.api_key {
                config.judge.api_key = api_key;
            }
            if let Some(model) = judge.model {
                config.judge.model = model;
            }
            if let Some(max_tokens) = judge.max_tokens {
                config.judge.max_tokens = max_tokens;
            }
            if let Some(temperature) = judge.temperature {
                config.judge.temperature = temperature;
            }
            if let Some(timeout_secs) = judge.timeout_secs {
                config.judge.timeout_secs = timeout_secs;
            }
        }

        Ok(config)
    }

    /// Override values from an environment lookup.
    ///
    /// Unparseable numeric values are ignored and the previous value kept.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_base) = lookup("LIGHTRAG_API_URL") {
            self.rag.api_base = api_base;
        }
        if let Some(api_key) = lookup("LIGHTRAG_API_KEY") {
            self.rag.api_key = api_key;
        }
        if let Some(mode) = lookup("EVAL_QUERY_MODE") {
            self.rag.mode = mode;
        }
        if let Some(top_k) = lookup("EVAL_QUERY_TOP_K").and_then(|v| v.parse().ok()) {
            self.rag.top_k = top_k;
        }
        if let Some(timeout) = lookup("EVAL_QUERY_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.rag.timeout_secs = timeout;
        }
        if let Some(mode) = lookup("EVAL_UPLOAD_MODE").and_then(|v| UploadMode::parse(&v)) {
            self.rag.upload_mode = mode;
        }

        if let Some(max) = lookup("EVAL_MAX_CONCURRENT").and_then(|v| v.parse().ok()) {
            self.eval.max_concurrent = max;
        }
        if let Some(dir) = lookup("EVAL_RESULTS_DIR") {
            self.eval.results_dir = PathBuf::from(dir);
        }
        if let Some(dir) = lookup("EVAL_INPUT_DIR") {
            self.eval.input_dir = PathBuf::from(dir);
        }
        if let Some(skip) = lookup("EVAL_SKIP_INGESTION") {
            self.eval.skip_ingestion = skip.eq_ignore_ascii_case("true");
        }

        if let Some(api_base) = lookup("EVAL_LLM_BINDING_HOST") {
            self.judge.api_base = api_base;
        }
        if let Some(api_key) = lookup("EVAL_LLM_BINDING_API_KEY").or_else(|| lookup("OPENAI_API_KEY"))
        {
            self.judge.api_key = api_key;
        }
        if let Some(model) = lookup("EVAL_LLM_MODEL") {
            self.judge.model = model;
        }
        if let Some(timeout) = lookup("EVAL_LLM_TIMEOUT").and_then(|v| v.parse().ok()) {
            self.judge.timeout_secs = timeout;
        }
    }

    /// Get the default config file path.
    pub fn config_file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "rag-eval")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    /// Validate that the RAG engine and run settings are usable.
    pub fn validate(&self) -> Result<()> {
        if self.rag.api_base.is_empty() {
            return Err(EvalError::Config(
                "RAG engine URL is required. Set LIGHTRAG_API_URL environment variable or add to config file.".to_string()
            ));
        }

        if !self.rag.api_base.starts_with("http://") && !self.rag.api_base.starts_with("https://")
        {
            return Err(EvalError::Config(format!(
                "RAG engine URL must start with http:// or https://, got '{}'",
                self.rag.api_base
            )));
        }

        if self.rag.top_k == 0 {
            return Err(EvalError::Config("top_k must be at least 1".to_string()));
        }

        if self.rag.timeout_secs == 0 {
            return Err(EvalError::Config(
                "Query timeout must be at least 1 second".to_string(),
            ));
        }

        if self.eval.max_concurrent == 0 {
            return Err(EvalError::Config(
                "max_concurrent must be at least 1. Set EVAL_MAX_CONCURRENT or pass --concurrency."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Validate the judge settings needed for semantic metrics.
    pub fn validate_judge(&self) -> Result<()> {
        if self.judge.api_base.is_empty() {
            return Err(EvalError::Config(
                "Judge LLM base URL is required. Set EVAL_LLM_BINDING_HOST environment variable or add to config file.".to_string()
            ));
        }

        if self.judge.api_key.is_empty() {
            return Err(EvalError::Config(
                "Judge LLM API key is required. Set EVAL_LLM_BINDING_API_KEY environment variable or add to config file.".to_string()
            ));
        }

        if self.judge.model.is_empty() {
            return Err(EvalError::Config(
                "Judge LLM model is required. Set EVAL_LLM_MODEL environment variable or add to config file."
                    .to_string(),
            ));
        }

        Ok(())
    }

    /// Create a config pointing at a specific RAG engine (useful for testing).
    pub fn with_rag(api_base: impl Into<String>) -> Self {
        Self {
            rag: RagConfig {
                api_base: api_base.into(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.rag.api_base, "http://localhost:9621");
        assert!(config.rag.api_key.is_empty());
        assert_eq!(config.rag.mode, "mix");
        assert_eq!(config.rag.top_k, 10);
        assert_eq!(config.rag.timeout_secs, 30);
        assert_eq!(config.rag.upload_mode, UploadMode::Text);
        assert_eq!(config.eval.max_concurrent, 2);
        assert_eq!(config.eval.settle_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let mut config = Config::default();
        config.eval.max_concurrent = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_bad_url() {
        let config = Config::with_rag("localhost:9621");
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_judge_requires_key() {
        let config = Config::default();
        assert!(config.validate_judge().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("LIGHTRAG_API_URL", "http://rag:9000"),
            ("EVAL_MAX_CONCURRENT", "8"),
            ("EVAL_QUERY_TOP_K", "not-a-number"),
            ("EVAL_SKIP_INGESTION", "TRUE"),
            ("OPENAI_API_KEY", "sk-test"),
            ("EVAL_UPLOAD_MODE", "multipart"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.rag.api_base, "http://rag:9000");
        assert_eq!(config.eval.max_concurrent, 8);
        assert_eq!(config.rag.top_k, 10);
        assert!(config.eval.skip_ingestion);
        assert_eq!(config.judge.api_key, "sk-test");
        assert_eq!(config.rag.upload_mode, UploadMode::Multipart);
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
rag:
  api_base: "http://example.com"
  top_k: 5
eval:
  max_concurrent: 4
  smoke_query: "What is LightRAG?"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.rag.api_base, "http://example.com");
        assert_eq!(config.rag.top_k, 5);
        assert_eq!(config.rag.mode, "mix");
        assert_eq!(config.eval.max_concurrent, 4);
        assert_eq!(config.eval.smoke_query.as_deref(), Some("What is LightRAG?"));
        assert_eq!(config.judge.model, "gpt-4o-mini");
    }

    #[test]
    fn test_from_yaml_invalid() {
        assert!(Config::from_yaml("rag: [unclosed").is_err());
    }
}
