//! Error types for the evaluation pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our custom error.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while running an evaluation.
///
/// Only fatal conditions are represented here. Per-file ingestion failures and
/// per-case query failures are recorded inline in their records instead.
#[derive(Error, Debug)]
pub enum EvalError {
    /// Error reading or writing files.
    #[error("I/O error for path '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The dataset file does not exist.
    #[error("Dataset not found at '{0}'")]
    DatasetNotFound(PathBuf),

    /// A non-blank dataset line is not a valid test case.
    #[error("Malformed dataset line {line} in '{path}': {message}")]
    Dataset {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// The dataset contained no test cases.
    #[error("Dataset at '{0}' contains no test cases")]
    EmptyDataset(PathBuf),

    /// The corpus directory does not exist or is not a directory.
    #[error("Corpus path '{0}' does not exist or is not a directory")]
    InvalidCorpusPath(PathBuf),

    /// Every document in a nonempty corpus failed to ingest.
    #[error("None of the {attempted} documents were ingested; cannot evaluate against an empty corpus")]
    NoDocumentsIngested { attempted: usize },

    /// The post-ingestion smoke query returned no references.
    #[error("Smoke query '{0}' returned no references; check indexing on the RAG engine")]
    SmokeQueryFailed(String),

    /// The report could not be persisted.
    #[error("Failed to write report to '{path}': {source}")]
    ReportWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The report file does not exist.
    #[error("Report not found at '{0}'")]
    ReportNotFound(PathBuf),

    /// Error during serialization/deserialization.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// RAG engine returned an error status.
    #[error("RAG engine error: {0}")]
    RagApi(String),

    /// LLM API error.
    #[error("LLM API error: {0}")]
    LlmApi(String),

    /// LLM response parsing error.
    #[error("Failed to parse LLM response: {0}")]
    LlmParse(String),

    /// HTTP request error.
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The request did not complete within the configured timeout.
    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Configuration file error.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EvalError {
    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a report write error with path context.
    pub fn report_write(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReportWrite {
            path: path.into(),
            source,
        }
    }
}

impl From<reqwest::Error> for EvalError {
    fn from(err: reqwest::Error) -> Self {
        EvalError::Http(err.to_string())
    }
}

impl From<serde_json::Error> for EvalError {
    fn from(err: serde_json::Error) -> Self {
        EvalError::Serialization(err.to_string())
    }
}
