//! RAG engine integration.
//!
//! Provides the HTTP client for the engine's query and ingestion endpoints,
//! the [`RagBackend`] seam the pipeline is written against, and the
//! normalization of the engine's loosely-shaped query responses.

mod client;
mod response;

pub use client::RagClient;
pub use response::{QueryResult, Reference, ResponseNormalizer};

use crate::error::Result;
use serde_json::Value;
use std::future::Future;

/// The operations the pipeline needs from a RAG engine.
///
/// [`RagClient`] is the production implementation; tests use in-memory fakes.
pub trait RagBackend: Send + Sync + 'static {
    /// Ask a question and return the raw JSON response body.
    ///
    /// Non-2xx responses and transport failures are errors.
    fn query(&self, question: &str) -> impl Future<Output = Result<Value>> + Send;

    /// Submit one document's text for indexing under `file_source`.
    ///
    /// Anything but a 200 response is an error carrying the response body.
    fn ingest(&self, file_source: &str, content: String)
    -> impl Future<Output = Result<()>> + Send;
}
