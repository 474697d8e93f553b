//! RAG Eval - an evaluation harness for retrieval-augmented generation engines.
//!
//! Runs a labeled question set against a LightRAG-compatible engine and
//! measures two things per question: whether the answer mentions an expected
//! fact (accuracy) and whether it cites an expected document (citation).
//! Optionally a judge LLM grades the batch on semantic metrics.
//!
//! # Overview
//!
//! A run moves through fixed stages:
//! 1. Load test cases from a JSONL dataset
//! 2. Ingest the document corpus into the engine (optional)
//! 3. Query the engine for every case, with bounded concurrency
//! 4. Score each answer with deterministic heuristics
//! 5. Aggregate, then persist a JSON report and an HTML table
//!
//! # Quick Start
//!
//! ```no_run
//! use rag_eval::{
//!     config::Config,
//!     pipeline::EvalPipeline,
//!     rag::RagClient,
//! };
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Load configuration
//!     let config = Config::load()?;
//!     config.validate()?;
//!
//!     // Connect to the engine under test
//!     let client = Arc::new(RagClient::new(config.rag.clone())?);
//!
//!     // Evaluate
//!     let pipeline = EvalPipeline::new(config, client);
//!     let summary = pipeline.run(Path::new("EVAL.jsonl")).await?;
//!     summary.report.print_summary();
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **dataset**: JSONL test case loading
//! - **rag**: engine HTTP client and response normalization
//! - **ingest**: corpus upload with per-file failure isolation
//! - **dispatch**: concurrent, order-preserving query fan-out
//! - **scoring**: accuracy and citation judgments
//! - **metrics**: model-graded semantic metrics
//! - **report**: aggregation and persistence

pub mod config;
pub mod dataset;
pub mod dispatch;
pub mod error;
pub mod ingest;
pub mod llm;
pub mod metrics;
pub mod pipeline;
pub mod rag;
pub mod report;
pub mod scoring;

// Re-export commonly used types
pub use config::Config;
pub use dataset::{TestCase, load_test_cases};
pub use error::{EvalError, Result};
pub use pipeline::{EvalPipeline, RunSummary};
pub use rag::{QueryResult, RagBackend, RagClient, Reference};
pub use report::{Report, load_report, save_report};
pub use scoring::{EvalOutcome, HeuristicScorer};
