//! End-to-end evaluation run.
//!
//! Stages run in a fixed order: load dataset, ingest corpus (optional),
//! dispatch queries, score, compute semantic metrics (optional), aggregate
//! and persist. Only the fatal conditions in [`EvalError`] stop a run; every
//! per-file and per-case failure is carried through to the report.

use crate::config::Config;
use crate::dataset::{TestCase, load_test_cases};
use crate::dispatch::{DispatchOptions, QueryDispatcher};
use crate::error::{EvalError, Result};
use crate::ingest::{IngestionOrchestrator, IngestionSummary};
use crate::metrics::{LlmJudgeScorer, MetricSample, SemanticScorer, score_or_zero};
use crate::rag::{QueryResult, RagBackend, ResponseNormalizer};
use crate::report::{Report, SavedReport, save_report};
use crate::scoring::{EvalOutcome, HeuristicScorer};
use chrono::Local;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// What a finished run produced.
#[derive(Debug)]
pub struct RunSummary {
    pub report: Report,
    pub saved: SavedReport,
    /// Present when ingestion ran.
    pub ingestion: Option<IngestionSummary>,
}

/// Drives one evaluation run against a RAG backend.
pub struct EvalPipeline<B> {
    config: Config,
    backend: Arc<B>,
    normalizer: ResponseNormalizer,
}

impl<B: RagBackend> EvalPipeline<B> {
    /// Create a pipeline. The config is used as-is; validate it beforehand.
    pub fn new(config: Config, backend: Arc<B>) -> Self {
        let normalizer = ResponseNormalizer::new(config.eval.reference_dirs.clone());
        Self {
            config,
            backend,
            normalizer,
        }
    }

    /// Run with heuristic scoring only.
    pub async fn run(&self, dataset: &Path) -> Result<RunSummary> {
        self.execute(dataset, None::<&LlmJudgeScorer>).await
    }

    /// Run with heuristic scoring plus model-graded semantic metrics.
    pub async fn run_with_metrics<S: SemanticScorer>(
        &self,
        dataset: &Path,
        scorer: &S,
    ) -> Result<RunSummary> {
        self.execute(dataset, Some(scorer)).await
    }

    async fn execute<S: SemanticScorer>(
        &self,
        dataset: &Path,
        scorer: Option<&S>,
    ) -> Result<RunSummary> {
        let timestamp = Local::now();
        let started = Instant::now();

        let cases = load_test_cases(dataset)?;
        if cases.is_empty() {
            return Err(EvalError::EmptyDataset(dataset.to_path_buf()));
        }
        info!(cases = cases.len(), dataset = %dataset.display(), "loaded test cases");

        let ingestion = if self.config.eval.skip_ingestion {
            info!("skipping document ingestion");
            None
        } else {
            Some(self.ingest().await?)
        };

        let dispatcher = QueryDispatcher::new(
            Arc::clone(&self.backend),
            self.normalizer.clone(),
            DispatchOptions {
                concurrency: self.config.eval.max_concurrent,
                timeout: Duration::from_secs(self.config.rag.timeout_secs),
            },
        );
        let results = dispatcher.dispatch(&cases).await;

        let outcomes = HeuristicScorer::new().score_all(&cases, &results);
        log_outcomes(&outcomes);

        let mut report = Report::aggregate(timestamp, 0.0, outcomes);

        if let Some(scorer) = scorer {
            let samples = metric_samples(&cases, &results);
            let scores = score_or_zero(scorer, &samples).await;
            report = report.with_semantic_metrics(scores);
        }

        report.duration_seconds = started.elapsed().as_secs_f64();
        let saved = save_report(&report, &self.config.eval.results_dir)?;

        info!(
            accuracy_pct = report.overall_accuracy,
            citation_pct = report.overall_citation,
            "evaluation finished"
        );
        for note in report.notes() {
            info!("{}", note);
        }
        info!(
            json = %saved.json_path.display(),
            html = %saved.html_path.display(),
            "results saved"
        );

        Ok(RunSummary {
            report,
            saved,
            ingestion,
        })
    }

    /// Ingest the configured corpus, then run the smoke query and settle.
    async fn ingest(&self) -> Result<IngestionSummary> {
        let orchestrator = IngestionOrchestrator::new(Arc::clone(&self.backend));
        let summary = orchestrator
            .ingest_directory(&self.config.eval.input_dir)
            .await?;
        summary.ensure_usable()?;

        if summary.successful() > 0 {
            if let Some(question) = &self.config.eval.smoke_query {
                self.smoke_query(question).await?;
            }

            let settle = self.config.eval.settle_secs;
            if settle > 0 {
                info!(seconds = settle, "waiting for indexing to settle");
                tokio::time::sleep(Duration::from_secs(settle)).await;
            }
        }

        Ok(summary)
    }

    /// Confirm retrieval works on the freshly ingested corpus.
    async fn smoke_query(&self, question: &str) -> Result<()> {
        info!(question, "sending smoke query");
        let timeout = Duration::from_secs(self.config.rag.timeout_secs);

        let response = tokio::time::timeout(timeout, self.backend.query(question))
            .await
            .map_err(|_| EvalError::Timeout(timeout))??;

        let result = self.normalizer.normalize(&response).await;
        if result.references.is_empty() {
            return Err(EvalError::SmokeQueryFailed(question.to_string()));
        }

        info!(references = result.references.len(), "smoke query returned references");
        Ok(())
    }
}

/// Per-case console line.
fn log_outcomes(outcomes: &[EvalOutcome]) {
    for outcome in outcomes {
        let line = format!(
            "{} - accuracy: {} | citation: {}",
            outcome.label(),
            verdict(outcome.accuracy_pass, &outcome.accuracy_detail),
            verdict(outcome.citation_pass, &outcome.citation_detail)
        );
        if outcome.has_failure() {
            warn!("{}", line);
        } else {
            info!("{}", line);
        }
    }
}

fn verdict(pass: bool, detail: &str) -> String {
    if pass {
        "✓".to_string()
    } else {
        format!("✗ ({})", detail)
    }
}

/// Pair each case with its result for semantic scoring.
fn metric_samples(cases: &[TestCase], results: &[QueryResult]) -> Vec<MetricSample> {
    cases
        .iter()
        .zip(results)
        .map(|(case, result)| MetricSample {
            question: case.question.clone(),
            answer: result.answer.clone(),
            contexts: result.contexts(),
            ground_truth: case.ground_truth(),
        })
        .collect()
}
