//! Result aggregation and report persistence.
//!
//! Each run produces two artifacts in the results directory, sharing one
//! timestamped stem: a JSON report and an HTML table with an error summary.
//! Files are created with create-new semantics, so a run never overwrites an
//! earlier run's report; a stem collision gets a numeric suffix.

use crate::error::{EvalError, Result};
use crate::metrics::SemanticScores;
use crate::scoring::EvalOutcome;
use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::warn;

/// Prefix of every report artifact file name.
pub const REPORT_FILE_PREFIX: &str = "eval_results";

/// Give up looking for a free file name after this many suffixes.
const MAX_NAME_ATTEMPTS: usize = 1000;

/// Characters of the question shown in an HTML table cell.
const HTML_QUESTION_CHARS: usize = 100;

/// Characters of the answer shown in an HTML table cell.
const HTML_ANSWER_CHARS: usize = 200;

/// Aggregated result of one evaluation run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// When the run started.
    pub timestamp: DateTime<Local>,
    /// Wall-clock duration of the run.
    pub duration_seconds: f64,
    /// Number of test cases evaluated.
    pub total_cases: usize,
    /// Percentage of cases passing the accuracy judgment (0-100).
    pub overall_accuracy: f64,
    /// Percentage of cases passing the citation judgment (0-100).
    pub overall_citation: f64,
    /// One outcome per test case, in dataset order.
    pub results: Vec<EvalOutcome>,
    /// Model-graded scores, when semantic metrics were requested.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_metrics: Option<SemanticScores>,
}

/// Paths of the artifacts written for one report.
#[derive(Debug, Clone)]
pub struct SavedReport {
    pub json_path: PathBuf,
    pub html_path: PathBuf,
}

/// `100 * passed / total`, or 0 when there are no cases.
pub fn percent(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        100.0 * passed as f64 / total as f64
    }
}

impl Report {
    /// Reduce ordered outcomes into a report.
    pub fn aggregate(
        timestamp: DateTime<Local>,
        duration_seconds: f64,
        results: Vec<EvalOutcome>,
    ) -> Self {
        let total_cases = results.len();
        let accurate = results.iter().filter(|o| o.accuracy_pass).count();
        let cited = results.iter().filter(|o| o.citation_pass).count();

        Self {
            timestamp,
            duration_seconds,
            total_cases,
            overall_accuracy: percent(accurate, total_cases),
            overall_citation: percent(cited, total_cases),
            results,
            semantic_metrics: None,
        }
    }

    /// Attach semantic metric scores.
    pub fn with_semantic_metrics(mut self, scores: SemanticScores) -> Self {
        self.semantic_metrics = Some(scores);
        self
    }

    /// Outcomes with at least one failed judgment.
    pub fn failures(&self) -> impl Iterator<Item = &EvalOutcome> {
        self.results.iter().filter(|o| o.has_failure())
    }

    /// One note per case, in dataset order.
    pub fn notes(&self) -> impl Iterator<Item = &str> {
        self.results.iter().map(|o| o.note.as_str())
    }

    /// Print a summary to stdout.
    pub fn print_summary(&self) {
        println!("\n========== Evaluation Results ==========");
        println!("Run at: {}", self.timestamp.format("%Y-%m-%d %H:%M:%S"));
        println!("Total cases: {}", self.total_cases);
        println!("-----------------------------------------");
        println!("Accuracy: {:.1}%", self.overall_accuracy);
        println!("Citation: {:.1}%", self.overall_citation);
        if let Some(scores) = &self.semantic_metrics {
            println!("-----------------------------------------");
            println!("Faithfulness:      {:.4}", scores.faithfulness);
            println!("Answer relevancy:  {:.4}", scores.answer_relevancy);
            println!("Context recall:    {:.4}", scores.context_recall);
            println!("Context precision: {:.4}", scores.context_precision);
        }
        println!("-----------------------------------------");
        println!("Total time: {:.1}s", self.duration_seconds);
        println!("=========================================");

        if !self.results.is_empty() {
            println!("\nNotes:");
            for note in self.notes() {
                println!("  - {}", note);
            }
        }
        println!();
    }

    /// Render the tabular HTML view.
    pub fn render_html(&self) -> String {
        let mut html = String::new();
        html.push_str("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n");
        html.push_str("<title>RAG Evaluation Results</title>\n");
        html.push_str(
            "<style>\n\
             body { font-family: sans-serif; margin: 2em; }\n\
             table { border-collapse: collapse; width: 100%; }\n\
             th, td { border: 1px solid #ccc; padding: 6px; text-align: left; vertical-align: top; }\n\
             th { background: #f0f0f0; }\n\
             .pass { color: #1a7f37; }\n\
             .fail { color: #cf222e; }\n\
             .metrics span { margin-right: 2em; }\n\
             </style>\n",
        );
        html.push_str("</head>\n<body>\n<h1>RAG Evaluation Results</h1>\n");

        html.push_str(&format!(
            "<p>Run at {} ({:.1}s)</p>\n",
            escape_html(&self.timestamp.to_rfc3339()),
            self.duration_seconds
        ));
        html.push_str(&format!(
            "<div class=\"metrics\"><span>Total cases: {}</span><span>Accuracy: {:.1}%</span><span>Citation: {:.1}%</span></div>\n",
            self.total_cases, self.overall_accuracy, self.overall_citation
        ));
        if let Some(scores) = &self.semantic_metrics {
            html.push_str(&format!(
                "<div class=\"metrics\"><span>Faithfulness: {:.4}</span><span>Answer relevancy: {:.4}</span><span>Context recall: {:.4}</span><span>Context precision: {:.4}</span></div>\n",
                scores.faithfulness,
                scores.answer_relevancy,
                scores.context_recall,
                scores.context_precision
            ));
        }

        html.push_str("<h2>Results</h2>\n<table>\n");
        html.push_str("<tr><th>#</th><th>Question</th><th>Answer</th><th>Accuracy</th><th>Citation</th></tr>\n");
        for outcome in &self.results {
            html.push_str(&format!(
                "<tr><td>{}</td>{}{}<td>{}</td><td>{}</td></tr>\n",
                outcome.label(),
                truncated_cell(&outcome.question, HTML_QUESTION_CHARS),
                truncated_cell(&outcome.answer, HTML_ANSWER_CHARS),
                mark(outcome.accuracy_pass),
                mark(outcome.citation_pass)
            ));
        }
        html.push_str("</table>\n");

        html.push_str("<h2>Error Summary</h2>\n");
        let failures: Vec<&EvalOutcome> = self.failures().collect();
        if failures.is_empty() {
            html.push_str("<p>No failures.</p>\n");
        } else {
            html.push_str("<ul>\n");
            for outcome in failures {
                let mut details = Vec::new();
                if !outcome.accuracy_pass {
                    details.push(format!("accuracy: {}", outcome.accuracy_detail));
                }
                if !outcome.citation_pass {
                    details.push(format!("citation: {}", outcome.citation_detail));
                }
                html.push_str(&format!(
                    "<li><strong>{}</strong> {}<br>{}</li>\n",
                    outcome.label(),
                    escape_html(&outcome.question),
                    escape_html(&details.join("; "))
                ));
            }
            html.push_str("</ul>\n");
        }

        html.push_str("</body>\n</html>\n");
        html
    }
}

fn mark(pass: bool) -> &'static str {
    if pass {
        "<span class=\"pass\">&#10003;</span>"
    } else {
        "<span class=\"fail\">&#10007;</span>"
    }
}

/// Table cell showing at most `max_chars` of `text`; a shortened cell keeps
/// the full text in its `title` attribute.
fn truncated_cell(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return format!("<td>{}</td>", escape_html(text));
    }

    let head: String = text.chars().take(max_chars).collect();
    format!(
        "<td title=\"{}\">{}...</td>",
        escape_html(text),
        escape_html(&head)
    )
}

fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            c => escaped.push(c),
        }
    }
    escaped
}

/// Persist the JSON report and its HTML table under `dir`.
///
/// Any failure here is fatal to the run.
pub fn save_report(report: &Report, dir: &Path) -> Result<SavedReport> {
    fs::create_dir_all(dir).map_err(|e| EvalError::report_write(dir, e))?;

    let json = serde_json::to_string_pretty(report)
        .map_err(|e| EvalError::Serialization(e.to_string()))?;
    let stamp = report.timestamp.format("%Y%m%d_%H%M%S").to_string();

    for attempt in 0..MAX_NAME_ATTEMPTS {
        let stem = if attempt == 0 {
            format!("{}_{}", REPORT_FILE_PREFIX, stamp)
        } else {
            format!("{}_{}_{}", REPORT_FILE_PREFIX, stamp, attempt)
        };
        let json_path = dir.join(format!("{}.json", stem));
        let html_path = dir.join(format!("{}.html", stem));

        match write_new(&json_path, json.as_bytes()) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(EvalError::report_write(&json_path, e)),
        }

        if let Err(e) = write_new(&html_path, report.render_html().as_bytes()) {
            // Never leave a JSON report without its table.
            if let Err(cleanup) = fs::remove_file(&json_path) {
                warn!(path = %json_path.display(), error = %cleanup, "failed to remove partial report");
            }
            if e.kind() == ErrorKind::AlreadyExists {
                continue;
            }
            return Err(EvalError::report_write(&html_path, e));
        }

        return Ok(SavedReport {
            json_path,
            html_path,
        });
    }

    Err(EvalError::report_write(
        dir,
        std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("no free report file name for stamp {}", stamp),
        ),
    ))
}

/// Create `path` (failing if it exists) and write `data` to it.
fn write_new(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

/// Load a previously persisted JSON report.
pub fn load_report(path: &Path) -> Result<Report> {
    if !path.exists() {
        return Err(EvalError::ReportNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    serde_json::from_str(&content).map_err(|e| EvalError::Serialization(e.to_string()))
}
