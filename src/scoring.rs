//! Deterministic heuristic scoring of answers.
//!
//! Two independent pass/fail judgments per case:
//!
//! - **Accuracy**: the answer mentions at least one gold point. Gold points of
//!   up to five characters must appear as whole words; longer ones match when
//!   all their words appear in order, with anything in between.
//! - **Citation**: at least one expected document name is a case-insensitive
//!   substring of a cited file name (path prefix stripped).
//!
//! A case without gold points or expected documents passes that judgment.
//! These rules define historical results; keep them exactly as they are.

use crate::dataset::TestCase;
use crate::rag::{QueryResult, Reference};
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Gold points at or below this many characters require a whole-word match.
const SHORT_PHRASE_CHARS: usize = 5;

/// Characters of the answer quoted in a failed accuracy detail.
const ANSWER_PREVIEW_CHARS: usize = 50;

/// Cited names listed in a failed citation detail.
const MAX_LISTED_CITATIONS: usize = 3;

/// Reference fields checked for the cited document name, in priority order.
/// `file_path` is only a fallback behind the name and title fields.
const CITATION_FIELDS: [&str; 5] = ["file_name", "filename", "title", "source", "file_path"];

/// Result of one judgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgment {
    pub pass: bool,
    /// Why the judgment failed; empty on pass.
    pub detail: String,
}

impl Judgment {
    fn pass() -> Self {
        Self {
            pass: true,
            detail: String::new(),
        }
    }

    fn fail(detail: String) -> Self {
        Self { pass: false, detail }
    }
}

/// Scored result of one test case.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvalOutcome {
    /// Position of the case in the dataset (0-based).
    pub test_index: usize,
    pub question: String,
    pub answer: String,
    pub accuracy_pass: bool,
    pub citation_pass: bool,
    pub accuracy_detail: String,
    pub citation_detail: String,
    /// Human-readable summary of both judgments.
    pub note: String,
}

impl EvalOutcome {
    /// 1-based label used in notes and tables.
    pub fn label(&self) -> String {
        format!("Q{}", self.test_index + 1)
    }

    /// Whether either judgment failed.
    pub fn has_failure(&self) -> bool {
        !self.accuracy_pass || !self.citation_pass
    }
}

/// Whether `answer` covers at least one of `gold_points`.
pub fn judge_accuracy(answer: &str, gold_points: &[String]) -> Judgment {
    if gold_points.is_empty() {
        return Judgment::pass();
    }

    let answer_lower = answer.to_lowercase();
    if gold_points
        .iter()
        .any(|point| gold_point_matches(&answer_lower, &point.to_lowercase()))
    {
        return Judgment::pass();
    }

    let detail = if answer.is_empty() {
        "no gold point covered; answer was empty".to_string()
    } else {
        format!(
            "no gold point covered; answer was '{}'",
            truncate_chars(answer, ANSWER_PREVIEW_CHARS)
        )
    };
    Judgment::fail(detail)
}

/// Match one lowercased gold point against the lowercased answer.
fn gold_point_matches(answer_lower: &str, point_lower: &str) -> bool {
    let pattern = if point_lower.chars().count() <= SHORT_PHRASE_CHARS {
        format!(r"\b{}\b", regex::escape(point_lower))
    } else {
        let words: Vec<String> = point_lower.split_whitespace().map(regex::escape).collect();
        format!("(?s){}", words.join(".*"))
    };

    match Regex::new(&pattern) {
        Ok(re) => re.is_match(answer_lower),
        Err(_) => answer_lower.contains(point_lower),
    }
}

/// Extract the bare file name a reference cites, if any.
pub fn cited_document(reference: &Reference) -> Option<String> {
    CITATION_FIELDS
        .iter()
        .find_map(|field| reference.field(field))
        .map(|name| bare_file_name(&name).to_string())
}

/// Strip any `/`- or `\`-separated path prefix.
fn bare_file_name(name: &str) -> &str {
    name.rsplit(|c| c == '/' || c == '\\').next().unwrap_or(name)
}

/// Whether `references` cite at least one of `expected_docs`.
pub fn judge_citation(references: &[Reference], expected_docs: &[String]) -> Judgment {
    if expected_docs.is_empty() {
        return Judgment::pass();
    }

    let cited: Vec<String> = references.iter().filter_map(cited_document).collect();
    let cited_lower: Vec<String> = cited.iter().map(|c| c.to_lowercase()).collect();

    let found = expected_docs.iter().any(|expected| {
        let expected = expected.to_lowercase();
        cited_lower.iter().any(|c| c.contains(&expected))
    });
    if found {
        return Judgment::pass();
    }

    let expected = expected_docs.join(", ");
    if cited.is_empty() {
        Judgment::fail(format!("cited no documents, expected '{}'", expected))
    } else {
        let listed: Vec<&str> = cited
            .iter()
            .take(MAX_LISTED_CITATIONS)
            .map(String::as_str)
            .collect();
        Judgment::fail(format!(
            "cited wrong documents '{}', expected '{}'",
            listed.join(", "),
            expected
        ))
    }
}

/// Scores query results against their test cases.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicScorer;

impl HeuristicScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score one case.
    pub fn score(&self, test_index: usize, case: &TestCase, result: &QueryResult) -> EvalOutcome {
        let accuracy = judge_accuracy(&result.answer, &case.gold_points);
        let citation = judge_citation(&result.references, &case.expected_docs);
        let note = build_note(test_index, case, &accuracy, &citation);

        EvalOutcome {
            test_index,
            question: case.question.clone(),
            answer: result.answer.clone(),
            accuracy_pass: accuracy.pass,
            citation_pass: citation.pass,
            accuracy_detail: accuracy.detail,
            citation_detail: citation.detail,
            note,
        }
    }

    /// Score every case. `results[i]` must belong to `cases[i]`.
    pub fn score_all(&self, cases: &[TestCase], results: &[QueryResult]) -> Vec<EvalOutcome> {
        cases
            .iter()
            .zip(results)
            .enumerate()
            .map(|(index, (case, result))| self.score(index, case, result))
            .collect()
    }
}

fn build_note(test_index: usize, case: &TestCase, accuracy: &Judgment, citation: &Judgment) -> String {
    let label = format!("Q{}", test_index + 1);

    if accuracy.pass && citation.pass {
        return if case.expected_docs.is_empty() {
            format!("{}: accuracy and citation as expected", label)
        } else {
            format!(
                "{}: accuracy and citation as expected; answer covers the gold points and cites '{}'",
                label,
                case.expected_docs.join(", ")
            )
        };
    }

    let mut problems = Vec::new();
    if !accuracy.pass {
        problems.push(format!(
            "{} (expected a mention of '{}')",
            accuracy.detail,
            case.gold_points.join(", ")
        ));
    }
    if !citation.pass {
        problems.push(citation.detail.clone());
    }
    format!("{}: {}", label, problems.join("; "))
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
