//! Test-case loading for evaluation runs.
//!
//! The dataset is UTF-8 JSONL, one test case per line:
//!
//! ```json
//! {"q": "What are the main components of a RAG system?", "gold": ["Retrieval system", "LLM"], "doc_hint": ["rag_architecture.md"]}
//! ```
//!
//! The question may be keyed `q`, `query` or `question`. `gold` and
//! `doc_hint` are optional.

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Keys checked for the question text, in priority order.
const QUESTION_KEYS: [&str; 3] = ["q", "query", "question"];

/// A single labeled evaluation case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    /// The question sent to the RAG engine.
    pub question: String,
    /// Phrases a correct answer should mention (at least one of).
    pub gold_points: Vec<String>,
    /// Document names a correct answer should cite (at least one of).
    pub expected_docs: Vec<String>,
}

impl TestCase {
    /// Create a test case.
    pub fn new(
        question: impl Into<String>,
        gold_points: Vec<String>,
        expected_docs: Vec<String>,
    ) -> Self {
        Self {
            question: question.into(),
            gold_points,
            expected_docs,
        }
    }

    /// Ground truth text handed to semantic scorers.
    pub fn ground_truth(&self) -> String {
        self.gold_points.join(". ")
    }

    /// Parse one dataset line.
    fn from_json_line(line: &str) -> std::result::Result<Self, String> {
        let value: Value = serde_json::from_str(line).map_err(|e| e.to_string())?;
        let object = value
            .as_object()
            .ok_or_else(|| "expected a JSON object".to_string())?;

        let question = QUESTION_KEYS
            .iter()
            .find_map(|key| object.get(*key).and_then(Value::as_str))
            .ok_or_else(|| "missing question field (q, query or question)".to_string())?;

        Ok(Self {
            question: question.to_string(),
            gold_points: string_list(object.get("gold")),
            expected_docs: string_list(object.get("doc_hint")),
        })
    }
}

/// Read a list-valued field. A bare string counts as a one-element list.
fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Null => None,
                other => Some(other.to_string()),
            })
            .collect(),
        Some(Value::String(s)) if !s.is_empty() => vec![s.clone()],
        _ => Vec::new(),
    }
}

/// Load test cases from a JSONL file.
///
/// Blank lines are skipped. Any malformed non-blank line fails the whole load.
pub fn load_test_cases(path: &Path) -> Result<Vec<TestCase>> {
    if !path.exists() {
        return Err(EvalError::DatasetNotFound(path.to_path_buf()));
    }

    let content = fs::read_to_string(path).map_err(|e| EvalError::io(path, e))?;
    parse_test_cases(&content, path)
}

/// Parse JSONL content. `origin` is only used for error messages.
pub fn parse_test_cases(content: &str, origin: &Path) -> Result<Vec<TestCase>> {
    let mut cases = Vec::new();

    for (line_num, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let case = TestCase::from_json_line(line).map_err(|message| EvalError::Dataset {
            path: origin.to_path_buf(),
            line: line_num + 1,
            message,
        })?;
        cases.push(case);
    }

    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn origin() -> PathBuf {
        PathBuf::from("EVAL.jsonl")
    }

    #[test]
    fn test_parse_preserves_order_and_skips_blank_lines() {
        let content = r#"{"q": "first", "gold": ["a"], "doc_hint": ["x.md"]}

{"query": "second"}

{"question": "third", "gold": ["b", "c"]}
"#;
        let cases = parse_test_cases(content, &origin()).unwrap();
        assert_eq!(cases.len(), 3);
        assert_eq!(cases[0].question, "first");
        assert_eq!(cases[0].expected_docs, vec!["x.md".to_string()]);
        assert_eq!(cases[1].question, "second");
        assert!(cases[1].gold_points.is_empty());
        assert!(cases[1].expected_docs.is_empty());
        assert_eq!(cases[2].gold_points.len(), 2);
    }

    #[test]
    fn test_question_key_priority() {
        let cases =
            parse_test_cases(r#"{"question": "long", "q": "short"}"#, &origin()).unwrap();
        assert_eq!(cases[0].question, "short");
    }

    #[test]
    fn test_malformed_line_fails_whole_load() {
        let content = "{\"q\": \"ok\"}\nnot json\n{\"q\": \"also ok\"}\n";
        let err = parse_test_cases(content, &origin()).unwrap_err();
        match err {
            EvalError::Dataset { line, .. } => assert_eq!(line, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_missing_question_is_an_error() {
        let err = parse_test_cases(r#"{"gold": ["x"]}"#, &origin()).unwrap_err();
        assert!(matches!(err, EvalError::Dataset { line: 1, .. }));
    }

    #[test]
    fn test_non_object_line_is_an_error() {
        assert!(parse_test_cases("[1, 2, 3]", &origin()).is_err());
    }

    #[test]
    fn test_string_gold_becomes_single_point() {
        let cases = parse_test_cases(r#"{"q": "x", "gold": "only one"}"#, &origin()).unwrap();
        assert_eq!(cases[0].gold_points, vec!["only one".to_string()]);
    }

    #[test]
    fn test_ground_truth_joins_gold_points() {
        let case = TestCase::new("q", vec!["A".into(), "B".into()], vec![]);
        assert_eq!(case.ground_truth(), "A. B");
    }

    #[test]
    fn test_load_missing_file() {
        let err = load_test_cases(Path::new("/nonexistent/EVAL.jsonl")).unwrap_err();
        assert!(matches!(err, EvalError::DatasetNotFound(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("EVAL.jsonl");
        fs::write(
            &path,
            "{\"q\": \"What is 2NF?\", \"gold\": [\"2NF\"], \"doc_hint\": [\"db.md\"]}\n",
        )
        .unwrap();

        let cases = load_test_cases(&path).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].gold_points, vec!["2NF".to_string()]);
    }
}
