//! Normalization of RAG engine query responses.
//!
//! The engine's response schema has changed across versions, so nothing here
//! deserializes into a fixed struct. Each piece of the canonical result is
//! resolved by an ordered list of field names over the raw JSON; the first name
//! that yields a value wins.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Fields checked for the answer text.
const ANSWER_FIELDS: [&str; 3] = ["response", "answer", "result"];

/// Fields checked for the list of references / retrieved contexts.
const REFERENCE_FIELDS: [&str; 7] = [
    "references",
    "context",
    "contexts",
    "documents",
    "chunks",
    "sources",
    "retrieved_docs",
];

/// Fields checked for a reference's inline text.
const CONTENT_FIELDS: [&str; 3] = ["text", "content", "document"];

/// Fields that may point at the referenced file on disk.
const PATH_FIELDS: [&str; 2] = ["file_path", "path"];

/// Identifying fields used to synthesize content when nothing else is available.
/// Covers every field a citation can be read from.
const METADATA_FIELDS: [&str; 9] = [
    "reference_id",
    "id",
    "file_name",
    "filename",
    "file_path",
    "path",
    "title",
    "source",
    "name",
];

/// Fields checked for a reference's display name.
const NAME_FIELDS: [&str; 8] = [
    "file_name",
    "filename",
    "file_path",
    "path",
    "title",
    "source",
    "name",
    "reference_id",
];

const DISPLAY_PREVIEW_CHARS: usize = 80;

/// A citation returned alongside an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    /// Best-effort human-readable name.
    pub display_name: String,
    /// Resolved text of the reference, if any could be found.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Original fields for structured references; empty for plain strings.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub raw_fields: Map<String, Value>,
}

impl Reference {
    /// A reference given as a bare string.
    pub fn plain(text: impl Into<String>) -> Self {
        let text = text.into();
        Self {
            display_name: preview(&text, DISPLAY_PREVIEW_CHARS),
            content: Some(text),
            raw_fields: Map::new(),
        }
    }

    /// Look up a raw field as non-blank text.
    pub fn field(&self, key: &str) -> Option<String> {
        self.raw_fields.get(key).and_then(value_as_text)
    }
}

/// The canonical result of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryResult {
    /// The engine's answer; empty when the query failed.
    pub answer: String,
    /// References in the order the engine returned them.
    pub references: Vec<Reference>,
}

impl QueryResult {
    /// The result recorded for a failed query.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether the query produced neither answer nor references.
    pub fn is_empty(&self) -> bool {
        self.answer.is_empty() && self.references.is_empty()
    }

    /// Reference texts, for semantic scoring.
    pub fn contexts(&self) -> Vec<String> {
        self.references
            .iter()
            .filter_map(|r| r.content.clone())
            .collect()
    }
}

/// Converts raw engine responses into [`QueryResult`]s.
#[derive(Debug, Clone, Default)]
pub struct ResponseNormalizer {
    reference_dirs: Vec<PathBuf>,
}

impl ResponseNormalizer {
    /// Create a normalizer that resolves relative `file_path` references
    /// against `reference_dirs` (tried in order, then the path as given).
    pub fn new(reference_dirs: Vec<PathBuf>) -> Self {
        Self { reference_dirs }
    }

    /// Normalize a full response body.
    pub async fn normalize(&self, response: &Value) -> QueryResult {
        let answer = resolve_answer(response);

        let mut references = Vec::new();
        match find_reference_field(response) {
            Some(Value::String(s)) => references.push(Reference::plain(s.clone())),
            Some(Value::Array(items)) => {
                for item in items {
                    if let Some(reference) = self.normalize_item(item).await {
                        references.push(reference);
                    }
                }
            }
            _ => {}
        }

        QueryResult { answer, references }
    }

    /// Normalize one reference item. Returns `None` only for items that
    /// carry no content and no identifying information.
    async fn normalize_item(&self, item: &Value) -> Option<Reference> {
        match item {
            Value::Null => None,
            Value::String(s) => Some(Reference::plain(s.clone())),
            Value::Object(fields) => {
                let content = match inline_content(fields) {
                    Some(text) => Some(text),
                    None => match self.read_referenced_file(fields).await {
                        Some(text) => Some(text),
                        None => metadata_summary(fields),
                    },
                };

                let Some(content) = content else {
                    warn!(
                        fields = ?fields.keys().collect::<Vec<_>>(),
                        "dropping reference without content or identifying fields"
                    );
                    return None;
                };

                let display_name = NAME_FIELDS
                    .iter()
                    .find_map(|key| fields.get(*key).and_then(value_as_text))
                    .unwrap_or_else(|| preview(&content, DISPLAY_PREVIEW_CHARS));

                Some(Reference {
                    display_name,
                    content: Some(content),
                    raw_fields: fields.clone(),
                })
            }
            other => Some(Reference::plain(other.to_string())),
        }
    }

    /// Candidate locations for a referenced path, in lookup order.
    fn candidate_paths(&self, file_path: &str) -> Vec<PathBuf> {
        let path = Path::new(file_path);
        if path.is_absolute() {
            return vec![path.to_path_buf()];
        }

        self.reference_dirs
            .iter()
            .map(|dir| dir.join(path))
            .chain(std::iter::once(path.to_path_buf()))
            .collect()
    }

    /// Try to recover content by reading the file a reference points to.
    async fn read_referenced_file(&self, fields: &Map<String, Value>) -> Option<String> {
        let file_path = PATH_FIELDS
            .iter()
            .find_map(|key| fields.get(*key).and_then(value_as_text))?;

        let candidates = self.candidate_paths(&file_path);
        for candidate in &candidates {
            match tokio::fs::read_to_string(candidate).await {
                Ok(text) => {
                    debug!(path = %candidate.display(), "read reference content from file");
                    return Some(text);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!(path = %candidate.display(), error = %e, "failed to read referenced file");
                }
            }
        }

        warn!(
            file_path = %file_path,
            candidates = candidates.len(),
            "referenced file not found in any candidate location"
        );
        None
    }
}

/// Check the answer fields; first non-empty string wins.
pub fn resolve_answer(response: &Value) -> String {
    ANSWER_FIELDS
        .iter()
        .find_map(|key| {
            response
                .get(*key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
        })
        .unwrap_or_default()
        .to_string()
}

/// Check the reference fields; first present non-empty field wins.
fn find_reference_field(response: &Value) -> Option<&Value> {
    REFERENCE_FIELDS.iter().find_map(|key| {
        response.get(*key).filter(|value| match value {
            Value::Array(items) => !items.is_empty(),
            Value::String(s) => !s.trim().is_empty(),
            _ => false,
        })
    })
}

fn inline_content(fields: &Map<String, Value>) -> Option<String> {
    CONTENT_FIELDS
        .iter()
        .find_map(|key| fields.get(*key).and_then(value_as_text))
}

/// Synthesize `key: value` lines from whatever identifying fields exist.
fn metadata_summary(fields: &Map<String, Value>) -> Option<String> {
    let lines: Vec<String> = METADATA_FIELDS
        .iter()
        .filter_map(|key| {
            fields
                .get(*key)
                .and_then(value_as_text)
                .map(|value| format!("{}: {}", key, value))
        })
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

/// Scalar JSON value as non-blank text.
fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let head: String = text.chars().take(max_chars).collect();
        format!("{}...", head)
    } else {
        text.to_string()
    }
}
