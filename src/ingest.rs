//! Document ingestion into the RAG engine.
//!
//! Every text document directly inside the corpus directory is uploaded on
//! its own. A failed upload is recorded and the remaining files still go out;
//! deciding whether the corpus is usable is left to the caller.

use crate::error::{EvalError, Result};
use crate::rag::RagBackend;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use walkdir::WalkDir;

/// File extensions treated as ingestible text documents.
const DOCUMENT_EXTENSIONS: [&str; 3] = ["md", "markdown", "txt"];

/// Outcome of one file's ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestionStatus {
    Success,
    Failed,
}

/// Record of one discovered document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionRecord {
    /// Path of the source document.
    pub file_path: PathBuf,
    /// Whether the engine accepted it.
    pub status: IngestionStatus,
    /// Failure detail (response body or local error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IngestionRecord {
    fn success(file_path: PathBuf) -> Self {
        Self {
            file_path,
            status: IngestionStatus::Success,
            error: None,
        }
    }

    fn failed(file_path: PathBuf, error: impl Into<String>) -> Self {
        Self {
            file_path,
            status: IngestionStatus::Failed,
            error: Some(error.into()),
        }
    }

    /// Whether this file was ingested.
    pub fn is_success(&self) -> bool {
        self.status == IngestionStatus::Success
    }
}

/// All records of one ingestion pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestionSummary {
    pub records: Vec<IngestionRecord>,
}

impl IngestionSummary {
    /// Number of documents discovered.
    pub fn total(&self) -> usize {
        self.records.len()
    }

    /// Number of documents the engine accepted.
    pub fn successful(&self) -> usize {
        self.records.iter().filter(|r| r.is_success()).count()
    }

    /// Number of documents that failed.
    pub fn failed(&self) -> usize {
        self.total() - self.successful()
    }

    /// Fail when a nonempty corpus produced no successful ingestions.
    pub fn ensure_usable(&self) -> Result<()> {
        if self.total() > 0 && self.successful() == 0 {
            return Err(EvalError::NoDocumentsIngested {
                attempted: self.total(),
            });
        }
        Ok(())
    }
}

/// List the text documents directly inside `dir`, sorted by path.
pub fn discover_documents(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(EvalError::InvalidCorpusPath(dir.to_path_buf()));
    }

    let mut documents = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            EvalError::io(path, e.into())
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let is_document = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| {
                DOCUMENT_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            })
            .unwrap_or(false);

        if is_document {
            documents.push(entry.into_path());
        }
    }

    documents.sort();
    Ok(documents)
}

/// Uploads a corpus directory to the RAG engine.
pub struct IngestionOrchestrator<B> {
    backend: Arc<B>,
}

impl<B: RagBackend> IngestionOrchestrator<B> {
    /// Create an orchestrator over a shared backend.
    pub fn new(backend: Arc<B>) -> Self {
        Self { backend }
    }

    /// Ingest every document in `dir`, one at a time.
    ///
    /// Only an unusable directory is an error; per-file failures are recorded.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestionSummary> {
        let documents = discover_documents(dir)?;

        if documents.is_empty() {
            warn!(dir = %dir.display(), "no documents found to ingest");
            return Ok(IngestionSummary::default());
        }

        info!(count = documents.len(), dir = %dir.display(), "ingesting documents");

        let mut summary = IngestionSummary::default();
        for path in documents {
            let record = self.ingest_file(path).await;
            summary.records.push(record);
        }

        info!(
            successful = summary.successful(),
            failed = summary.failed(),
            total = summary.total(),
            "document ingestion completed"
        );

        if summary.failed() > 0 {
            error!("some documents failed to ingest; retrieval quality will suffer");
            for record in summary.records.iter().filter(|r| !r.is_success()) {
                error!(
                    file = %record.file_path.display(),
                    error = record.error.as_deref().unwrap_or(""),
                    "failed ingestion"
                );
            }
        }

        Ok(summary)
    }

    /// Read and upload a single file.
    async fn ingest_file(&self, path: PathBuf) -> IngestionRecord {
        debug!(file = %path.display(), "ingesting document");

        // The handle is scoped to the read; it is closed before the upload starts.
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) => {
                return IngestionRecord::failed(path, format!("failed to read file: {}", e));
            }
        };

        let file_source = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("untitled")
            .to_string();

        match self.backend.ingest(&file_source, content).await {
            Ok(()) => {
                info!(file = %file_source, "ingested");
                IngestionRecord::success(path)
            }
            Err(e) => IngestionRecord::failed(path, e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Accepts every upload except names listed in `reject`.
    struct FakeEngine {
        reject: Vec<String>,
        uploaded: Mutex<Vec<String>>,
    }

    impl FakeEngine {
        fn rejecting(reject: &[&str]) -> Self {
            Self {
                reject: reject.iter().map(|s| s.to_string()).collect(),
                uploaded: Mutex::new(Vec::new()),
            }
        }
    }

    impl RagBackend for FakeEngine {
        async fn query(&self, _question: &str) -> Result<Value> {
            Ok(Value::Null)
        }

        async fn ingest(&self, file_source: &str, _content: String) -> Result<()> {
            if self.reject.iter().any(|r| r == file_source) {
                return Err(EvalError::RagApi("HTTP 500: index busy".to_string()));
            }
            self.uploaded.lock().unwrap().push(file_source.to_string());
            Ok(())
        }
    }

    fn corpus(files: &[&str]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for name in files {
            fs::write(dir.path().join(name), format!("contents of {}", name)).unwrap();
        }
        dir
    }

    #[test]
    fn test_discover_is_non_recursive_and_filtered() {
        let dir = corpus(&["b.md", "a.txt", "image.png", "notes.MD"]);
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("deep.md"), "deep").unwrap();

        let found = discover_documents(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md", "notes.MD"]);
    }

    #[test]
    fn test_discover_rejects_missing_dir() {
        let err = discover_documents(Path::new("/nonexistent/corpus")).unwrap_err();
        assert!(matches!(err, EvalError::InvalidCorpusPath(_)));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_stop_the_batch() {
        let dir = corpus(&["1.md", "2.md", "3.md", "4.md", "5.md"]);
        let engine = Arc::new(FakeEngine::rejecting(&["3.md"]));
        let orchestrator = IngestionOrchestrator::new(engine.clone());

        let summary = orchestrator.ingest_directory(dir.path()).await.unwrap();
        assert_eq!(summary.successful(), 4);
        assert_eq!(summary.failed(), 1);
        assert!(summary.ensure_usable().is_ok());

        let failed = summary.records.iter().find(|r| !r.is_success()).unwrap();
        assert!(failed.file_path.ends_with("3.md"));
        assert!(failed.error.as_deref().unwrap().contains("index busy"));
        assert_eq!(engine.uploaded.lock().unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_unreadable_file_is_recorded() {
        let dir = corpus(&["good.md"]);
        fs::write(dir.path().join("bad.md"), [0xff, 0xfe, 0xfd]).unwrap();
        let orchestrator = IngestionOrchestrator::new(Arc::new(FakeEngine::rejecting(&[])));

        let summary = orchestrator.ingest_directory(dir.path()).await.unwrap();
        assert_eq!(summary.successful(), 1);
        assert_eq!(summary.failed(), 1);
        assert!(summary.records[0].file_path.ends_with("bad.md"));
    }

    #[tokio::test]
    async fn test_all_failed_is_unusable() {
        let dir = corpus(&["a.md", "b.md"]);
        let orchestrator =
            IngestionOrchestrator::new(Arc::new(FakeEngine::rejecting(&["a.md", "b.md"])));

        let summary = orchestrator.ingest_directory(dir.path()).await.unwrap();
        let err = summary.ensure_usable().unwrap_err();
        assert!(matches!(err, EvalError::NoDocumentsIngested { attempted: 2 }));
    }

    #[tokio::test]
    async fn test_empty_corpus_is_not_fatal() {
        let dir = corpus(&[]);
        let orchestrator = IngestionOrchestrator::new(Arc::new(FakeEngine::rejecting(&[])));

        let summary = orchestrator.ingest_directory(dir.path()).await.unwrap();
        assert_eq!(summary.total(), 0);
        assert!(summary.ensure_usable().is_ok());
    }
}
