//! Concurrent query dispatch.
//!
//! One query per test case, at most `concurrency` in flight. Results are
//! written into a slot per original position, so the returned order always
//! matches the input order whatever order the queries finish in.

use crate::dataset::TestCase;
use crate::rag::{QueryResult, RagBackend, ResponseNormalizer};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Options for query dispatch.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Maximum number of queries in flight.
    pub concurrency: usize,
    /// Per-query timeout.
    pub timeout: Duration,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            concurrency: 2,
            timeout: Duration::from_secs(30),
        }
    }
}

/// Issues test-case queries against a RAG backend.
pub struct QueryDispatcher<B> {
    backend: Arc<B>,
    normalizer: Arc<ResponseNormalizer>,
    options: DispatchOptions,
}

impl<B: RagBackend> QueryDispatcher<B> {
    /// Create a dispatcher.
    pub fn new(backend: Arc<B>, normalizer: ResponseNormalizer, options: DispatchOptions) -> Self {
        Self {
            backend,
            normalizer: Arc::new(normalizer),
            options,
        }
    }

    /// Query every case and return one result per case, in input order.
    ///
    /// Never fails: a case whose query errors or times out gets an empty result.
    pub async fn dispatch(&self, cases: &[TestCase]) -> Vec<QueryResult> {
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let mut tasks = JoinSet::new();

        info!(
            cases = cases.len(),
            concurrency = self.options.concurrency,
            "dispatching queries"
        );

        for (index, case) in cases.iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let backend = Arc::clone(&self.backend);
            let normalizer = Arc::clone(&self.normalizer);
            let question = case.question.clone();
            let timeout = self.options.timeout;

            tasks.spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return (index, QueryResult::empty());
                };
                let result = query_one(backend.as_ref(), &normalizer, index, &question, timeout).await;
                (index, result)
            });
        }

        let mut slots: Vec<Option<QueryResult>> = vec![None; cases.len()];
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => error!(error = %e, "query task aborted; its case is recorded as empty"),
            }
        }

        let results: Vec<QueryResult> = slots
            .into_iter()
            .map(Option::unwrap_or_default)
            .collect();

        warn_if_mostly_empty(&results);
        results
    }
}

/// Run one query with a timeout and normalize the response.
async fn query_one<B: RagBackend>(
    backend: &B,
    normalizer: &ResponseNormalizer,
    index: usize,
    question: &str,
    timeout: Duration,
) -> QueryResult {
    let preview: String = question.chars().take(50).collect();
    debug!(case = index + 1, question = %preview, "querying");

    match tokio::time::timeout(timeout, backend.query(question)).await {
        Ok(Ok(response)) => {
            let result = normalizer.normalize(&response).await;
            debug!(
                case = index + 1,
                references = result.references.len(),
                "query completed"
            );
            result
        }
        Ok(Err(e)) => {
            warn!(case = index + 1, error = %e, "query failed");
            QueryResult::empty()
        }
        Err(_) => {
            warn!(case = index + 1, timeout = ?timeout, "query timed out");
            QueryResult::empty()
        }
    }
}

/// Log loudly when more than half the cases came back without references.
fn warn_if_mostly_empty(results: &[QueryResult]) {
    let empty = results.iter().filter(|r| r.references.is_empty()).count();
    info!(
        total = results.len(),
        empty_contexts = empty,
        "query processing completed"
    );

    if empty * 2 > results.len() {
        error!(
            empty_contexts = empty,
            total = results.len(),
            "most questions returned no references; retrieval looks broken"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{EvalError, Result};
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers each question with itself after a question-dependent delay.
    #[derive(Default)]
    struct EchoEngine {
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl RagBackend for EchoEngine {
        async fn query(&self, question: &str) -> Result<Value> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);

            let delay = match question {
                "slow" => Duration::from_secs(10),
                "fail" => {
                    self.in_flight.fetch_sub(1, Ordering::SeqCst);
                    return Err(EvalError::RagApi("Query failed (500): boom".to_string()));
                }
                q => Duration::from_millis(5 * (q.len() as u64 % 7)),
            };
            tokio::time::sleep(delay).await;

            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(json!({
                "response": format!("answer to {}", question),
                "references": [{"file_path": format!("{}.md", question), "content": "ctx"}]
            }))
        }

        async fn ingest(&self, _file_source: &str, _content: String) -> Result<()> {
            Ok(())
        }
    }

    fn cases(questions: &[&str]) -> Vec<TestCase> {
        questions
            .iter()
            .map(|q| TestCase::new(*q, vec![], vec![]))
            .collect()
    }

    fn dispatcher(engine: Arc<EchoEngine>, concurrency: usize, timeout: Duration) -> QueryDispatcher<EchoEngine> {
        QueryDispatcher::new(
            engine,
            ResponseNormalizer::default(),
            DispatchOptions {
                concurrency,
                timeout,
            },
        )
    }

    #[tokio::test]
    async fn test_order_preserved_and_concurrency_bounded() {
        let engine = Arc::new(EchoEngine::default());
        let questions = [
            "a", "bbbbbb", "cc", "ddddd", "e", "ffff", "ggggggg", "hh", "iii", "j",
        ];
        let dispatcher = dispatcher(engine.clone(), 3, Duration::from_secs(5));

        let results = dispatcher.dispatch(&cases(&questions)).await;

        assert_eq!(results.len(), questions.len());
        for (question, result) in questions.iter().zip(&results) {
            assert_eq!(result.answer, format!("answer to {}", question));
        }
        let max = engine.max_in_flight.load(Ordering::SeqCst);
        assert!(max >= 1 && max <= 3, "max in flight was {}", max);
    }

    #[tokio::test]
    async fn test_failure_and_timeout_degrade_to_empty() {
        let engine = Arc::new(EchoEngine::default());
        let dispatcher = dispatcher(engine, 4, Duration::from_millis(200));

        let results = dispatcher
            .dispatch(&cases(&["first", "slow", "fail", "last"]))
            .await;

        assert_eq!(results.len(), 4);
        assert_eq!(results[0].answer, "answer to first");
        assert!(results[1].is_empty());
        assert!(results[2].is_empty());
        assert_eq!(results[3].answer, "answer to last");
        assert_eq!(results[3].references.len(), 1);
    }

    #[tokio::test]
    async fn test_empty_input() {
        let dispatcher = dispatcher(Arc::new(EchoEngine::default()), 2, Duration::from_secs(1));
        assert!(dispatcher.dispatch(&[]).await.is_empty());
    }
}
