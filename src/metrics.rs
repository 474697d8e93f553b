//! Model-graded semantic metrics.
//!
//! The pipeline hands the whole batch of `(question, answer, contexts,
//! ground_truth)` samples to a [`SemanticScorer`] once per run. A scorer that
//! fails never fails the run: [`score_or_zero`] substitutes all-zero scores.

use crate::error::{EvalError, Result};
use crate::llm::LlmClient;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::{info, warn};

/// One sample handed to a semantic scorer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSample {
    pub question: String,
    pub answer: String,
    pub contexts: Vec<String>,
    pub ground_truth: String,
}

/// Mean scores over a batch, each in `[0, 1]`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SemanticScores {
    pub faithfulness: f64,
    pub answer_relevancy: f64,
    pub context_recall: f64,
    pub context_precision: f64,
}

impl SemanticScores {
    /// Scores reported when the scorer fails.
    pub fn zero() -> Self {
        Self::default()
    }

    fn clamped(self) -> Self {
        Self {
            faithfulness: self.faithfulness.clamp(0.0, 1.0),
            answer_relevancy: self.answer_relevancy.clamp(0.0, 1.0),
            context_recall: self.context_recall.clamp(0.0, 1.0),
            context_precision: self.context_precision.clamp(0.0, 1.0),
        }
    }

    /// Mean of per-sample scores, rounded to four decimals.
    pub fn mean(scores: &[SemanticScores]) -> Self {
        if scores.is_empty() {
            return Self::zero();
        }

        let n = scores.len() as f64;
        let avg = |f: fn(&SemanticScores) -> f64| {
            let mean = scores.iter().map(f).sum::<f64>() / n;
            (mean * 10_000.0).round() / 10_000.0
        };

        Self {
            faithfulness: avg(|s| s.faithfulness),
            answer_relevancy: avg(|s| s.answer_relevancy),
            context_recall: avg(|s| s.context_recall),
            context_precision: avg(|s| s.context_precision),
        }
    }
}

/// Scores a batch of samples with model-graded metrics.
pub trait SemanticScorer: Send + Sync {
    fn score_batch(
        &self,
        samples: &[MetricSample],
    ) -> impl Future<Output = Result<SemanticScores>> + Send;
}

/// Run a scorer, falling back to zero scores on any failure.
pub async fn score_or_zero<S: SemanticScorer>(scorer: &S, samples: &[MetricSample]) -> SemanticScores {
    info!(samples = samples.len(), "starting semantic metric calculation");
    match scorer.score_batch(samples).await {
        Ok(scores) => scores,
        Err(e) => {
            warn!(error = %e, "semantic scoring failed; reporting zero scores");
            SemanticScores::zero()
        }
    }
}

const JUDGE_SYSTEM_PROMPT: &str = "You are a strict evaluator of retrieval-augmented generation output. \
Score every metric as a number between 0 and 1. Respond with JSON only.";

/// LLM-as-judge implementation of [`SemanticScorer`].
///
/// Each sample is graded by one chat completion; the batch fails on the first
/// sample that cannot be graded.
pub struct LlmJudgeScorer {
    client: LlmClient,
}

impl LlmJudgeScorer {
    /// Create a new judge with the given LLM client.
    pub fn new(client: LlmClient) -> Self {
        Self { client }
    }

    fn build_prompt(sample: &MetricSample) -> String {
        let contexts = if sample.contexts.is_empty() {
            "(no contexts retrieved)".to_string()
        } else {
            sample
                .contexts
                .iter()
                .enumerate()
                .map(|(i, c)| format!("[{}] {}", i + 1, c))
                .collect::<Vec<_>>()
                .join("\n\n")
        };

        format!(
            r#"Question: {}

Retrieved Contexts:
{}

Answer: {}

Ground Truth: {}

Rate the following, each from 0 to 1:
- faithfulness: share of the answer's claims supported by the contexts
- answer_relevancy: how directly the answer addresses the question
- context_recall: share of the ground truth recoverable from the contexts
- context_precision: share of the contexts that are relevant to the question

Respond in JSON format:
{{"faithfulness": <0-1>, "answer_relevancy": <0-1>, "context_recall": <0-1>, "context_precision": <0-1>}}"#,
            sample.question, contexts, sample.answer, sample.ground_truth
        )
    }

    /// Parse a judge response into clamped scores.
    fn parse_scores(response: &str) -> Result<SemanticScores> {
        let json_str = extract_json(response);
        let scores: SemanticScores = serde_json::from_str(&json_str).map_err(|e| {
            EvalError::LlmParse(format!(
                "Failed to parse judge response: {}. Response: {}",
                e,
                response.chars().take(200).collect::<String>()
            ))
        })?;
        Ok(scores.clamped())
    }

    async fn score_sample(&self, sample: &MetricSample) -> Result<SemanticScores> {
        let prompt = Self::build_prompt(sample);
        let response = self
            .client
            .complete_json(JUDGE_SYSTEM_PROMPT, &prompt)
            .await?;
        Self::parse_scores(&response)
    }
}

impl SemanticScorer for LlmJudgeScorer {
    async fn score_batch(&self, samples: &[MetricSample]) -> Result<SemanticScores> {
        let mut per_sample = Vec::with_capacity(samples.len());
        for sample in samples {
            per_sample.push(self.score_sample(sample).await?);
        }
        Ok(SemanticScores::mean(&per_sample))
    }
}

/// Extract a JSON object from a model response that may be fenced or chatty.
fn extract_json(response: &str) -> String {
    let response = response.trim();

    if let Some(rest) = response.strip_prefix("```json") {
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
    }

    if response.starts_with("```") {
        if let Some(end) = response.rfind("```") {
            let start = response.find('\n').map(|n| n + 1).unwrap_or(3);
            if end > start {
                return response[start..end].trim().to_string();
            }
        }
    }

    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return response[start..=end].to_string();
            }
        }
    }

    response.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingScorer;

    impl SemanticScorer for FailingScorer {
        async fn score_batch(&self, _samples: &[MetricSample]) -> Result<SemanticScores> {
            Err(EvalError::LlmApi("unavailable".to_string()))
        }
    }

    #[test]
    fn test_parse_scores_clamps() {
        let response = r#"```json
{"faithfulness": 1.3, "answer_relevancy": 0.5, "context_recall": -0.2, "context_precision": 0.75}
```"#;
        let scores = LlmJudgeScorer::parse_scores(response).unwrap();
        assert_eq!(scores.faithfulness, 1.0);
        assert_eq!(scores.answer_relevancy, 0.5);
        assert_eq!(scores.context_recall, 0.0);
        assert_eq!(scores.context_precision, 0.75);
    }

    #[test]
    fn test_parse_scores_rejects_garbage() {
        assert!(LlmJudgeScorer::parse_scores("I cannot grade this.").is_err());
    }

    #[test]
    fn test_extract_json_from_chatty_response() {
        let extracted = extract_json("Sure! {\"faithfulness\": 1} Hope that helps.");
        assert_eq!(extracted, "{\"faithfulness\": 1}");
    }

    #[test]
    fn test_mean_rounds_to_four_decimals() {
        let a = SemanticScores {
            faithfulness: 1.0,
            answer_relevancy: 0.0,
            context_recall: 0.5,
            context_precision: 1.0,
        };
        let b = SemanticScores {
            faithfulness: 0.0,
            answer_relevancy: 0.33333,
            context_recall: 0.5,
            context_precision: 0.0,
        };
        let mean = SemanticScores::mean(&[a, b]);
        assert_eq!(mean.faithfulness, 0.5);
        assert_eq!(mean.answer_relevancy, 0.1667);
        assert_eq!(mean.context_recall, 0.5);
        assert_eq!(SemanticScores::mean(&[]), SemanticScores::zero());
    }

    #[test]
    fn test_prompt_mentions_missing_contexts() {
        let sample = MetricSample {
            question: "q".to_string(),
            answer: "a".to_string(),
            contexts: vec![],
            ground_truth: "gt".to_string(),
        };
        assert!(LlmJudgeScorer::build_prompt(&sample).contains("(no contexts retrieved)"));
    }

    #[tokio::test]
    async fn test_failure_falls_back_to_zero() {
        let scores = score_or_zero(&FailingScorer, &[]).await;
        assert_eq!(scores, SemanticScores::zero());
    }
}
