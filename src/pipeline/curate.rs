//! Curate: rate generated QA pairs and keep the good ones.
//!
//! Epistemic foundation:
//! - K_i: Input must hold a non-empty `qa_pairs` array
//! - B_i: Rating responses parse (might not → batch skipped with a warning)
//! - I^B: Endpoint failures fail the current file only

use super::{read_json, run_directory, write_json, JSON_INPUT};
use crate::client::{ChatModel, ChatOptions};
use crate::generate::{file_stem, parse_ratings, render_prompt};
use crate::models::{
    CuratedDocument, CurationMetrics, Message, QaPair, Result, StageConfig, SynthkitError,
    DEFAULT_SYSTEM_PROMPT,
};
use crate::pool::{BatchOptions, BatchOutcome, ItemProcessor};
use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Driver for the curate stage.
#[derive(Clone)]
pub struct CurateStage {
    model: Arc<dyn ChatModel>,
    config: Arc<StageConfig>,
    threshold: f64,
}

impl CurateStage {
    /// `threshold` overrides `curate.threshold` when given.
    pub fn new(model: Arc<dyn ChatModel>, config: Arc<StageConfig>, threshold: Option<f64>) -> Self {
        let threshold = threshold.unwrap_or(config.curate.threshold);
        Self {
            model,
            config,
            threshold,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// `<stem>_cleaned.json` inside `output_dir`.
    pub fn output_path(input: &str, output_dir: &Path) -> PathBuf {
        output_dir.join(format!("{}_cleaned.json", file_stem(input)))
    }

    /// Curate one generated file and write the result to `output_path`.
    pub async fn process_one(&self, input: &str, output_path: &Path) -> Result<PathBuf> {
        JSON_INPUT.require(input)?;
        let value = read_json(input).await?;
        let (summary, pairs) = qa_input(value, input)?;

        let document = self.curate_pairs(summary, pairs).await?;
        info!(
            input = %input,
            kept = document.metrics.filtered,
            total = document.metrics.total,
            avg_score = document.metrics.avg_score,
            "Curated"
        );

        write_json(output_path, &document, self.config.format.pretty_json)?;
        Ok(output_path.to_path_buf())
    }

    /// Curate every `.json` file directly inside `dir` into `output_dir`.
    pub async fn process_many(&self, dir: &Path, output_dir: &Path, options: BatchOptions) -> Result<BatchOutcome> {
        let job = CurateJob {
            stage: self.clone(),
            output_dir: output_dir.to_path_buf(),
        };
        run_directory(dir, JSON_INPUT, job, options).await
    }

    /// Rate `pairs` in batches and keep those at or above the threshold.
    pub async fn curate_pairs(&self, summary: String, pairs: Vec<QaPair>) -> Result<CuratedDocument> {
        let curate = &self.config.curate;
        let options = ChatOptions {
            temperature: curate.temperature,
            max_tokens: self.config.generation.max_tokens,
            top_p: None,
        };

        let mut rated = Vec::with_capacity(pairs.len());
        for (batch_index, batch) in pairs.chunks(curate.batch_size.max(1)).enumerate() {
            let batch_json = serde_json::to_string_pretty(batch)
                .map_err(|e| SynthkitError::Internal(format!("Failed to encode pairs: {e}")))?;
            let prompt = render_prompt(&self.config.prompts.qa_rating, &[("pairs", batch_json.as_str())]);

            let response = self.model.chat(vec![Message::system(prompt)], &options).await?;
            match parse_ratings(&response, batch) {
                Ok(batch_rated) => {
                    debug!(batch = batch_index, rated = batch_rated.len(), "Batch rated");
                    rated.extend(batch_rated);
                }
                Err(e) => warn!(batch = batch_index, error = %e, "Skipping batch with unparseable ratings"),
            }
        }

        let filtered_pairs: Vec<QaPair> = rated
            .iter()
            .filter(|pair| pair.rating.is_some_and(|r| r >= self.threshold))
            .cloned()
            .collect();
        let metrics = CurationMetrics::compute(&rated, filtered_pairs.len(), pairs.len());
        let conversations = filtered_pairs
            .iter()
            .map(|pair| pair.to_conversation(DEFAULT_SYSTEM_PROMPT))
            .collect();

        Ok(CuratedDocument {
            summary,
            filtered_pairs,
            conversations,
            metrics,
        })
    }
}

/// Summary and pairs of a create `qa` output.
fn qa_input(value: Value, input: &str) -> Result<(String, Vec<QaPair>)> {
    let Value::Object(mut obj) = value else {
        return Err(SynthkitError::DataFormat(format!("Expected a JSON object in {input}")));
    };

    let pairs: Vec<QaPair> = match obj.remove("qa_pairs") {
        Some(pairs @ Value::Array(_)) => serde_json::from_value(pairs)
            .map_err(|e| SynthkitError::json(format!("Invalid qa_pairs in {input}"), e))?,
        _ => Vec::new(),
    };
    if pairs.is_empty() {
        return Err(SynthkitError::DataFormat(format!("No QA pairs found in {input}")));
    }

    let summary = obj
        .remove("summary")
        .and_then(|s| s.as_str().map(str::to_string))
        .unwrap_or_default();
    Ok((summary, pairs))
}

struct CurateJob {
    stage: CurateStage,
    output_dir: PathBuf,
}

#[async_trait]
impl ItemProcessor for CurateJob {
    async fn process(&self, input: &str) -> Result<PathBuf> {
        let output_path = CurateStage::output_path(input, &self.output_dir);
        self.stage.process_one(input, &output_path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::StubModel;
    use crate::models::{Config, ErrorKind, Overrides};
    use serde_json::json;
    use tempfile::TempDir;

    fn stage(stub: Arc<StubModel>, batch_size: usize) -> CurateStage {
        let mut config = Config::default();
        config.curate.batch_size = batch_size;
        CurateStage::new(
            stub,
            Arc::new(StageConfig::resolve(&config, &Overrides::default())),
            None,
        )
    }

    fn pairs(n: usize) -> Vec<QaPair> {
        (0..n).map(|i| QaPair::new(format!("Q{i}?"), format!("A{i}."))).collect()
    }

    #[tokio::test]
    async fn test_curate_pairs_filters_by_threshold() {
        let stub = Arc::new(StubModel::new(|messages| {
            assert!(messages[0].content.contains("\"question\": \"Q0?\""));
            Ok(r#"[{"rating": 9}, {"rating": 5}, {"rating": 7}]"#.to_string())
        }));

        let doc = stage(stub, 8)
            .curate_pairs("s".to_string(), pairs(3))
            .await
            .unwrap();

        assert_eq!(doc.filtered_pairs.len(), 2);
        assert_eq!(doc.conversations.len(), 2);
        assert_eq!(doc.conversations[0][0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(doc.metrics.total, 3);
        assert_eq!(doc.metrics.filtered, 2);
        assert_eq!(doc.metrics.avg_score, 7.0);
    }

    #[tokio::test]
    async fn test_unparseable_batch_is_skipped() {
        let stub = Arc::new(StubModel::new(|messages| {
            if messages[0].content.contains("Q0?") {
                Ok(r#"[{"rating": 8}]"#.to_string())
            } else {
                Ok("no idea".to_string())
            }
        }));

        let doc = stage(stub.clone(), 1)
            .curate_pairs(String::new(), pairs(2))
            .await
            .unwrap();

        assert_eq!(stub.calls(), 2);
        assert_eq!(doc.filtered_pairs.len(), 1);
        assert_eq!(doc.metrics.total, 2);
        assert_eq!(doc.metrics.retention_rate, 0.5);
    }

    #[tokio::test]
    async fn test_process_one_requires_qa_pairs() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("doc_summary.json");
        std::fs::write(&input, json!({"summary": "only"}).to_string()).unwrap();

        let err = stage(Arc::new(StubModel::fixed("[]")), 8)
            .process_one(&input.display().to_string(), &tmp.path().join("out.json"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DataFormat);
    }

    #[tokio::test]
    async fn test_process_one_rejects_non_json_input() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("notes.txt");
        std::fs::write(&input, "plain text").unwrap();
        let stub = Arc::new(StubModel::fixed("[]"));

        let err = stage(stub.clone(), 8)
            .process_one(&input.display().to_string(), &tmp.path().join("out.json"))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(stub.calls(), 0);
        assert!(!tmp.path().join("out.json").exists());
    }

    #[tokio::test]
    async fn test_process_many_writes_cleaned_files() {
        let tmp = TempDir::new().unwrap();
        let in_dir = tmp.path().join("generated");
        std::fs::create_dir(&in_dir).unwrap();
        let doc = json!({"summary": "s", "qa_pairs": [{"question": "Q0?", "answer": "A0."}]});
        std::fs::write(in_dir.join("a_qa_pairs.json"), doc.to_string()).unwrap();
        std::fs::write(in_dir.join("broken.json"), "{not json").unwrap();
        let out_dir = tmp.path().join("cleaned");

        let outcome = stage(Arc::new(StubModel::fixed(r#"[{"rating": 8}]"#)), 8)
            .process_many(&in_dir, &out_dir, BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.successes, vec![out_dir.join("a_qa_pairs_cleaned.json")]);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].kind, ErrorKind::DataFormat);

        let cleaned: CuratedDocument =
            serde_json::from_str(&std::fs::read_to_string(&outcome.successes[0]).unwrap()).unwrap();
        assert_eq!(cleaned.summary, "s");
        assert_eq!(cleaned.filtered_pairs[0].rating, Some(8.0));
    }
}
