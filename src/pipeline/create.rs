//! Create: text files → generated content JSON.
//!
//! Epistemic foundation:
//! - K_i: Content type is a closed enum, dispatched by match
//! - B_i: The endpoint answers (might not → Upstream, fails the item only)
//! - I^R: Counts fall back from `--num-pairs` to `[generation]`

use super::{read_json, read_text, run_directory, write_json};
use crate::generate::{conversations_from_input, file_stem, ContentGenerator, ContentType};
use crate::models::{
    ContentMetadata, CotDocument, EnhancedDocument, QaDocument, Result, StageConfig,
    SummaryDocument, SynthkitError,
};
use crate::pool::{BatchOptions, BatchOutcome, ItemProcessor};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Per-invocation parameters of the create stage.
#[derive(Debug, Clone, Copy)]
pub struct CreateParams {
    pub content_type: ContentType,
    /// Overrides the configured pair/example count
    pub num_pairs: Option<usize>,
}

/// Driver for the create stage.
#[derive(Clone)]
pub struct CreateStage {
    generator: Arc<ContentGenerator>,
    config: Arc<StageConfig>,
}

impl CreateStage {
    pub fn new(generator: Arc<ContentGenerator>, config: Arc<StageConfig>) -> Self {
        Self { generator, config }
    }

    /// `<stem><suffix>` inside `output_dir`.
    pub fn output_path(input: &str, output_dir: &Path, content_type: ContentType) -> PathBuf {
        output_dir.join(format!("{}{}", file_stem(input), content_type.output_suffix()))
    }

    /// Generate content for one input file.
    pub async fn process_one(&self, input: &str, output_dir: &Path, params: CreateParams) -> Result<PathBuf> {
        params.content_type.scan_criterion().require(input)?;
        let output_path = Self::output_path(input, output_dir, params.content_type);
        let metadata = self.metadata(input, params.content_type);
        let pretty = self.config.format.pretty_json;
        let generation = &self.config.generation;

        match params.content_type {
            ContentType::Qa => {
                let text = read_document(input).await?;
                let summary = self.generator.generate_summary(&text).await?;
                let num_pairs = params.num_pairs.unwrap_or(generation.num_pairs);
                let qa_pairs = self
                    .generator
                    .generate_qa_pairs(&text, &summary, num_pairs)
                    .await?;
                write_json(&output_path, &QaDocument { summary, qa_pairs, metadata }, pretty)?;
            }
            ContentType::Summary => {
                let text = read_document(input).await?;
                let summary = self.generator.generate_summary(&text).await?;
                write_json(&output_path, &SummaryDocument { summary, metadata }, pretty)?;
            }
            ContentType::Cot => {
                let text = read_document(input).await?;
                let summary = self.generator.generate_summary(&text).await?;
                let num_examples = params.num_pairs.unwrap_or(generation.num_cot_examples);
                let cot_examples = self.generator.generate_cot_examples(&text, num_examples).await?;
                let conversations = cot_examples.iter().map(|ex| ex.to_conversation()).collect();
                let document = CotDocument {
                    summary,
                    cot_examples,
                    conversations,
                    metadata,
                };
                write_json(&output_path, &document, pretty)?;
            }
            ContentType::CotEnhance => {
                let mut conversations = conversations_from_input(read_json(input).await?)?;
                if let Some(limit) = params.num_pairs.or(generation.num_cot_enhance_examples) {
                    conversations.truncate(limit);
                }
                let conversations = self.generator.enhance_conversations(conversations, false).await?;
                write_json(&output_path, &EnhancedDocument { conversations, metadata }, pretty)?;
            }
        }

        info!(
            input = %input,
            output = %output_path.display(),
            content_type = %params.content_type,
            "Content created"
        );
        Ok(output_path)
    }

    /// Generate content for every matching file directly inside `dir`.
    pub async fn process_many(
        &self,
        dir: &Path,
        output_dir: &Path,
        params: CreateParams,
        options: BatchOptions,
    ) -> Result<BatchOutcome> {
        let job = CreateJob {
            stage: self.clone(),
            output_dir: output_dir.to_path_buf(),
            params,
        };
        run_directory(dir, params.content_type.scan_criterion(), job, options).await
    }

    fn metadata(&self, input: &str, content_type: ContentType) -> Option<ContentMetadata> {
        self.config.format.include_metadata.then(|| ContentMetadata {
            source: input.to_string(),
            content_type: content_type.as_str().to_string(),
            model: self.generator.model_name().to_string(),
            generated_at: chrono::Utc::now(),
        })
    }
}

async fn read_document(input: &str) -> Result<String> {
    let text = read_text(input).await?;
    if text.trim().is_empty() {
        return Err(SynthkitError::Validation(format!("Input file is empty: {input}")));
    }
    Ok(text)
}

struct CreateJob {
    stage: CreateStage,
    output_dir: PathBuf,
    params: CreateParams,
}

#[async_trait]
impl ItemProcessor for CreateJob {
    async fn process(&self, input: &str) -> Result<PathBuf> {
        self.stage.process_one(input, &self.output_dir, self.params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::StubModel;
    use crate::models::{Config, ErrorKind, Overrides};
    use serde_json::{json, Value};
    use tempfile::TempDir;

    fn stage(stub: Arc<StubModel>, include_metadata: bool) -> CreateStage {
        let mut config = Config::default();
        config.format.include_metadata = include_metadata;
        let snapshot = Arc::new(StageConfig::resolve(&config, &Overrides::default()));
        let generator = Arc::new(ContentGenerator::new(stub, Arc::clone(&snapshot)));
        CreateStage::new(generator, snapshot)
    }

    /// Summary prompts get a summary; everything else gets pairs.
    fn qa_stub() -> Arc<StubModel> {
        Arc::new(StubModel::new(|messages| {
            if messages.len() == 2 {
                Ok("Doc summary.".to_string())
            } else {
                Ok(r#"[{"question": "Q?", "answer": "A."}]"#.to_string())
            }
        }))
    }

    fn read(path: &Path) -> Value {
        serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
    }

    #[tokio::test]
    async fn test_create_qa_document() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("report.txt");
        std::fs::write(&input, "Rust is a language.").unwrap();
        let params = CreateParams {
            content_type: ContentType::Qa,
            num_pairs: Some(1),
        };

        let output = stage(qa_stub(), true)
            .process_one(&input.display().to_string(), tmp.path(), params)
            .await
            .unwrap();

        assert_eq!(output, tmp.path().join("report_qa_pairs.json"));
        let doc = read(&output);
        assert_eq!(doc["summary"], "Doc summary.");
        assert_eq!(doc["qa_pairs"][0]["question"], "Q?");
        assert_eq!(doc["metadata"]["content_type"], "qa");
        assert_eq!(doc["metadata"]["model"], "stub-model");
    }

    #[tokio::test]
    async fn test_create_summary_without_metadata() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("report.txt");
        std::fs::write(&input, "Rust is a language.").unwrap();
        let params = CreateParams {
            content_type: ContentType::Summary,
            num_pairs: None,
        };

        let output = stage(qa_stub(), false)
            .process_one(&input.display().to_string(), tmp.path(), params)
            .await
            .unwrap();

        let doc = read(&output);
        assert_eq!(doc, json!({"summary": "Doc summary."}));
    }

    #[tokio::test]
    async fn test_create_cot_enhance_respects_limit() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("chats.json");
        let conversation = json!([
            {"role": "user", "content": "q"},
            {"role": "assistant", "content": "a"}
        ]);
        let records: Vec<Value> = (0..3).map(|_| json!({"conversations": conversation})).collect();
        std::fs::write(&input, Value::Array(records).to_string()).unwrap();
        let params = CreateParams {
            content_type: ContentType::CotEnhance,
            num_pairs: Some(2),
        };

        let output = stage(Arc::new(StubModel::fixed("unparseable")), false)
            .process_one(&input.display().to_string(), tmp.path(), params)
            .await
            .unwrap();

        assert_eq!(output, tmp.path().join("chats_enhanced.json"));
        assert_eq!(read(&output)["conversations"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_create_single_conversation_object() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("chat.json");
        let record = json!({"conversations": [
            {"role": "system", "content": "s"},
            {"role": "user", "content": "q"},
            {"role": "assistant", "content": "a"}
        ]});
        std::fs::write(&input, record.to_string()).unwrap();
        let params = CreateParams {
            content_type: ContentType::CotEnhance,
            num_pairs: None,
        };

        let output = stage(Arc::new(StubModel::fixed("unparseable")), false)
            .process_one(&input.display().to_string(), tmp.path(), params)
            .await
            .unwrap();

        let conversations = read(&output)["conversations"].as_array().unwrap().clone();
        assert_eq!(conversations.len(), 1);
        assert_eq!(conversations[0].as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_create_rejects_unsupported_input() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("report.pdf");
        std::fs::write(&input, "%PDF-1.4").unwrap();
        let stub = qa_stub();
        let params = CreateParams {
            content_type: ContentType::Qa,
            num_pairs: Some(1),
        };

        let err = stage(stub.clone(), false)
            .process_one(&input.display().to_string(), tmp.path(), params)
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains(".txt"));
        assert_eq!(stub.calls(), 0);
        assert!(!tmp.path().join("report_qa_pairs.json").exists());
    }

    #[tokio::test]
    async fn test_create_batch_isolates_failures() {
        let tmp = TempDir::new().unwrap();
        let in_dir = tmp.path().join("parsed");
        std::fs::create_dir(&in_dir).unwrap();
        std::fs::write(in_dir.join("a.txt"), "Alpha text.").unwrap();
        std::fs::write(in_dir.join("b.txt"), "   ").unwrap();
        std::fs::write(in_dir.join("c.txt"), "Gamma text.").unwrap();
        let out_dir = tmp.path().join("generated");
        let params = CreateParams {
            content_type: ContentType::Qa,
            num_pairs: Some(1),
        };

        let outcome = stage(qa_stub(), false)
            .process_many(&in_dir, &out_dir, params, BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.successes.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert!(outcome.failures[0].input.ends_with("b.txt"));
        assert_eq!(outcome.failures[0].kind, ErrorKind::Validation);
        assert!(out_dir.join("a_qa_pairs.json").exists());
    }
}
