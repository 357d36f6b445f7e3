//! Summaries and question-answer pairs.
//!
//! Epistemic foundation:
//! - K_i: Prompts and sampling parameters come from the resolved snapshot
//! - B_i: The model returns parseable JSON (might not → empty chunk result)
//! - I^B: Endpoint failures propagate and fail only the current item

use super::{parse_qa_pairs, render_prompt, split_into_chunks, truncate_chars};
use crate::client::{ChatModel, ChatOptions};
use crate::models::{Message, QaPair, Result, StageConfig};
use std::sync::Arc;
use tracing::{debug, info};

/// Temperature used for summaries.
const SUMMARY_TEMPERATURE: f64 = 0.1;

/// Characters of the summary passed into each chunk prompt.
const SUMMARY_CONTEXT_CHARS: usize = 100;

/// Generates training content from document text with one chat model.
pub struct ContentGenerator {
    pub(super) model: Arc<dyn ChatModel>,
    pub(super) config: Arc<StageConfig>,
}

impl ContentGenerator {
    pub fn new(model: Arc<dyn ChatModel>, config: Arc<StageConfig>) -> Self {
        Self { model, config }
    }

    pub fn model_name(&self) -> &str {
        self.model.model()
    }

    pub(super) fn options(&self) -> ChatOptions {
        let generation = &self.config.generation;
        ChatOptions {
            temperature: generation.temperature,
            max_tokens: generation.max_tokens,
            top_p: Some(generation.top_p),
        }
    }

    /// Summarize a whole document.
    pub async fn generate_summary(&self, document_text: &str) -> Result<String> {
        let messages = vec![
            Message::system(&self.config.prompts.summary),
            Message::user(document_text),
        ];
        let options = ChatOptions {
            temperature: SUMMARY_TEMPERATURE,
            ..self.options()
        };

        let summary = self.model.chat(messages, &options).await?;
        debug!(chars = summary.len(), "Summary generated");
        Ok(summary.trim().to_string())
    }

    /// Generate up to `num_pairs` QA pairs, spread across the document's chunks.
    pub async fn generate_qa_pairs(
        &self,
        document_text: &str,
        summary: &str,
        num_pairs: usize,
    ) -> Result<Vec<QaPair>> {
        let generation = &self.config.generation;
        let chunks = split_into_chunks(document_text, generation.chunk_size, generation.overlap);
        if chunks.is_empty() || num_pairs == 0 {
            return Ok(Vec::new());
        }

        let pairs_per_chunk =
            ((num_pairs as f64 / chunks.len() as f64).round() as usize).max(1);
        let pairs_per_chunk_str = pairs_per_chunk.to_string();
        let summary_context = truncate_chars(summary, SUMMARY_CONTEXT_CHARS);

        info!(
            chunks = chunks.len(),
            pairs_per_chunk = pairs_per_chunk,
            target = num_pairs,
            "Generating QA pairs"
        );

        let options = self.options();
        let batch_size = generation.batch_size.max(1);
        let mut pairs = Vec::with_capacity(num_pairs);

        for (batch_index, batch) in chunks.chunks(batch_size).enumerate() {
            let requests: Vec<Vec<Message>> = batch
                .iter()
                .map(|chunk| {
                    vec![Message::system(render_prompt(
                        &self.config.prompts.qa_generation,
                        &[
                            ("num_pairs", pairs_per_chunk_str.as_str()),
                            ("summary", summary_context),
                            ("text", chunk.as_str()),
                        ],
                    ))]
                })
                .collect();

            let responses = self.model.batch_chat(requests, &options).await?;
            for response in responses {
                let parsed = parse_qa_pairs(&response);
                debug!(batch = batch_index, parsed = parsed.len(), "Chunk parsed");
                pairs.extend(parsed);
            }

            if pairs.len() >= num_pairs {
                break;
            }
        }

        pairs.truncate(num_pairs);
        info!(generated = pairs.len(), "QA generation finished");
        Ok(pairs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::testing::StubModel;
    use crate::models::{Config, Overrides};

    fn snapshot(chunk_size: usize, batch_size: usize) -> Arc<StageConfig> {
        let mut config = Config::default();
        config.generation.chunk_size = chunk_size;
        config.generation.batch_size = batch_size;
        Arc::new(StageConfig::resolve(&config, &Overrides::default()))
    }

    #[tokio::test]
    async fn test_summary_uses_summary_prompt() {
        let stub = Arc::new(StubModel::new(|messages| {
            assert_eq!(messages.len(), 2);
            assert_eq!(messages[0].role, "system");
            assert!(messages[0].content.starts_with("Summarize this document"));
            assert_eq!(messages[1].content, "Doc body.");
            Ok("  A short summary.  ".to_string())
        }));
        let generator = ContentGenerator::new(stub.clone(), snapshot(4000, 32));

        let summary = generator.generate_summary("Doc body.").await.unwrap();
        assert_eq!(summary, "A short summary.");
        assert_eq!(stub.calls(), 1);
    }

    #[tokio::test]
    async fn test_qa_pairs_capped_at_target() {
        // Three chunks, each answered with two pairs.
        let text = ["a".repeat(40), "b".repeat(40), "c".repeat(40)].join("\n\n");
        let stub = Arc::new(StubModel::new(|messages| {
            assert_eq!(messages.len(), 1);
            let prompt = &messages[0].content;
            assert!(prompt.starts_with("Create 1 question-answer pairs"));
            assert!(prompt.contains("Document summary: The summary"));
            Ok(r#"[{"question": "Q1?", "answer": "A1."}, {"question": "Q2?", "answer": "A2."}]"#.to_string())
        }));
        let generator = ContentGenerator::new(stub.clone(), snapshot(50, 2));

        let pairs = generator
            .generate_qa_pairs(&text, "The summary", 3)
            .await
            .unwrap();
        assert_eq!(pairs.len(), 3);
        // First batch (2 chunks) yields 4 pairs, so the third chunk is never sent.
        assert_eq!(stub.calls(), 2);
    }

    #[tokio::test]
    async fn test_unparseable_chunks_yield_no_pairs() {
        let stub = Arc::new(StubModel::fixed("Sorry, I can't do that."));
        let generator = ContentGenerator::new(stub, snapshot(4000, 32));

        let pairs = generator
            .generate_qa_pairs("Some text.", "summary", 5)
            .await
            .unwrap();
        assert!(pairs.is_empty());
    }

    #[tokio::test]
    async fn test_upstream_failure_propagates() {
        let stub = Arc::new(StubModel::new(|_| {
            Err(crate::models::UpstreamError::AuthenticationFailed.into())
        }));
        let generator = ContentGenerator::new(stub, snapshot(4000, 32));

        let err = generator
            .generate_qa_pairs("Some text.", "summary", 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::models::ErrorKind::Upstream);
    }
}
