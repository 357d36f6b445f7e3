//! Chain-of-thought examples and reasoning enhancement of conversations.

use super::{extract_json_from_text, render_prompt, ContentGenerator};
use crate::models::{Conversation, CotExample, Message, Result, SynthkitError};
use serde_json::Value;
use tracing::{debug, info, warn};

impl ContentGenerator {
    /// Ask for `num_examples` reasoning examples over the document.
    pub async fn generate_cot_examples(
        &self,
        document_text: &str,
        num_examples: usize,
    ) -> Result<Vec<CotExample>> {
        let prompt = render_prompt(
            &self.config.prompts.cot_generation,
            &[
                ("num_examples", num_examples.to_string().as_str()),
                ("text", document_text),
            ],
        );

        let response = self
            .model
            .chat(vec![Message::system(prompt)], &self.options())
            .await?;

        let examples = parse_cot_examples(&response);
        if examples.is_empty() {
            warn!("No chain-of-thought examples could be parsed from the response");
        }
        info!(generated = examples.len(), requested = num_examples, "CoT generation finished");
        Ok(examples)
    }

    /// Add step-by-step reasoning to assistant turns, one request per batch.
    ///
    /// A batch whose response cannot be parsed keeps its original conversations.
    pub async fn enhance_conversations(
        &self,
        conversations: Vec<Conversation>,
        include_simple_steps: bool,
    ) -> Result<Vec<Conversation>> {
        let batch_size = self.config.generation.batch_size.max(1);
        let include = include_simple_steps.to_string();
        let options = self.options();
        let mut enhanced = Vec::with_capacity(conversations.len());

        for (batch_index, batch) in conversations.chunks(batch_size).enumerate() {
            let batch_json = serde_json::to_string_pretty(batch)
                .map_err(|e| SynthkitError::Internal(format!("Failed to encode conversations: {e}")))?;
            let prompt = render_prompt(
                &self.config.prompts.cot_enhancement,
                &[
                    ("conversations", batch_json.as_str()),
                    ("include_simple_steps", include.as_str()),
                ],
            );

            let response = self
                .model
                .chat(vec![Message::system(prompt)], &options)
                .await?;

            match parse_conversations(&response) {
                Some(parsed) if !parsed.is_empty() => {
                    debug!(batch = batch_index, conversations = parsed.len(), "Batch enhanced");
                    enhanced.extend(parsed);
                }
                _ => {
                    warn!(batch = batch_index, "Could not parse enhanced conversations, keeping originals");
                    enhanced.extend_from_slice(batch);
                }
            }
        }

        Ok(enhanced)
    }
}

/// `{question, reasoning, answer}` objects from a model response.
pub fn parse_cot_examples(text: &str) -> Vec<CotExample> {
    let items = match extract_json_from_text(text) {
        Some(Value::Array(items)) => items,
        Some(obj @ Value::Object(_)) => vec![obj],
        _ => return Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| serde_json::from_value::<CotExample>(item).ok())
        .filter(|ex| !ex.question.trim().is_empty())
        .collect()
}

/// Conversations from a model response: a list of message lists, or a
/// single message list.
pub fn parse_conversations(text: &str) -> Option<Vec<Conversation>> {
    let Value::Array(items) = extract_json_from_text(text)? else {
        return None;
    };

    if items.iter().all(Value::is_array) {
        items
            .into_iter()
            .map(|conv| serde_json::from_value::<Conversation>(conv).ok())
            .collect()
    } else {
        serde_json::from_value::<Conversation>(Value::Array(items))
            .ok()
            .map(|conv| vec![conv])
    }
}

/// Conversations held by a cot-enhance input file.
///
/// Accepted shapes: `{"conversations": [messages]}` (one conversation), an
/// array of such objects, or a bare array of messages. A `conversations`
/// field holding a list of message lists is also read.
pub fn conversations_from_input(value: Value) -> Result<Vec<Conversation>> {
    let shape_error =
        || SynthkitError::DataFormat("Expected conversations in the input file".to_string());

    match value {
        Value::Object(mut obj) => {
            let field = obj.remove("conversations").ok_or_else(shape_error)?;
            conversations_field(field)
        }
        Value::Array(items) if items.iter().all(Value::is_object) && !items.is_empty() => {
            if items.iter().all(|item| item.get("conversations").is_some()) {
                let mut all = Vec::new();
                for item in items {
                    all.extend(conversations_from_input(item)?);
                }
                Ok(all)
            } else {
                serde_json::from_value::<Conversation>(Value::Array(items))
                    .map(|conv| vec![conv])
                    .map_err(|e| SynthkitError::json("Invalid message list", e))
            }
        }
        _ => Err(shape_error()),
    }
}

/// One message list, or a list of message lists (an empty list holds none).
fn conversations_field(field: Value) -> Result<Vec<Conversation>> {
    let nested = matches!(&field, Value::Array(items) if items.iter().all(Value::is_array));
    if nested {
        serde_json::from_value::<Vec<Conversation>>(field)
            .map_err(|e| SynthkitError::json("Invalid conversations", e))
    } else {
        serde_json::from_value::<Conversation>(field)
            .map(|conv| vec![conv])
            .map_err(|e| SynthkitError::json("Invalid conversation", e))
    }
}
