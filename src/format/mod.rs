//! Conversion of curated QA pairs into fine-tuning formats.
//!
//! Epistemic foundation:
//! - K_i: Format and storage tags are closed enums, parsed once at the CLI
//! - B_i: Input files hold one of the known shapes (might not → DataFormat)
//! - I^R: Pretty-printing comes from `[format]` in the config

mod hf;

pub use hf::*;

use crate::models::{QaPair, Result, SynthkitError};
use serde_json::{json, Value};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::debug;

/// System prompt for the `ft` format.
pub const FT_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// System prompt for the `chatml` format.
pub const CHATML_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";

/// Shape of each converted record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum FormatKind {
    /// One `{question, answer}` object per line
    Jsonl,
    /// `{instruction, input, output}` records
    Alpaca,
    /// OpenAI fine-tuning `{messages}` records
    Ft,
    /// `{messages}` records, one per line
    #[value(name = "chatml")]
    ChatMl,
}

impl FormatKind {
    pub const ALL: [FormatKind; 4] = [
        FormatKind::Jsonl,
        FormatKind::Alpaca,
        FormatKind::Ft,
        FormatKind::ChatMl,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FormatKind::Jsonl => "jsonl",
            FormatKind::Alpaca => "alpaca",
            FormatKind::Ft => "ft",
            FormatKind::ChatMl => "chatml",
        }
    }

    /// Whether a JSON-storage file holds one record per line.
    pub fn is_line_delimited(&self) -> bool {
        matches!(self, FormatKind::Jsonl | FormatKind::ChatMl)
    }

    /// Convert pairs into this format's records.
    pub fn records(&self, pairs: &[QaPair]) -> Vec<Value> {
        pairs.iter().map(|pair| self.record(pair)).collect()
    }

    fn record(&self, pair: &QaPair) -> Value {
        match self {
            FormatKind::Jsonl => json!(pair),
            FormatKind::Alpaca => json!({
                "instruction": pair.question,
                "input": "",
                "output": pair.answer,
            }),
            FormatKind::Ft => messages_record(FT_SYSTEM_PROMPT, pair),
            FormatKind::ChatMl => messages_record(CHATML_SYSTEM_PROMPT, pair),
        }
    }
}

fn messages_record(system_prompt: &str, pair: &QaPair) -> Value {
    json!({ "messages": pair.to_conversation(system_prompt) })
}

fn supported_tags<T: Copy>(all: &[T], tag: impl Fn(T) -> &'static str) -> String {
    all.iter().map(|v| tag(*v)).collect::<Vec<_>>().join(", ")
}

impl std::fmt::Display for FormatKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FormatKind {
    type Err = SynthkitError;

    fn from_str(s: &str) -> Result<Self> {
        FormatKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                SynthkitError::Validation(format!(
                    "Unknown format '{s}'. Supported formats: {}",
                    supported_tags(&FormatKind::ALL, |k| k.as_str())
                ))
            })
    }
}

/// How converted records are stored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum StorageKind {
    /// A single JSON or JSON Lines file
    #[default]
    Json,
    /// A Hugging Face style dataset directory
    Hf,
}

impl StorageKind {
    pub const ALL: [StorageKind; 2] = [StorageKind::Json, StorageKind::Hf];

    pub fn as_str(&self) -> &'static str {
        match self {
            StorageKind::Json => "json",
            StorageKind::Hf => "hf",
        }
    }
}

impl std::fmt::Display for StorageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StorageKind {
    type Err = SynthkitError;

    fn from_str(s: &str) -> Result<Self> {
        StorageKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| {
                SynthkitError::Validation(format!(
                    "Unknown storage '{s}'. Supported storage: {}",
                    supported_tags(&StorageKind::ALL, |k| k.as_str())
                ))
            })
    }
}

/// Pull QA pairs out of a curated (or generated) document.
///
/// Accepted shapes, in order: `{"qa_pairs": [...]}`, `{"filtered_pairs": [...]}`,
/// `{"conversations": [[system, user, assistant], ...]}`, or a bare array of
/// `{question, answer}` objects.
pub fn load_pairs(value: Value) -> Result<Vec<QaPair>> {
    let unrecognized = || {
        SynthkitError::DataFormat(
            "Unrecognized data format: expected qa_pairs, filtered_pairs, conversations or a list of question/answer objects"
                .to_string(),
        )
    };

    match value {
        Value::Object(mut obj) => {
            if let Some(pairs) = obj.remove("qa_pairs") {
                return serde_json::from_value(pairs).map_err(|e| SynthkitError::json("Invalid qa_pairs", e));
            }
            if let Some(pairs) = obj.remove("filtered_pairs") {
                return serde_json::from_value(pairs)
                    .map_err(|e| SynthkitError::json("Invalid filtered_pairs", e));
            }
            match obj.remove("conversations") {
                Some(Value::Array(convs)) => Ok(convs.iter().filter_map(pair_from_conversation).collect()),
                _ => Err(unrecognized()),
            }
        }
        Value::Array(items)
            if items
                .iter()
                .all(|item| item.get("question").is_some() && item.get("answer").is_some()) =>
        {
            serde_json::from_value(Value::Array(items)).map_err(|e| SynthkitError::json("Invalid pair list", e))
        }
        _ => Err(unrecognized()),
    }
}

/// User and assistant turns of a `[system, user, assistant]` conversation.
fn pair_from_conversation(conv: &Value) -> Option<QaPair> {
    let turns = conv.as_array()?;
    if turns.len() < 3 {
        return None;
    }
    let question = turns[1].get("content")?.as_str()?;
    let answer = turns[2].get("content")?.as_str()?;
    Some(QaPair::new(question, answer))
}

/// Output location for one input file.
///
/// Json storage: `<stem>.jsonl` (jsonl), `<stem>_chatml.jsonl` (chatml) or
/// `<stem>_<format>.json`. Hf storage: the directory `<stem>_<format>_hf`.
pub fn output_path(stem: &str, output_dir: &Path, format: FormatKind, storage: StorageKind) -> PathBuf {
    let name = match (storage, format) {
        (StorageKind::Hf, _) => format!("{stem}_{format}_hf"),
        (StorageKind::Json, FormatKind::Jsonl) => format!("{stem}.jsonl"),
        (StorageKind::Json, FormatKind::ChatMl) => format!("{stem}_chatml.jsonl"),
        (StorageKind::Json, _) => format!("{stem}_{format}.json"),
    };
    output_dir.join(name)
}

/// Write `pairs` converted to `format` at `output`, using the given storage.
pub fn write_pairs(
    pairs: &[QaPair],
    format: FormatKind,
    storage: StorageKind,
    output: &Path,
    pretty: bool,
) -> Result<PathBuf> {
    let records = format.records(pairs);
    match storage {
        StorageKind::Json if format.is_line_delimited() => write_jsonl(&records, output)?,
        StorageKind::Json => write_json_array(&records, output, pretty)?,
        StorageKind::Hf => write_hf_dataset(&records, format, output)?,
    }
    debug!(output = %output.display(), records = records.len(), %format, %storage, "Converted");
    Ok(output.to_path_buf())
}

fn create_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .map_err(|e| SynthkitError::io(format!("creating {}", parent.display()), e)),
        _ => Ok(()),
    }
}

/// One JSON value per line.
pub fn write_jsonl(records: &[Value], path: &Path) -> Result<()> {
    create_parent(path)?;
    let file = File::create(path).map_err(|e| SynthkitError::io(format!("creating {}", path.display()), e))?;
    let mut writer = BufWriter::new(file);

    for record in records {
        let line = serde_json::to_string(record)
            .map_err(|e| SynthkitError::Internal(format!("Failed to serialize record: {e}")))?;
        writeln!(writer, "{line}").map_err(|e| SynthkitError::io("writing output", e))?;
    }

    writer.flush().map_err(|e| SynthkitError::io("flushing output", e))
}

fn write_json_array(records: &[Value], path: &Path, pretty: bool) -> Result<()> {
    create_parent(path)?;
    let text = if pretty {
        serde_json::to_string_pretty(records)
    } else {
        serde_json::to_string(records)
    }
    .map_err(|e| SynthkitError::Internal(format!("Failed to serialize records: {e}")))?;

    std::fs::write(path, text).map_err(|e| SynthkitError::io(format!("writing {}", path.display()), e))
}
