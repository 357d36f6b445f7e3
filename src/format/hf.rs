//! Hugging Face style dataset directories.
//!
//! Layout: a single JSON Lines shard plus `dataset_info.json` and
//! `state.json`, loadable with `datasets.load_dataset("json", ...)`.

use super::{write_jsonl, FormatKind};
use crate::models::{Result, SynthkitError};
use serde_json::{json, Map, Value};
use std::path::Path;

/// File name of the only data shard.
pub const HF_DATA_FILE: &str = "data-00000-of-00001.jsonl";

const SPLIT: &str = "train";

/// Write `records` as a dataset directory at `dir`.
pub fn write_hf_dataset(records: &[Value], format: FormatKind, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| SynthkitError::io(format!("creating {}", dir.display()), e))?;

    write_jsonl(records, &dir.join(HF_DATA_FILE))?;

    let features = records.first().map(feature_schema).unwrap_or_else(|| json!({}));
    let info = json!({
        "builder_name": "json",
        "description": format!("synthkit {format} dataset"),
        "features": features,
        "splits": {
            SPLIT: { "name": SPLIT, "num_examples": records.len() }
        },
        "num_rows": records.len(),
    });
    let state = json!({
        "_data_files": [{ "filename": HF_DATA_FILE }],
        "_fingerprint": uuid::Uuid::new_v4().simple().to_string(),
        "_format_type": Value::Null,
        "_split": SPLIT,
    });

    write_pretty(&dir.join("dataset_info.json"), &info)?;
    write_pretty(&dir.join("state.json"), &state)
}

fn write_pretty(path: &Path, value: &Value) -> Result<()> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| SynthkitError::Internal(format!("Failed to serialize {}: {e}", path.display())))?;
    std::fs::write(path, text).map_err(|e| SynthkitError::io(format!("writing {}", path.display()), e))
}

/// `datasets` feature description inferred from a sample record.
pub fn feature_schema(sample: &Value) -> Value {
    let scalar = |dtype: &str| json!({ "dtype": dtype, "_type": "Value" });

    match sample {
        Value::String(_) | Value::Null => scalar("string"),
        Value::Bool(_) => scalar("bool"),
        Value::Number(n) if n.is_f64() => scalar("float64"),
        Value::Number(_) => scalar("int64"),
        Value::Array(items) => {
            let inner = items.first().map(feature_schema).unwrap_or_else(|| scalar("string"));
            json!([inner])
        }
        Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.clone(), feature_schema(value)))
                .collect::<Map<String, Value>>(),
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::QaPair;
    use tempfile::TempDir;

    #[test]
    fn test_feature_schema_for_messages() {
        let record = &FormatKind::ChatMl.records(&[QaPair::new("q", "a")])[0];
        let schema = feature_schema(record);
        assert_eq!(schema["messages"][0]["role"]["dtype"], "string");
        assert_eq!(schema["messages"][0]["content"]["_type"], "Value");
    }

    #[test]
    fn test_feature_schema_scalars() {
        let schema = feature_schema(&json!({"question": "q", "rating": 8.5, "count": 3, "ok": true}));
        assert_eq!(schema["rating"]["dtype"], "float64");
        assert_eq!(schema["count"]["dtype"], "int64");
        assert_eq!(schema["ok"]["dtype"], "bool");
    }

    #[test]
    fn test_write_hf_dataset_layout() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("doc_alpaca_hf");
        let records = FormatKind::Alpaca.records(&[QaPair::new("q1", "a1"), QaPair::new("q2", "a2")]);

        write_hf_dataset(&records, FormatKind::Alpaca, &dir).unwrap();

        let shard = std::fs::read_to_string(dir.join(HF_DATA_FILE)).unwrap();
        assert_eq!(shard.lines().count(), 2);

        let info: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("dataset_info.json")).unwrap()).unwrap();
        assert_eq!(info["num_rows"], 2);
        assert_eq!(info["features"]["instruction"]["dtype"], "string");

        let state: Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("state.json")).unwrap()).unwrap();
        assert_eq!(state["_split"], "train");
        assert_eq!(state["_fingerprint"].as_str().unwrap().len(), 32);
    }
}
