//! Stage drivers: ingest, create, curate and save-as.
//!
//! Every driver has the same shape. `process_one` handles a single input
//! and returns the artifact path; `process_many` scans a directory and
//! hands each match to the batch runner.

mod create;
mod curate;
mod ingest;
mod save_as;

pub use create::*;
pub use curate::*;
pub use ingest::*;
pub use save_as::*;

use crate::models::{Result, SynthkitError};
use crate::pool::{scan, BatchOptions, BatchOutcome, BatchRunner, ItemProcessor, ScanCriterion};
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Inputs accepted by curate and by single-file save-as.
const JSON_INPUT: ScanCriterion = ScanCriterion::Extensions(&["json"]);

/// Scan `dir` and run `processor` over every match.
///
/// Only the scan can fail; item failures land in the outcome.
async fn run_directory<P: ItemProcessor>(
    dir: &Path,
    criterion: ScanCriterion,
    processor: P,
    options: BatchOptions,
) -> Result<BatchOutcome> {
    let inputs = scan(dir, &criterion)?;
    info!(dir = %dir.display(), files = inputs.len(), "Scanned input directory");
    Ok(BatchRunner::new(options).run(inputs, Arc::new(processor)).await)
}

fn ensure_dir(dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| SynthkitError::io(format!("creating {}", dir.display()), e))
}

/// Serialize `value` to `path`, creating the parent directory.
fn write_json<T: Serialize>(path: &Path, value: &T, pretty: bool) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        ensure_dir(parent)?;
    }
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    }
    .map_err(|e| SynthkitError::Internal(format!("Failed to serialize output: {e}")))?;

    std::fs::write(path, text).map_err(|e| SynthkitError::io(format!("writing {}", path.display()), e))
}

async fn read_text(path: &str) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| SynthkitError::io(format!("reading {path}"), e))
}

async fn read_json(path: &str) -> Result<Value> {
    let text = read_text(path).await?;
    serde_json::from_str(&text).map_err(|e| SynthkitError::json(format!("Invalid JSON in {path}"), e))
}
