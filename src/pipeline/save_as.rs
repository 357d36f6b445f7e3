//! Save-as: curated pairs → fine-tuning files or dataset directories.

use super::{read_json, run_directory, JSON_INPUT};
use crate::format::{load_pairs, output_path, write_pairs, FormatKind, StorageKind};
use crate::generate::file_stem;
use crate::models::Result;
use crate::pool::{BatchOptions, BatchOutcome, ItemProcessor, ScanCriterion};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

/// Suffix of curate outputs picked up from a directory.
pub const CLEANED_SUFFIX: &str = "_cleaned.json";

/// Driver for the save-as stage.
#[derive(Debug, Clone, Copy)]
pub struct SaveAsStage {
    format: FormatKind,
    storage: StorageKind,
    pretty: bool,
}

impl SaveAsStage {
    pub fn new(format: FormatKind, storage: StorageKind, pretty: bool) -> Self {
        Self {
            format,
            storage,
            pretty,
        }
    }

    /// Canonical output location for `input` inside `output_dir`.
    pub fn output_path(&self, input: &str, output_dir: &Path) -> PathBuf {
        output_path(&file_stem(input), output_dir, self.format, self.storage)
    }

    /// Convert one file, writing to `output` (a file, or a directory for hf).
    ///
    /// Any `.json` input is accepted; its shape decides how pairs are read.
    pub async fn process_one(&self, input: &str, output: &Path) -> Result<PathBuf> {
        JSON_INPUT.require(input)?;
        let pairs = load_pairs(read_json(input).await?)?;
        let written = write_pairs(&pairs, self.format, self.storage, output, self.pretty)?;
        info!(
            input = %input,
            output = %written.display(),
            pairs = pairs.len(),
            format = %self.format,
            storage = %self.storage,
            "Converted"
        );
        Ok(written)
    }

    /// Convert every `*_cleaned.json` directly inside `dir`.
    pub async fn process_many(&self, dir: &Path, output_dir: &Path, options: BatchOptions) -> Result<BatchOutcome> {
        let job = SaveAsJob {
            stage: *self,
            output_dir: output_dir.to_path_buf(),
        };
        run_directory(dir, ScanCriterion::Suffix(CLEANED_SUFFIX), job, options).await
    }
}

struct SaveAsJob {
    stage: SaveAsStage,
    output_dir: PathBuf,
}

#[async_trait]
impl ItemProcessor for SaveAsJob {
    async fn process(&self, input: &str) -> Result<PathBuf> {
        let output = self.stage.output_path(input, &self.output_dir);
        self.stage.process_one(input, &output).await
    }
}
