//! Ingest: documents and URLs → plain text files.

use super::{ensure_dir, run_directory};
use crate::generate::file_stem;
use crate::ingest::{is_url, is_youtube_url, youtube_video_id, ExtractorRegistry, SUPPORTED_EXTENSIONS};
use crate::models::{Result, SynthkitError};
use crate::pool::{BatchOptions, BatchOutcome, ItemProcessor, ScanCriterion};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

/// Output file name for one source.
///
/// `name` wins (with `.txt` appended if missing). Otherwise YouTube URLs map
/// to `youtube_<id>.txt`, other URLs to their host with dots replaced, and
/// files to `<stem>.txt`.
pub fn ingest_output_name(source: &str, name: Option<&str>) -> String {
    if let Some(name) = name {
        return if name.ends_with(".txt") {
            name.to_string()
        } else {
            format!("{name}.txt")
        };
    }

    if is_youtube_url(source) {
        if let Some(id) = youtube_video_id(source) {
            return format!("youtube_{id}.txt");
        }
    }
    if is_url(source) {
        if let Some(host) = reqwest::Url::parse(source)
            .ok()
            .and_then(|url| url.host_str().map(|h| h.replace('.', "_")))
        {
            return format!("{host}.txt");
        }
    }

    format!("{}.txt", file_stem(source))
}

/// Driver for the ingest stage.
#[derive(Clone)]
pub struct IngestStage {
    registry: Arc<ExtractorRegistry>,
}

impl IngestStage {
    pub fn new(registry: Arc<ExtractorRegistry>) -> Self {
        Self { registry }
    }

    /// Extract one file or URL into `output_dir`.
    pub async fn process_one(&self, source: &str, output_dir: &Path, name: Option<&str>) -> Result<PathBuf> {
        let text = self.registry.extract(source).await?;

        ensure_dir(output_dir)?;
        let output_path = output_dir.join(ingest_output_name(source, name));
        tokio::fs::write(&output_path, &text)
            .await
            .map_err(|e| SynthkitError::io(format!("writing {}", output_path.display()), e))?;

        info!(source = %source, output = %output_path.display(), chars = text.len(), "Ingested");
        Ok(output_path)
    }

    /// Extract every supported file directly inside `dir`.
    ///
    /// With a `prefix`, outputs are named `<prefix>_<stem>.txt`.
    pub async fn process_many(
        &self,
        dir: &Path,
        output_dir: &Path,
        prefix: Option<&str>,
        options: BatchOptions,
    ) -> Result<BatchOutcome> {
        let job = IngestJob {
            stage: self.clone(),
            output_dir: output_dir.to_path_buf(),
            prefix: prefix.map(str::to_string),
        };
        run_directory(dir, ScanCriterion::Extensions(SUPPORTED_EXTENSIONS), job, options).await
    }
}

struct IngestJob {
    stage: IngestStage,
    output_dir: PathBuf,
    prefix: Option<String>,
}

#[async_trait]
impl ItemProcessor for IngestJob {
    async fn process(&self, input: &str) -> Result<PathBuf> {
        let name = self
            .prefix
            .as_ref()
            .map(|prefix| format!("{prefix}_{}", file_stem(input)));
        self.stage.process_one(input, &self.output_dir, name.as_deref()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use tempfile::TempDir;

    fn stage() -> IngestStage {
        IngestStage::new(Arc::new(ExtractorRegistry::new().unwrap()))
    }

    #[test]
    fn test_output_names() {
        assert_eq!(ingest_output_name("docs/report.pdf", None), "report.txt");
        assert_eq!(ingest_output_name("docs/report.pdf", Some("custom")), "custom.txt");
        assert_eq!(ingest_output_name("docs/report.pdf", Some("custom.txt")), "custom.txt");
        assert_eq!(
            ingest_output_name("https://www.youtube.com/watch?v=dQw4w9WgXcQ", None),
            "youtube_dQw4w9WgXcQ.txt"
        );
        assert_eq!(
            ingest_output_name("https://docs.example.org/guide", None),
            "docs_example_org.txt"
        );
    }

    #[tokio::test]
    async fn test_process_one_plain_text() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("notes.txt");
        std::fs::write(&input, "Some notes.").unwrap();
        let out_dir = tmp.path().join("parsed");

        let output = stage()
            .process_one(&input.display().to_string(), &out_dir, None)
            .await
            .unwrap();

        assert_eq!(output, out_dir.join("notes.txt"));
        assert_eq!(std::fs::read_to_string(output).unwrap(), "Some notes.");
    }

    #[tokio::test]
    async fn test_process_one_rejects_unknown_extension() {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("data.csv");
        std::fs::write(&input, "a,b").unwrap();

        let err = stage()
            .process_one(&input.display().to_string(), tmp.path(), None)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains(".pdf"));
    }

    #[tokio::test]
    async fn test_process_many_with_prefix() {
        let tmp = TempDir::new().unwrap();
        let in_dir = tmp.path().join("in");
        std::fs::create_dir(&in_dir).unwrap();
        std::fs::write(in_dir.join("a.txt"), "alpha").unwrap();
        std::fs::write(in_dir.join("b.html"), "<p>beta</p>").unwrap();
        std::fs::write(in_dir.join("skip.csv"), "x").unwrap();
        let out_dir = tmp.path().join("out");

        let outcome = stage()
            .process_many(&in_dir, &out_dir, Some("batch"), BatchOptions::default())
            .await
            .unwrap();

        assert_eq!(outcome.total(), 2);
        assert!(outcome.failures.is_empty());
        assert_eq!(std::fs::read_to_string(out_dir.join("batch_a.txt")).unwrap(), "alpha");
        assert!(std::fs::read_to_string(out_dir.join("batch_b.txt"))
            .unwrap()
            .contains("beta"));
    }

    #[tokio::test]
    async fn test_process_many_empty_directory() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("only.csv"), "x").unwrap();

        let err = stage()
            .process_many(tmp.path(), tmp.path(), None, BatchOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
    }
}
