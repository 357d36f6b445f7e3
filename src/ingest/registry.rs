//! Extractor registry: file extension or URL shape → extractor.
//!
//! Epistemic foundation:
//! - K_i: The extension table is fixed once built
//! - B_i: A local source exists (checked before dispatch)
//! - I^R: Unknown extensions fail fast with the supported list

use super::{
    http_client, is_url, is_youtube_url, DocxExtractor, HtmlExtractor, PdfExtractor,
    PlainTextExtractor, PptxExtractor, TextExtractor, YoutubeExtractor,
};
use crate::models::{Result, SynthkitError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Extensions the ingest stage accepts, lowercase without the dot.
pub const SUPPORTED_EXTENSIONS: &[&str] = &["pdf", "html", "htm", "docx", "pptx", "txt"];

/// Registry of text extractors.
///
/// Built once per invocation and shared by every ingest worker through an `Arc`.
pub struct ExtractorRegistry {
    by_extension: HashMap<&'static str, Arc<dyn TextExtractor>>,
    web: Arc<dyn TextExtractor>,
    youtube: Arc<dyn TextExtractor>,
}

impl ExtractorRegistry {
    /// Registry with the built-in extractors.
    pub fn new() -> Result<Self> {
        Ok(Self::with_client(http_client()?))
    }

    /// Registry whose web extractors use the given client.
    pub fn with_client(client: reqwest::Client) -> Self {
        let html: Arc<dyn TextExtractor> = Arc::new(HtmlExtractor::new(client.clone()));

        let mut by_extension: HashMap<&'static str, Arc<dyn TextExtractor>> = HashMap::new();
        by_extension.insert("pdf", Arc::new(PdfExtractor));
        by_extension.insert("html", Arc::clone(&html));
        by_extension.insert("htm", Arc::clone(&html));
        by_extension.insert("docx", Arc::new(DocxExtractor));
        by_extension.insert("pptx", Arc::new(PptxExtractor));
        by_extension.insert("txt", Arc::new(PlainTextExtractor));

        Self {
            by_extension,
            web: html,
            youtube: Arc::new(YoutubeExtractor::new(client)),
        }
    }

    /// Registered extensions, sorted.
    pub fn supported_extensions(&self) -> Vec<&'static str> {
        let mut extensions: Vec<_> = self.by_extension.keys().copied().collect();
        extensions.sort_unstable();
        extensions
    }

    /// Pick the extractor for a source.
    ///
    /// URLs dispatch on host; local paths must exist and carry a known extension.
    pub fn resolve(&self, source: &str) -> Result<Arc<dyn TextExtractor>> {
        if is_youtube_url(source) {
            return Ok(Arc::clone(&self.youtube));
        }
        if is_url(source) {
            return Ok(Arc::clone(&self.web));
        }

        let path = Path::new(source);
        if !path.exists() {
            return Err(SynthkitError::NotFound(format!("File not found: {source}")));
        }

        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        self.by_extension
            .get(ext.as_str())
            .cloned()
            .ok_or_else(|| {
                let supported = self
                    .supported_extensions()
                    .iter()
                    .map(|e| format!(".{e}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                SynthkitError::Validation(format!(
                    "Unsupported file extension: '.{ext}'. Supported extensions: {supported}"
                ))
            })
    }

    /// Resolve and run the extractor for a source.
    pub async fn extract(&self, source: &str) -> Result<String> {
        let extractor = self.resolve(source)?;
        debug!(source = %source, extractor = extractor.name(), "Extracting text");
        extractor.extract(source).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use tempfile::TempDir;

    fn registry() -> ExtractorRegistry {
        ExtractorRegistry::new().unwrap()
    }

    #[test]
    fn test_supported_extensions_match_scan_list() {
        let mut expected = SUPPORTED_EXTENSIONS.to_vec();
        expected.sort_unstable();
        assert_eq!(registry().supported_extensions(), expected);
    }

    #[test]
    fn test_resolve_by_extension_and_url() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry();

        for (name, expected) in [("a.PDF", "pdf"), ("b.htm", "html"), ("c.pptx", "pptx"), ("d.txt", "txt")] {
            let path = temp_dir.path().join(name);
            std::fs::write(&path, "x").unwrap();
            let extractor = registry.resolve(&path.display().to_string()).unwrap();
            assert_eq!(extractor.name(), expected);
        }

        assert_eq!(
            registry.resolve("https://youtu.be/abc").unwrap().name(),
            "youtube"
        );
        assert_eq!(
            registry.resolve("https://example.com/post").unwrap().name(),
            "html"
        );
    }

    #[test]
    fn test_resolve_failures() {
        let temp_dir = TempDir::new().unwrap();
        let registry = registry();

        let missing = temp_dir.path().join("missing.pdf");
        let err = registry.resolve(&missing.display().to_string()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let odd = temp_dir.path().join("sheet.xlsx");
        std::fs::write(&odd, "x").unwrap();
        let err = registry.resolve(&odd.display().to_string()).err().unwrap();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let message = err.to_string();
        assert!(message.contains(".xlsx"));
        assert!(message.contains(".docx, .htm, .html, .pdf, .pptx, .txt"));
    }

    #[tokio::test]
    async fn test_extract_text_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("note.txt");
        std::fs::write(&path, "plain text").unwrap();

        let text = registry()
            .extract(&path.display().to_string())
            .await
            .unwrap();
        assert_eq!(text, "plain text");
    }
}
