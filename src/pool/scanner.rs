//! Directory scanner: expands a directory into the inputs of one stage.

use crate::models::{Result, SynthkitError};
use std::path::Path;

/// Which files of a directory a stage picks up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanCriterion {
    /// Case-insensitive extension allow-list (without the dot)
    Extensions(&'static [&'static str]),
    /// File name ends with this suffix
    Suffix(&'static str),
}

impl ScanCriterion {
    pub fn matches(&self, path: &Path) -> bool {
        match self {
            ScanCriterion::Extensions(allowed) => path
                .extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| allowed.iter().any(|a| a.eq_ignore_ascii_case(ext)))
                .unwrap_or(false),
            ScanCriterion::Suffix(suffix) => path
                .file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.ends_with(suffix))
                .unwrap_or(false),
        }
    }

    /// Human-readable form used in EmptyInput errors.
    pub fn describe(&self) -> String {
        match self {
            ScanCriterion::Extensions(allowed) => allowed
                .iter()
                .map(|ext| format!(".{ext}"))
                .collect::<Vec<_>>()
                .join(" "),
            ScanCriterion::Suffix(suffix) => format!("names ending with {suffix}"),
        }
    }

    /// Check a single input against this criterion.
    ///
    /// B_i(input matches) → Validation listing what is accepted
    pub fn require(&self, input: &str) -> Result<()> {
        if self.matches(Path::new(input)) {
            return Ok(());
        }
        Err(SynthkitError::Validation(format!(
            "Unsupported input '{input}'. Expected {}",
            self.describe()
        )))
    }
}

/// List the matching regular files directly inside `dir`, sorted by path.
///
/// B_i(directory exists) → NotFound
/// B_i(at least one match) → EmptyInput naming the directory
pub fn scan(dir: &Path, criterion: &ScanCriterion) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Err(SynthkitError::NotFound(format!(
            "Directory not found: {}",
            dir.display()
        )));
    }

    let entries = std::fs::read_dir(dir)
        .map_err(|e| SynthkitError::io(format!("reading directory {}", dir.display()), e))?;

    let mut inputs = Vec::new();
    for entry in entries {
        let path = entry
            .map_err(|e| SynthkitError::io(format!("reading directory {}", dir.display()), e))?
            .path();
        if path.is_file() && criterion.matches(&path) {
            inputs.push(path.display().to_string());
        }
    }

    if inputs.is_empty() {
        return Err(SynthkitError::EmptyInput {
            dir: dir.to_path_buf(),
            expected: criterion.describe(),
        });
    }

    inputs.sort();
    Ok(inputs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use tempfile::TempDir;

    const DOCS: ScanCriterion = ScanCriterion::Extensions(&["pdf", "txt"]);

    fn touch(dir: &Path, name: &str) {
        std::fs::write(dir.join(name), "x").unwrap();
    }

    #[test]
    fn test_scan_filters_by_extension() {
        let temp_dir = TempDir::new().unwrap();
        for name in ["a.txt", "b.PDF", "c.txt", "notes.md", "image.png"] {
            touch(temp_dir.path(), name);
        }

        let found = scan(temp_dir.path(), &DOCS).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found[0].ends_with("a.txt"));
        assert!(found.iter().all(|f| !f.ends_with(".md") && !f.ends_with(".png")));
    }

    #[test]
    fn test_scan_by_suffix_does_not_recurse() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "doc_cleaned.json");
        touch(temp_dir.path(), "doc_qa_pairs.json");
        let nested = temp_dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        touch(&nested, "inner_cleaned.json");

        let found = scan(temp_dir.path(), &ScanCriterion::Suffix("_cleaned.json")).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("doc_cleaned.json"));
    }

    #[test]
    fn test_scan_without_matches_is_empty_input() {
        let temp_dir = TempDir::new().unwrap();
        touch(temp_dir.path(), "notes.md");

        let err = scan(temp_dir.path(), &DOCS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::EmptyInput);
        match err {
            SynthkitError::EmptyInput { dir, expected } => {
                assert_eq!(dir, temp_dir.path());
                assert_eq!(expected, ".pdf .txt");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_scan_missing_directory() {
        let temp_dir = TempDir::new().unwrap();
        let err = scan(&temp_dir.path().join("absent"), &DOCS).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_require_single_input() {
        assert!(DOCS.require("notes/a.TXT").is_ok());

        let err = DOCS.require("notes/a.docx").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains(".pdf .txt"));

        let cleaned = ScanCriterion::Suffix("_cleaned.json");
        assert!(cleaned.require("out/doc_cleaned.json").is_ok());
        assert!(cleaned.require("out/doc_qa_pairs.json").is_err());
    }
}
