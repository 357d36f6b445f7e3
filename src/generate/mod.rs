//! Content generation for the create stage, plus parsing helpers shared
//! with curation.

mod cot;
mod qa;
mod rating;
mod text;

pub use cot::*;
pub use qa::*;
pub use rating::*;
pub use text::*;

use crate::pool::ScanCriterion;
use std::str::FromStr;

/// What the create stage produces from one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum ContentType {
    /// Question-answer pairs
    Qa,
    /// Document summary only
    Summary,
    /// Chain-of-thought examples
    Cot,
    /// Add reasoning to existing conversations
    #[value(name = "cot-enhance")]
    CotEnhance,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Qa => "qa",
            ContentType::Summary => "summary",
            ContentType::Cot => "cot",
            ContentType::CotEnhance => "cot-enhance",
        }
    }

    /// Output file name suffix appended to the input stem.
    pub fn output_suffix(&self) -> &'static str {
        match self {
            ContentType::Qa => "_qa_pairs.json",
            ContentType::Summary => "_summary.json",
            ContentType::Cot => "_cot_examples.json",
            ContentType::CotEnhance => "_enhanced.json",
        }
    }

    /// Files picked up when create is given a directory.
    pub fn scan_criterion(&self) -> ScanCriterion {
        match self {
            ContentType::CotEnhance => ScanCriterion::Extensions(&["json"]),
            _ => ScanCriterion::Extensions(&["txt"]),
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "qa" => Ok(ContentType::Qa),
            "summary" => Ok(ContentType::Summary),
            "cot" => Ok(ContentType::Cot),
            "cot-enhance" => Ok(ContentType::CotEnhance),
            other => Err(format!(
                "unknown content type '{other}' (supported: qa, summary, cot, cot-enhance)"
            )),
        }
    }
}
