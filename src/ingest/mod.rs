//! Text extraction for the ingest stage.
//!
//! Epistemic foundation:
//! - K_i: Extractor choice is a function of URL shape or file extension
//! - B_i: A document parses into text (might fail → typed error)
//! - I^B: Remote pages may be unreachable → NotFound

mod document;
mod registry;
mod web;

pub use document::*;
pub use registry::*;
pub use web::*;

use crate::models::{Result, SynthkitError};
use async_trait::async_trait;
use regex::Regex;
use std::sync::LazyLock;

/// Turns one source (file path or URL) into plain text.
#[async_trait]
pub trait TextExtractor: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    async fn extract(&self, source: &str) -> Result<String>;
}

pub fn is_url(source: &str) -> bool {
    source.starts_with("http://") || source.starts_with("https://")
}

pub fn is_youtube_url(source: &str) -> bool {
    is_url(source) && (source.contains("youtube.com") || source.contains("youtu.be"))
}

async fn read_source(path: &str) -> Result<Vec<u8>> {
    tokio::fs::read(path)
        .await
        .map_err(|e| SynthkitError::io(format!("reading {path}"), e))
}

/// Run a parser on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SynthkitError::Internal(format!("Extraction task failed: {e}")))?
}

static ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&(#[xX][0-9a-fA-F]+|#[0-9]+|[a-zA-Z]+);").expect("static entity pattern")
});

/// Decode XML/HTML character references in a single pass.
pub fn unescape_xml(s: &str) -> String {
    ENTITY_RE
        .replace_all(s, |caps: &regex::Captures| {
            let entity = &caps[1];
            let decoded = match entity {
                "amp" => Some('&'),
                "lt" => Some('<'),
                "gt" => Some('>'),
                "quot" => Some('"'),
                "apos" => Some('\''),
                "nbsp" => Some('\u{a0}'),
                _ => {
                    let code = if let Some(hex) = entity
                        .strip_prefix("#x")
                        .or_else(|| entity.strip_prefix("#X"))
                    {
                        u32::from_str_radix(hex, 16).ok()
                    } else {
                        entity.strip_prefix('#').and_then(|dec| dec.parse().ok())
                    };
                    code.and_then(char::from_u32)
                }
            };
            decoded
                .map(String::from)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}
