//! Error types for synthkit.
//!
//! Epistemic taxonomy:
//! - B_i falsified: Expected failures (bad input, missing file, bad JSON shape)
//! - I^B materialized: Infrastructure failures (endpoint down, timeout)
//! - K_i violated: Internal invariant violations (bugs)

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Top-level error type for synthkit.
#[derive(Debug, Error)]
pub enum SynthkitError {
    // ═══════════════════════════════════════════════════════════════════
    // B_i FALSIFIED: Belief proven wrong (expected failures)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Configuration error: {0}")]
    Config(#[from] super::ConfigError),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("No matching files found in directory {dir:?} (expected {expected})")]
    EmptyInput { dir: PathBuf, expected: String },

    #[error("Data format error: {0}")]
    DataFormat(String),

    // ═══════════════════════════════════════════════════════════════════
    // I^B MATERIALIZED: Bounded ignorance became known-bad
    // ═══════════════════════════════════════════════════════════════════
    #[error("Upstream error: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("IO error: {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // ═══════════════════════════════════════════════════════════════════
    // K_i VIOLATED: Invariant broken (bug, should not happen)
    // ═══════════════════════════════════════════════════════════════════
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Inference endpoint errors.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Authentication failed: invalid API key")]
    AuthenticationFailed,

    #[error("Model not found: {0}")]
    ModelNotFound(String),

    #[error("Rate limited: retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: f64 },

    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Endpoint {endpoint} unreachable: {message}")]
    Unreachable { endpoint: String, message: String },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Request failed after {attempts} attempts: {last_error}")]
    MaxRetriesExceeded { attempts: u32, last_error: String },
}

impl UpstreamError {
    /// Check if this error is worth another attempt.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout(_) | Self::RateLimited { .. } | Self::Unreachable { .. } => true,
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

/// Closed tag for a failure, carried by every batch failure entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Upstream,
    DataFormat,
    EmptyInput,
    Io,
    Config,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorKind::Validation => "ValidationError",
            ErrorKind::NotFound => "NotFoundError",
            ErrorKind::Upstream => "UpstreamError",
            ErrorKind::DataFormat => "DataFormatError",
            ErrorKind::EmptyInput => "EmptyInputError",
            ErrorKind::Io => "IoError",
            ErrorKind::Config => "ConfigError",
            ErrorKind::Internal => "InternalError",
        };
        f.write_str(name)
    }
}

impl SynthkitError {
    /// Create an IO error with context.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a JSON error for intermediate data that does not parse.
    pub fn json(context: impl std::fmt::Display, source: serde_json::Error) -> Self {
        Self::DataFormat(format!("{context}: {source}"))
    }

    /// Tag used when this error becomes a batch failure.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Validation(_) => ErrorKind::Validation,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::EmptyInput { .. } => ErrorKind::EmptyInput,
            Self::DataFormat(_) => ErrorKind::DataFormat,
            Self::Upstream(_) => ErrorKind::Upstream,
            Self::Io { source, .. } if source.kind() == std::io::ErrorKind::NotFound => {
                ErrorKind::NotFound
            }
            Self::Io { .. } => ErrorKind::Io,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }
}

/// Result type alias for synthkit.
pub type Result<T> = std::result::Result<T, SynthkitError>;
