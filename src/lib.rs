//! synthkit - Synthetic fine-tuning data from documents.
//!
//! ## Pipeline
//!
//! - **ingest**: PDF, HTML, DOCX, PPTX, text and YouTube → plain text
//! - **create**: text → QA pairs, summaries or chain-of-thought examples
//! - **curate**: rate generated pairs with an LLM and keep the good ones
//! - **save-as**: curated pairs → JSONL, Alpaca, fine-tuning or ChatML files
//!
//! Every stage accepts a single input or a directory. Directories are
//! processed by a bounded worker pool where one bad file never aborts the run.
//!
//! ## Epistemic Design
//!
//! - K_i (Knowledge): Closed enums for content types, formats and storage
//! - B_i (Beliefs): Runtime fallible operations (Result, Option)
//! - I^R (Resolvable): User-configurable parameters, resolved once per run
//! - I^B (Bounded): Network/API uncertainties (retry, backoff, per-item failure)

pub mod client;
pub mod format;
pub mod generate;
pub mod ingest;
pub mod models;
pub mod pipeline;
pub mod pool;

// Re-exports for convenience
pub use client::{ChatModel, LlmClient, RateLimiter};
pub use format::{FormatKind, StorageKind};
pub use generate::{ContentGenerator, ContentType};
pub use ingest::ExtractorRegistry;
pub use models::{Config, ErrorKind, Result, StageConfig, SynthkitError};
pub use pipeline::{CreateStage, CurateStage, IngestStage, SaveAsStage};
pub use pool::{BatchOptions, BatchOutcome, BatchRunner};
