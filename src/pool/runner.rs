//! Batch runner: applies one item processor to many inputs.
//!
//! Epistemic foundation:
//! - K_i: Every input yields exactly one `ProcessingResult`
//! - K_i: A failing (or panicking) item never aborts the batch
//! - B_i: Each item may succeed or fail → Result, captured per input
//! - I^R: Parallelism and pool size are user-configurable

use crate::models::{ErrorKind, Result, SynthkitError};
use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use indicatif::{ProgressBar, ProgressStyle};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Semaphore;
use tokio::task::JoinError;
use tracing::{debug, info, warn};

/// Unit of work applied independently to each input of a batch.
#[async_trait]
pub trait ItemProcessor: Send + Sync + 'static {
    /// Process one input and return the path of the artifact written.
    async fn process(&self, input: &str) -> Result<PathBuf>;
}

#[async_trait]
impl<F, Fut> ItemProcessor for F
where
    F: Fn(String) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<PathBuf>> + Send + 'static,
{
    async fn process(&self, input: &str) -> Result<PathBuf> {
        (self)(input.to_string()).await
    }
}

/// Outcome of a single item.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessingResult {
    Success {
        input: String,
        output_path: PathBuf,
    },
    Failure(BatchFailure),
}

impl ProcessingResult {
    fn from_result(input: String, result: Result<PathBuf>) -> Self {
        match result {
            Ok(output_path) => Self::Success { input, output_path },
            Err(e) => Self::Failure(BatchFailure {
                input,
                kind: e.kind(),
                message: e.to_string(),
            }),
        }
    }

    fn from_join_error(input: String, error: JoinError) -> Self {
        Self::Failure(BatchFailure {
            input,
            kind: ErrorKind::Internal,
            message: format!("Task panicked: {error}"),
        })
    }
}

/// A failed input with its error tag and message.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchFailure {
    pub input: String,
    pub kind: ErrorKind,
    pub message: String,
}

/// Collected results of one batch.
///
/// `successes` is in completion order (parallel) or input order (sequential).
#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub successes: Vec<PathBuf>,
    pub failures: Vec<BatchFailure>,
}

impl BatchOutcome {
    pub fn push(&mut self, result: ProcessingResult) {
        match result {
            ProcessingResult::Success { output_path, .. } => self.successes.push(output_path),
            ProcessingResult::Failure(failure) => self.failures.push(failure),
        }
    }

    pub fn total(&self) -> usize {
        self.successes.len() + self.failures.len()
    }

    pub fn summary(&self) -> BatchSummary {
        let succeeded = self.successes.len();
        let failed = self.failures.len();
        let total = succeeded + failed;
        BatchSummary {
            succeeded,
            failed,
            success_rate: if total == 0 {
                0.0
            } else {
                succeeded as f64 / total as f64
            },
        }
    }
}

/// Aggregate counts for reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BatchSummary {
    pub succeeded: usize,
    pub failed: usize,
    /// Fraction in [0, 1]; 0 for an empty batch
    pub success_rate: f64,
}

impl std::fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} succeeded, {} failed ({:.1}% success rate)",
            self.succeeded,
            self.failed,
            self.success_rate * 100.0
        )
    }
}

/// How a batch is executed.
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub parallel: bool,
    /// Pool size override; default is min(inputs, available parallelism)
    pub max_workers: Option<usize>,
    pub show_progress: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            max_workers: None,
            show_progress: false,
        }
    }
}

/// Runs an `ItemProcessor` over a list of inputs.
#[derive(Debug, Clone, Default)]
pub struct BatchRunner {
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(options: BatchOptions) -> Self {
        Self { options }
    }

    /// Number of concurrent workers for a batch of `inputs` items.
    pub fn pool_size(&self, inputs: usize) -> usize {
        match self.options.max_workers {
            Some(max) => max.max(1),
            None => {
                let cores = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1);
                inputs.min(cores).max(1)
            }
        }
    }

    /// Process every input; never fails as a whole.
    pub async fn run<P: ItemProcessor>(&self, inputs: Vec<String>, processor: Arc<P>) -> BatchOutcome {
        let start = Instant::now();
        let total = inputs.len();
        let progress = self.progress_bar(total);

        let outcome = if !self.options.parallel || total <= 1 {
            info!(total = total, "Processing sequentially");
            self.run_sequential(inputs, processor, &progress).await
        } else {
            let pool_size = self.pool_size(total);
            info!(total = total, workers = pool_size, "Processing in parallel");
            self.run_parallel(inputs, processor, pool_size, &progress)
                .await
        };

        progress.finish_and_clear();

        let summary = outcome.summary();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Batch complete"
        );

        outcome
    }

    async fn run_sequential<P: ItemProcessor>(
        &self,
        inputs: Vec<String>,
        processor: Arc<P>,
        progress: &ProgressBar,
    ) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();

        for input in inputs {
            let processor = Arc::clone(&processor);
            let task_input = input.clone();
            // Spawned so a panic surfaces as a JoinError for this item only.
            let joined = tokio::spawn(async move { processor.process(&task_input).await }).await;

            let result = match joined {
                Ok(result) => ProcessingResult::from_result(input, result),
                Err(e) => ProcessingResult::from_join_error(input, e),
            };
            record(&mut outcome, result, progress);
        }

        outcome
    }

    async fn run_parallel<P: ItemProcessor>(
        &self,
        inputs: Vec<String>,
        processor: Arc<P>,
        pool_size: usize,
        progress: &ProgressBar,
    ) -> BatchOutcome {
        let semaphore = Arc::new(Semaphore::new(pool_size));
        let mut pending = FuturesUnordered::new();

        for input in inputs {
            let processor = Arc::clone(&processor);
            let semaphore = Arc::clone(&semaphore);
            let task_input = input.clone();

            let handle = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| SynthkitError::Internal("Semaphore closed".to_string()))?;
                processor.process(&task_input).await
            });
            pending.push(handle.map(move |joined| (input, joined)));
        }

        let mut outcome = BatchOutcome::default();
        while let Some((input, joined)) = pending.next().await {
            let result = match joined {
                Ok(result) => ProcessingResult::from_result(input, result),
                Err(e) => ProcessingResult::from_join_error(input, e),
            };
            record(&mut outcome, result, progress);
        }

        outcome
    }

    fn progress_bar(&self, total: usize) -> ProgressBar {
        if !self.options.show_progress {
            return ProgressBar::hidden();
        }

        let pb = ProgressBar::new(total as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} ({percent}%) {msg}",
        ) {
            pb.set_style(style.progress_chars("##-"));
        }
        pb
    }
}

fn record(outcome: &mut BatchOutcome, result: ProcessingResult, progress: &ProgressBar) {
    match &result {
        ProcessingResult::Success { input, output_path } => {
            debug!(input = %input, output = %output_path.display(), "Item succeeded");
        }
        ProcessingResult::Failure(failure) => {
            warn!(
                input = %failure.input,
                kind = %failure.kind,
                error = %failure.message,
                "Item failed"
            );
        }
    }
    outcome.push(result);
    progress.inc(1);
}
