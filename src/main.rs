//! synthkit CLI - Synthetic fine-tuning data from documents.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use synthkit::client::{HealthCheckResult, HealthStatus};
use synthkit::generate::file_stem;
use synthkit::models::{Overrides, Provider};
use synthkit::pipeline::CreateParams;
use synthkit::{
    BatchOptions, BatchOutcome, Config, ContentGenerator, ContentType, CreateStage, CurateStage,
    ExtractorRegistry, FormatKind, IngestStage, LlmClient, SaveAsStage, StageConfig, StorageKind,
};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

/// Outputs shown from each end of a long success list.
const LISTED_HEAD_TAIL: usize = 5;

/// Paths shown in full up to this many outputs.
const MAX_LISTED_PATHS: usize = 2 * LISTED_HEAD_TAIL;

/// Failures shown after a batch.
const MAX_LISTED_FAILURES: usize = 5;

#[derive(Parser)]
#[command(name = "synthkit")]
#[command(version)]
#[command(about = "Generate, curate and export synthetic fine-tuning data from documents")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file (default: ./synthkit.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Args)]
struct BatchArgs {
    /// Process directory inputs in parallel (default)
    #[arg(long, overrides_with = "sequential")]
    parallel: bool,

    /// Process directory inputs one at a time, in order
    #[arg(long, overrides_with = "parallel")]
    sequential: bool,

    /// Maximum number of parallel workers (default: CPU count)
    #[arg(long)]
    max_workers: Option<usize>,
}

impl BatchArgs {
    fn options(&self) -> BatchOptions {
        BatchOptions {
            parallel: !self.sequential,
            max_workers: self.max_workers,
            show_progress: true,
        }
    }
}

#[derive(Args)]
struct EndpointArgs {
    /// API base URL
    #[arg(long)]
    api_base: Option<String>,

    /// Model to use
    #[arg(short, long)]
    model: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract text from a document, URL or directory of documents
    Ingest {
        /// File, URL or directory
        input: String,

        /// Where to write text files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        /// Output file name (a prefix when the input is a directory)
        #[arg(short, long)]
        name: Option<String>,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Generate content from text files
    Create {
        /// Text file or directory
        input: String,

        /// What to generate
        #[arg(long = "type", value_enum, default_value_t = ContentType::Qa)]
        content_type: ContentType,

        /// Where to write generated files
        #[arg(short, long)]
        output_dir: Option<PathBuf>,

        #[command(flatten)]
        endpoint: EndpointArgs,

        /// Number of QA pairs or examples to generate
        #[arg(short, long)]
        num_pairs: Option<usize>,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Rate generated QA pairs and keep those above a threshold
    Curate {
        /// Generated QA file or directory
        input: String,

        /// Output file (single input) or directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Quality threshold (1-10)
        #[arg(short, long)]
        threshold: Option<f64>,

        #[command(flatten)]
        endpoint: EndpointArgs,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Convert curated pairs to a fine-tuning format
    SaveAs {
        /// Curated file or directory
        input: String,

        /// Output format (default from config)
        #[arg(short, long, value_enum)]
        format: Option<FormatKind>,

        /// Storage layout
        #[arg(long, value_enum, default_value_t = StorageKind::Json)]
        storage: StorageKind,

        /// Output file (single input) or directory
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Check that the inference endpoint is reachable
    SystemCheck {
        /// API base URL
        #[arg(long)]
        api_base: Option<String>,

        /// Provider to check (vllm or api-endpoint)
        #[arg(long)]
        provider: Option<Provider>,
    },

    /// Show example configuration
    ExampleConfig,

    /// Validate configuration file
    ValidateConfig,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .compact()
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set up logging: {e}");
    }
}

fn print_example_config() {
    let example = r#"# synthkit configuration file

[paths]
input = "data/input"

[paths.output]
parsed = "data/parsed"
generated = "data/generated"
cleaned = "data/cleaned"
final = "data/final"

[llm]
# "vllm" (self-hosted) or "api-endpoint" (hosted, OpenAI-compatible)
provider = "vllm"

[vllm]
api_base = "http://localhost:8000/v1"
model = "meta-llama/Llama-3.3-70B-Instruct"
port = 8000
timeout_secs = 180
max_retries = 3
retry_delay_secs = 1.0

[api-endpoint]
api_base = "https://api.llama.com/v1"
model = "Llama-4-Maverick-17B-128E-Instruct-FP8"
# Key is read from this variable first, then from api_key
api_key_env = "API_ENDPOINT_KEY"
# api_key = "${MY_KEY}"
timeout_secs = 180
max_retries = 3
retry_delay_secs = 1.0

[generation]
temperature = 0.7
top_p = 0.95
chunk_size = 4000
overlap = 200
max_tokens = 4096
num_pairs = 25
num_cot_examples = 5
# num_cot_enhance_examples = 10
batch_size = 32

[curate]
threshold = 7.0
batch_size = 8
temperature = 0.1

[format]
default = "jsonl"  # jsonl | alpaca | ft | chatml
include_metadata = true
pretty_json = true

# [prompts] overrides the built-in templates: summary, qa_generation,
# qa_rating, cot_generation, cot_enhancement
"#;
    println!("{example}");
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = Config::load(path).with_context(|| match path {
        Some(path) => format!("Failed to load config from {path:?}"),
        None => "Failed to load config".to_string(),
    })?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn resolve(config: &Config, endpoint: Option<&EndpointArgs>, provider: Option<Provider>) -> Arc<StageConfig> {
    let overrides = Overrides {
        provider,
        api_base: endpoint.and_then(|e| e.api_base.clone()),
        model: endpoint.and_then(|e| e.model.clone()),
    };
    Arc::new(StageConfig::resolve(config, &overrides))
}

/// Fail fast when a local vLLM server is not answering.
async fn vllm_preflight(client: &LlmClient, config: &StageConfig) -> bool {
    if client.provider() != Provider::Vllm {
        return true;
    }
    let health = client.health_check().await;
    if health.status == HealthStatus::Healthy {
        return true;
    }

    eprintln!("Error: vLLM server not available at {}", client.api_base());
    eprintln!("Please start the vLLM server with:");
    eprintln!(
        "vllm serve {} --port {}",
        config.endpoint.model, config.endpoint.port
    );
    false
}

fn print_health(health: &HealthCheckResult) {
    match health.status {
        HealthStatus::Healthy => {
            println!(
                "Endpoint {} is reachable ({} ms)",
                health.endpoint,
                health.latency_ms.unwrap_or_default()
            );
            if !health.models.is_empty() {
                println!("Available models:");
                for model in &health.models {
                    println!("  - {model}");
                }
            }
        }
        HealthStatus::Unhealthy | HealthStatus::Unreachable => {
            eprintln!(
                "Endpoint {} is not available: {}",
                health.endpoint,
                health.error.as_deref().unwrap_or("unknown error")
            );
        }
    }
}

fn display_name(input: &str) -> String {
    Path::new(input)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| input.to_string())
}

/// Success listing: every path, or the head and tail around a skip count.
fn success_lines(paths: &[PathBuf]) -> Vec<String> {
    let line = |path: &PathBuf| format!("  - {}", path.display());
    if paths.len() <= MAX_LISTED_PATHS {
        return paths.iter().map(line).collect();
    }

    let mut lines: Vec<String> = paths[..LISTED_HEAD_TAIL].iter().map(line).collect();
    lines.push(format!("  ... {} more ...", paths.len() - MAX_LISTED_PATHS));
    lines.extend(paths[paths.len() - LISTED_HEAD_TAIL..].iter().map(line));
    lines
}

fn report_batch(action: &str, outcome: &BatchOutcome) {
    let summary = outcome.summary();
    println!("\n=== {action} Complete ===");
    println!("{summary}");

    for line in success_lines(&outcome.successes) {
        println!("{line}");
    }

    if !outcome.failures.is_empty() {
        println!("Failures:");
        for failure in outcome.failures.iter().take(MAX_LISTED_FAILURES) {
            println!(
                "  - {} [{}]: {}",
                display_name(&failure.input),
                failure.kind,
                failure.message
            );
        }
        if outcome.failures.len() > MAX_LISTED_FAILURES {
            println!("  ... and {} more", outcome.failures.len() - MAX_LISTED_FAILURES);
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::ExampleConfig => {
            print_example_config();
        }

        Commands::ValidateConfig => {
            let config = load_config(config_path)?;
            let stage = resolve(&config, None, None);

            info!("Configuration is valid");
            info!("  Provider: {}", stage.endpoint.provider);
            info!("  Endpoint: {} ({})", stage.endpoint.api_base, stage.endpoint.model);
            info!(
                "  Generation: {} pairs, chunk size {}, batch size {}",
                stage.generation.num_pairs, stage.generation.chunk_size, stage.generation.batch_size
            );
            info!("  Curate threshold: {:.1}", stage.curate.threshold);
            info!("  Default format: {}", stage.format.default);
            if stage.endpoint.provider == Provider::ApiEndpoint && stage.endpoint.api_key.is_none() {
                warn!("No API key found for api-endpoint; create and curate will fail");
            }
        }

        Commands::SystemCheck { api_base, provider } => {
            let config = load_config(config_path)?;
            let endpoint = EndpointArgs { api_base, model: None };
            let stage = resolve(&config, Some(&endpoint), provider);

            let client = LlmClient::from_settings(&stage.endpoint)?;
            println!("Checking {} endpoint at {}...", client.provider(), client.api_base());
            let health = client.health_check().await;
            print_health(&health);
            if health.status != HealthStatus::Healthy {
                return Ok(ExitCode::FAILURE);
            }
        }

        Commands::Ingest {
            input,
            output_dir,
            name,
            batch,
        } => {
            let config = load_config(config_path)?;
            let output_dir = output_dir.unwrap_or_else(|| config.paths.output.parsed.clone());
            let stage = IngestStage::new(Arc::new(ExtractorRegistry::new()?));

            if Path::new(&input).is_dir() {
                let outcome = stage
                    .process_many(Path::new(&input), &output_dir, name.as_deref(), batch.options())
                    .await?;
                report_batch("Ingest", &outcome);
            } else {
                let path = stage.process_one(&input, &output_dir, name.as_deref()).await?;
                println!("Text successfully extracted to {}", path.display());
            }
        }

        Commands::Create {
            input,
            content_type,
            output_dir,
            endpoint,
            num_pairs,
            batch,
        } => {
            let config = load_config(config_path)?;
            let stage_config = resolve(&config, Some(&endpoint), None);
            let client = Arc::new(LlmClient::from_settings(&stage_config.endpoint)?);
            if !vllm_preflight(&client, &stage_config).await {
                return Ok(ExitCode::FAILURE);
            }

            let output_dir = output_dir.unwrap_or_else(|| stage_config.paths.output.generated.clone());
            let generator = Arc::new(ContentGenerator::new(client, Arc::clone(&stage_config)));
            let stage = CreateStage::new(generator, stage_config);
            let params = CreateParams {
                content_type,
                num_pairs,
            };

            if Path::new(&input).is_dir() {
                let outcome = stage
                    .process_many(Path::new(&input), &output_dir, params, batch.options())
                    .await?;
                report_batch("Create", &outcome);
            } else {
                let path = stage.process_one(&input, &output_dir, params).await?;
                println!("Content saved to {}", path.display());
            }
        }

        Commands::Curate {
            input,
            output,
            threshold,
            endpoint,
            batch,
        } => {
            let config = load_config(config_path)?;
            let stage_config = resolve(&config, Some(&endpoint), None);
            let client = Arc::new(LlmClient::from_settings(&stage_config.endpoint)?);
            if !vllm_preflight(&client, &stage_config).await {
                return Ok(ExitCode::FAILURE);
            }

            let cleaned_dir = stage_config.paths.output.cleaned.clone();
            let stage = CurateStage::new(client, stage_config, threshold);
            info!(threshold = stage.threshold(), "Curating");

            if Path::new(&input).is_dir() {
                let output_dir = output.unwrap_or(cleaned_dir);
                let outcome = stage
                    .process_many(Path::new(&input), &output_dir, batch.options())
                    .await?;
                report_batch("Curate", &outcome);
            } else {
                let output_path =
                    output.unwrap_or_else(|| CurateStage::output_path(&input, &cleaned_dir));
                let path = stage.process_one(&input, &output_path).await?;
                println!("Cleaned content saved to {}", path.display());
            }
        }

        Commands::SaveAs {
            input,
            format,
            storage,
            output,
            batch,
        } => {
            let config = load_config(config_path)?;
            let format = match format {
                Some(format) => format,
                None => config
                    .format
                    .default
                    .parse::<FormatKind>()
                    .context("Invalid format.default in config")?,
            };
            let final_dir = config.paths.output.final_dir.clone();
            let stage = SaveAsStage::new(format, storage, config.format.pretty_json);

            if Path::new(&input).is_dir() {
                let output_dir = output.unwrap_or(final_dir);
                let outcome = stage
                    .process_many(Path::new(&input), &output_dir, batch.options())
                    .await?;
                report_batch("Save-as", &outcome);
            } else {
                let output_path = output.unwrap_or_else(|| stage.output_path(&input, &final_dir));
                let path = stage.process_one(&input, &output_path).await?;
                println!(
                    "Converted {} to {format} ({storage} storage): {}",
                    file_stem(&input),
                    path.display()
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
