//! Configuration models for synthkit.
//!
//! All I^R (resolvable ignorance) is parameterized here.
//! The user resolves these unknowns via config file and command-line flags;
//! `StageConfig::resolve` collapses them into one immutable snapshot.

use regex::Regex;
use serde::{de::Error as _, Deserialize, Deserializer, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::LazyLock;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "synthkit.toml";

/// Top-level configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub llm: LlmConfig,
    pub vllm: EndpointConfig,
    #[serde(rename = "api-endpoint", deserialize_with = "api_endpoint_section")]
    pub api_endpoint: EndpointConfig,
    pub generation: GenerationConfig,
    pub curate: CurateConfig,
    pub format: FormatConfig,
    pub prompts: PromptConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            paths: PathsConfig::default(),
            llm: LlmConfig::default(),
            vllm: EndpointConfig::default(),
            api_endpoint: EndpointConfig::api_endpoint(),
            generation: GenerationConfig::default(),
            curate: CurateConfig::default(),
            format: FormatConfig::default(),
            prompts: PromptConfig::default(),
        }
    }
}

/// Input and per-stage output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub input: PathBuf,
    pub output: OutputPaths,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input: PathBuf::from("data/input"),
            output: OutputPaths::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputPaths {
    pub parsed: PathBuf,
    pub generated: PathBuf,
    pub cleaned: PathBuf,
    #[serde(rename = "final")]
    pub final_dir: PathBuf,
}

impl Default for OutputPaths {
    fn default() -> Self {
        Self {
            parsed: PathBuf::from("data/parsed"),
            generated: PathBuf::from("data/generated"),
            cleaned: PathBuf::from("data/cleaned"),
            final_dir: PathBuf::from("data/final"),
        }
    }
}

/// Which inference backend to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Provider {
    /// Self-hosted vLLM server (no API key)
    #[default]
    #[serde(rename = "vllm")]
    Vllm,
    /// Hosted OpenAI-compatible endpoint
    #[serde(rename = "api-endpoint")]
    ApiEndpoint,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Vllm => "vllm",
            Provider::ApiEndpoint => "api-endpoint",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "vllm" => Ok(Provider::Vllm),
            "api-endpoint" => Ok(Provider::ApiEndpoint),
            other => Err(format!(
                "unknown provider '{other}' (supported: vllm, api-endpoint)"
            )),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
}

/// Connection settings for one OpenAI-compatible endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base URL, e.g. "http://localhost:8000/v1"
    pub api_base: String,

    /// Default model ID
    pub model: String,

    /// API key; `${VAR}` placeholders are expanded
    pub api_key: Option<String>,

    /// Environment variable consulted before `api_key`
    pub api_key_env: Option<String>,

    /// Port hint for the vLLM startup instructions
    pub port: u16,

    /// Request timeout in seconds
    pub timeout_secs: u64,

    /// Maximum attempts per request
    pub max_retries: u32,

    /// Base delay between retries in seconds (doubled per attempt)
    pub retry_delay_secs: f64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            api_base: "http://localhost:8000/v1".to_string(),
            model: "meta-llama/Llama-3.3-70B-Instruct".to_string(),
            api_key: None,
            api_key_env: None,
            port: 8000,
            timeout_secs: 180,
            max_retries: 3,
            retry_delay_secs: 1.0,
        }
    }
}

impl EndpointConfig {
    /// Defaults for the hosted `[api-endpoint]` section.
    pub fn api_endpoint() -> Self {
        Self {
            api_base: "https://api.llama.com/v1".to_string(),
            model: "Llama-4-Maverick-17B-128E-Instruct-FP8".to_string(),
            api_key_env: Some("API_ENDPOINT_KEY".to_string()),
            ..Self::default()
        }
    }
}

/// `[api-endpoint]` keys laid over the hosted defaults.
///
/// Plain `#[serde(default)]` would fill missing keys from the vLLM defaults.
fn api_endpoint_section<'de, D>(deserializer: D) -> Result<EndpointConfig, D::Error>
where
    D: Deserializer<'de>,
{
    let section = toml::Table::deserialize(deserializer)?;
    let toml::Value::Table(mut merged) =
        toml::Value::try_from(EndpointConfig::api_endpoint()).map_err(D::Error::custom)?
    else {
        return Err(D::Error::custom("endpoint defaults are not a table"));
    };
    merged.extend(section);
    toml::Value::Table(merged).try_into().map_err(D::Error::custom)
}

/// Generation settings (create stage).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub temperature: f64,
    pub top_p: f64,
    /// Max characters per text chunk
    pub chunk_size: usize,
    /// Max characters carried over between chunks
    pub overlap: usize,
    pub max_tokens: u32,
    pub num_pairs: usize,
    pub num_cot_examples: usize,
    /// Unset means enhance every conversation
    pub num_cot_enhance_examples: Option<usize>,
    /// Requests sent concurrently per batch
    pub batch_size: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            chunk_size: 4000,
            overlap: 200,
            max_tokens: 4096,
            num_pairs: 25,
            num_cot_examples: 5,
            num_cot_enhance_examples: None,
            batch_size: 32,
        }
    }
}

/// Curation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CurateConfig {
    /// Minimum rating (1-10) to keep a pair
    pub threshold: f64,
    /// Pairs rated per request
    pub batch_size: usize,
    pub temperature: f64,
}

impl Default for CurateConfig {
    fn default() -> Self {
        Self {
            threshold: 7.0,
            batch_size: 8,
            temperature: 0.1,
        }
    }
}

/// Output format settings (save-as stage).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    /// Format tag used when `--format` is absent
    pub default: String,
    /// Attach generation metadata to created files
    pub include_metadata: bool,
    pub pretty_json: bool,
}

impl Default for FormatConfig {
    fn default() -> Self {
        Self {
            default: "jsonl".to_string(),
            include_metadata: true,
            pretty_json: true,
        }
    }
}

/// Prompt templates. Placeholders are written `{name}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    pub summary: String,
    pub qa_generation: String,
    pub qa_rating: String,
    pub cot_generation: String,
    pub cot_enhancement: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            summary: "Summarize this document in 3-5 sentences, focusing on the main topic and key concepts.".to_string(),
            qa_generation: r#"Create {num_pairs} question-answer pairs from this text for LLM training.

Rules:
1. Questions must be about important facts in the text
2. Answers must be directly supported by the text
3. Return JSON format only:

[
  {
    "question": "Question 1?",
    "answer": "Answer 1."
  },
  {
    "question": "Question 2?",
    "answer": "Answer 2."
  }
]

Document summary: {summary}

Text:
{text}"#
                .to_string(),
            qa_rating: r#"Rate each of these question-answer pairs for quality and return exactly this JSON format:

[
  {"question": "same question text", "answer": "same answer text", "rating": n}
]

Where n is a number from 1-10.

DO NOT include any text outside of the JSON array, just return valid JSON:

{pairs}"#
                .to_string(),
            cot_generation: r#"Create {num_examples} complex reasoning examples from this text that demonstrate chain-of-thought thinking.

Each example should have:
1. A challenging question that requires step-by-step reasoning
2. Detailed reasoning steps that break down the problem
3. A concise final answer

Return JSON format only:

[
  {
    "question": "Complex question about the text?",
    "reasoning": "Step 1: First, I need to consider...\nStep 2: Then, I analyze...\nStep 3: Finally, I can conclude...",
    "answer": "Final answer based on the reasoning."
  }
]

Text:
{text}"#
                .to_string(),
            cot_enhancement: r#"You are an expert reasoning assistant. Your task is to enhance the given conversations by adding chain-of-thought reasoning.

For each conversation, add detailed step-by-step reasoning to the assistant's responses while preserving the original answer.

{include_simple_steps} = Whether to add reasoning to simple responses too. If false, only add reasoning to complex responses.

Return the enhanced conversations as a JSON array matching this format:
[
  [
    {"role": "system", "content": "System message"},
    {"role": "user", "content": "User question"},
    {"role": "assistant", "content": "Let me think through this step by step:\n\n1. First, I need to consider...\n2. Then...\n\nTherefore, [original answer]"}
  ]
]

Original conversations:
{conversations}"#
                .to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// B_i(file exists) → Result
    /// B_i(file is valid TOML) → Result
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.to_owned(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_owned(),
            source: e,
        })
    }

    /// Load the explicit config file, else `synthkit.toml` if present, else defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let fallback = Path::new(DEFAULT_CONFIG_FILE);
                if fallback.is_file() {
                    Self::from_file(fallback)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Settings block of the given provider.
    pub fn endpoint(&self, provider: Provider) -> &EndpointConfig {
        match provider {
            Provider::Vllm => &self.vllm,
            Provider::ApiEndpoint => &self.api_endpoint,
        }
    }

    /// Check value ranges that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |field: &str, reason: &str| ConfigError::InvalidValue {
            field: field.to_string(),
            reason: reason.to_string(),
        };

        if self.generation.chunk_size == 0 {
            return Err(invalid("generation.chunk_size", "must be greater than 0"));
        }
        if self.generation.batch_size == 0 {
            return Err(invalid("generation.batch_size", "must be greater than 0"));
        }
        if self.curate.batch_size == 0 {
            return Err(invalid("curate.batch_size", "must be greater than 0"));
        }
        if !(0.0..=10.0).contains(&self.curate.threshold) {
            return Err(invalid("curate.threshold", "must be between 0 and 10"));
        }
        for (name, endpoint) in [("vllm", &self.vllm), ("api-endpoint", &self.api_endpoint)] {
            if endpoint.max_retries == 0 {
                return Err(invalid(
                    &format!("{name}.max_retries"),
                    "must be at least 1",
                ));
            }
        }
        Ok(())
    }
}

/// Command-line values that take precedence over the config file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<Provider>,
    pub api_base: Option<String>,
    pub model: Option<String>,
}

/// Resolved endpoint settings for the selected provider.
#[derive(Debug, Clone)]
pub struct EndpointSettings {
    pub provider: Provider,
    pub api_base: String,
    pub model: String,
    pub api_key: Option<String>,
    pub api_key_env: Option<String>,
    pub port: u16,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_delay_secs: f64,
}

/// Immutable configuration snapshot for one CLI invocation.
///
/// K_i: Resolved once (flag > file > default), then shared read-only by
/// every worker of a batch through an `Arc`.
#[derive(Debug, Clone)]
pub struct StageConfig {
    pub endpoint: EndpointSettings,
    pub paths: PathsConfig,
    pub generation: GenerationConfig,
    pub curate: CurateConfig,
    pub format: FormatConfig,
    pub prompts: PromptConfig,
}

impl StageConfig {
    /// Collapse file values and command-line overrides into a snapshot.
    pub fn resolve(config: &Config, overrides: &Overrides) -> Self {
        let provider = overrides.provider.unwrap_or(config.llm.provider);
        let endpoint = config.endpoint(provider);

        let api_key = resolve_api_key(endpoint, env_lookup);

        Self {
            endpoint: EndpointSettings {
                provider,
                api_base: overrides
                    .api_base
                    .clone()
                    .unwrap_or_else(|| expand_env_vars(&endpoint.api_base))
                    .trim_end_matches('/')
                    .to_string(),
                model: overrides
                    .model
                    .clone()
                    .unwrap_or_else(|| expand_env_vars(&endpoint.model)),
                api_key,
                api_key_env: endpoint.api_key_env.clone(),
                port: endpoint.port,
                timeout_secs: endpoint.timeout_secs,
                max_retries: endpoint.max_retries.max(1),
                retry_delay_secs: endpoint.retry_delay_secs,
            },
            paths: config.paths.clone(),
            generation: config.generation.clone(),
            curate: config.curate.clone(),
            format: config.format.clone(),
            prompts: config.prompts.clone(),
        }
    }
}

fn env_lookup(var: &str) -> Option<String> {
    std::env::var(var).ok()
}

/// API key lookup: environment variable first, then the config value.
fn resolve_api_key(endpoint: &EndpointConfig, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    if let Some(key) = endpoint
        .api_key_env
        .as_deref()
        .and_then(&lookup)
        .filter(|key| !key.is_empty())
    {
        return Some(key);
    }

    endpoint
        .api_key
        .as_deref()
        .map(|key| expand_with(key, &lookup))
}

static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("static env var pattern"));

/// Expand environment variables in a string.
///
/// Supports ${VAR_NAME} syntax.
/// If the variable is not set, the placeholder is left unchanged.
pub fn expand_env_vars(s: &str) -> String {
    expand_with(s, env_lookup)
}

fn expand_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    ENV_VAR_RE
        .replace_all(s, |caps: &regex::Captures| {
            lookup(&caps[1]).unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

/// Configuration errors.
///
/// Epistemic origin:
/// - B_i falsified: File not found, parse error, out-of-range value
/// - I^B materialized: Missing required values
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Missing API key for provider '{provider}': set {env_var} env var or api_key in config")]
    MissingApiKey { provider: String, env_var: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}
