use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::agents::{Agent, AgentSet, LlmAgent};
use crate::language_utils;
use crate::pipeline::chunker::{BudgetMeasure, ChunkBoundary};
use crate::pipeline::merge::OutputMode;
use crate::providers::openai::OpenAiCompatible;
use crate::providers::Provider;

/// Application configuration module
/// This module handles loading, validating and saving configuration
/// settings, and builds the agent set the pipeline runs with.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Config {
    /// Source language code (ISO)
    pub source_language: String,

    /// Target language code (ISO)
    pub target_language: String,

    /// Model provider
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Pipeline settings
    #[serde(default)]
    pub pipeline: PipelineSettings,

    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,
}

/// Chat completion backends, all speaking the OpenAI-compatible protocol
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    // @provider: DeepSeek
    #[default]
    DeepSeek,
    // @provider: OpenAI
    OpenAI,
    // @provider: Mistral
    Mistral,
    // @provider: Kimi (Moonshot)
    Kimi,
}

impl ProviderKind {
    // @returns: Capitalized provider name
    pub fn display_name(&self) -> &str {
        match self {
            Self::DeepSeek => "DeepSeek",
            Self::OpenAI => "OpenAI",
            Self::Mistral => "Mistral",
            Self::Kimi => "Kimi",
        }
    }

    // @returns: Lowercase provider identifier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek",
            Self::OpenAI => "openai",
            Self::Mistral => "mistral",
            Self::Kimi => "kimi",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::DeepSeek => "deepseek-chat",
            Self::OpenAI => "gpt-4o",
            Self::Mistral => "mistral-large-latest",
            Self::Kimi => "moonshot-v1-32k",
        }
    }

    pub fn default_endpoint(&self) -> &'static str {
        match self {
            Self::DeepSeek => "https://api.deepseek.com/v1",
            Self::OpenAI => "https://api.openai.com/v1",
            Self::Mistral => "https://api.mistral.ai/v1",
            Self::Kimi => "https://api.moonshot.cn/v1",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProviderKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "deepseek" => Ok(Self::DeepSeek),
            "openai" => Ok(Self::OpenAI),
            "mistral" => Ok(Self::Mistral),
            "kimi" | "moonshot" => Ok(Self::Kimi),
            _ => Err(anyhow!("Invalid provider type: {}", s)),
        }
    }
}

/// Provider configuration
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ProviderConfig {
    // @field: Provider type identifier
    #[serde(rename = "type", default)]
    pub kind: ProviderKind,

    // @field: Model name, empty for the provider default
    #[serde(default = "String::new")]
    pub model_name: String,

    // @field: API key
    #[serde(default = "String::new")]
    pub api_key: String,

    // @field: Service URL, empty for the provider default
    #[serde(default = "String::new")]
    pub endpoint: String,

    // @field: HTTP timeout seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    // @field: Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,
}

impl ProviderConfig {
    // @param kind: Provider enum
    // @returns: Provider config with defaults
    pub fn new(kind: ProviderKind) -> Self {
        Self {
            kind,
            model_name: String::new(),
            api_key: String::new(),
            endpoint: String::new(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
        }
    }

    /// Configured model, or the provider's default
    pub fn model(&self) -> String {
        if self.model_name.is_empty() {
            self.kind.default_model().to_string()
        } else {
            self.model_name.clone()
        }
    }

    /// Configured endpoint, or the provider's default
    pub fn endpoint(&self) -> String {
        if self.endpoint.is_empty() {
            self.kind.default_endpoint().to_string()
        } else {
            self.endpoint.clone()
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self::new(ProviderKind::default())
    }
}

/// Which optional stages run; translation always runs
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct StageToggles {
    #[serde(default = "default_true")]
    pub segment: bool,

    #[serde(default = "default_true")]
    pub proofread: bool,

    /// Review with the bounded improve loop
    #[serde(default = "default_true")]
    pub review: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            segment: true,
            proofread: true,
            review: true,
        }
    }
}

/// Pipeline settings
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PipelineSettings {
    /// Maximum budget per chunk
    #[serde(default = "default_chunk_budget")]
    pub chunk_budget: usize,

    /// Unit the chunk budget is measured in
    #[serde(default)]
    pub budget_measure: BudgetMeasure,

    /// Where full chunks are closed
    #[serde(default)]
    pub chunk_boundary: ChunkBoundary,

    /// Maximum simultaneous agent calls, shared by all files of a batch
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Improver calls allowed per chunk
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Timeout for one agent call in seconds
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Retry count for timed out or rate limited calls
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,

    /// Backoff base for retries (in milliseconds), doubled on each retry
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Deadline for one whole file in seconds, 0 for none.
    /// Chunks unfinished at the deadline keep their source text.
    #[serde(default = "default_file_timeout_secs")]
    pub file_timeout_secs: u64,

    /// Send the translator's input to the reviewer
    #[serde(default = "default_true")]
    pub review_with_source: bool,

    /// Translation only, or source and translation together
    #[serde(default)]
    pub output_mode: OutputMode,

    #[serde(default)]
    pub stages: StageToggles,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            chunk_budget: default_chunk_budget(),
            budget_measure: BudgetMeasure::default(),
            chunk_boundary: ChunkBoundary::default(),
            max_concurrency: default_max_concurrency(),
            max_retries: default_max_retries(),
            call_timeout_secs: default_call_timeout_secs(),
            retry_count: default_retry_count(),
            retry_backoff_ms: default_retry_backoff_ms(),
            file_timeout_secs: default_file_timeout_secs(),
            review_with_source: true,
            output_mode: OutputMode::default(),
            stages: StageToggles::default(),
        }
    }
}

/// Log verbosity level
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_level_filter(self) -> log::LevelFilter {
        match self {
            Self::Error => log::LevelFilter::Error,
            Self::Warn => log::LevelFilter::Warn,
            Self::Info => log::LevelFilter::Info,
            Self::Debug => log::LevelFilter::Debug,
            Self::Trace => log::LevelFilter::Trace,
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "error" => Ok(Self::Error),
            "warn" | "warning" => Ok(Self::Warn),
            "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "trace" => Ok(Self::Trace),
            _ => Err(anyhow!("Invalid log level: {}", s)),
        }
    }
}

fn default_timeout_secs() -> u64 {
    120
}

fn default_temperature() -> f32 {
    0.3
}

fn default_chunk_budget() -> usize {
    2500
}

fn default_max_concurrency() -> usize {
    5
}

fn default_max_retries() -> usize {
    2
}

fn default_call_timeout_secs() -> u64 {
    120
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1000
}

fn default_file_timeout_secs() -> u64 {
    300
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load the configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open config file: {:?}", path))?;
        let reader = BufReader::new(file);
        serde_json::from_reader(reader).with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Write the configuration as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(path, json).with_context(|| format!("Failed to write config file: {:?}", path))
    }

    /// Load the file, or write and return the defaults when it does not exist
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::from_file(path);
        }
        let config = Self::default();
        config.save(path)?;
        log::info!("Created default configuration at {:?}", path);
        Ok(config)
    }

    /// Validate the configuration for consistency and required values.
    ///
    /// The API key is only required when agents will actually call the provider.
    pub fn validate(&self, dry_run: bool) -> Result<()> {
        language_utils::get_language_name(&self.source_language)
            .with_context(|| format!("Invalid source language: {}", self.source_language))?;
        language_utils::get_language_name(&self.target_language)
            .with_context(|| format!("Invalid target language: {}", self.target_language))?;

        if language_utils::language_codes_match(&self.source_language, &self.target_language) {
            return Err(anyhow!(
                "Source and target language are the same: {} / {}",
                self.source_language,
                self.target_language
            ));
        }

        if self.pipeline.max_concurrency == 0 {
            return Err(anyhow!("max_concurrency must be at least 1"));
        }

        let endpoint = self.provider.endpoint();
        Url::parse(&endpoint).with_context(|| format!("Invalid provider endpoint: {}", endpoint))?;

        if !dry_run && self.provider.api_key.is_empty() {
            return Err(anyhow!(
                "API key is required for the {} provider",
                self.provider.kind.display_name()
            ));
        }

        Ok(())
    }

    /// Build one model-backed agent per role over a shared provider client
    pub fn agents(&self) -> AgentSet {
        let provider: Arc<dyn Provider> = Arc::new(
            OpenAiCompatible::new(&self.provider.api_key, self.provider.endpoint(), self.provider.timeout_secs)
                .with_model(self.provider.model()),
        );
        let model = self.provider.model();
        let temperature = self.provider.temperature;

        AgentSet::from_fn(|role| {
            Arc::new(LlmAgent::new(role, Arc::clone(&provider), &model).with_temperature(temperature)) as Arc<dyn Agent>
        })
    }
}

/// Default implementation for Config
impl Default for Config {
    fn default() -> Self {
        Config {
            source_language: "en".to_string(),
            target_language: "zh".to_string(),
            provider: ProviderConfig::default(),
            pipeline: PipelineSettings::default(),
            log_level: LogLevel::default(),
        }
    }
}
