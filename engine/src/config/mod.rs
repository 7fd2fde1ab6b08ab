//! Configuration management
//!
//! This module handles loading, validation, and management of the Cardsmith
//! configuration. Configuration is stored in TOML format at
//! ~/.cardsmith/config.toml.
//!
//! # Configuration Sections
//!
//! - **core**: Log level, data directory
//! - **generation**: Generation service endpoint, models, timeouts
//! - **pipeline**: Chunking, concurrency intensity, acceptance thresholds
//! - **storage**: Blob store backend for source text
//! - **server**: HTTP invocation surface
//! - **quota**: Per-tier card targets
//!
//! # Examples
//!
//! ```no_run
//! use cardsmith_engine::config::Config;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::load_or_create()?;
//! println!("Model: {}", config.generation.model);
//! println!("Parallel requests: {}", config.pipeline.tuning().parallel_requests);
//! # Ok(())
//! # }
//! ```

use sdk::errors::PipelineError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable that overrides `pipeline.intensity`
pub const INTENSITY_ENV: &str = "CARD_GEN_INTENSITY";

const MIN_INTENSITY: f64 = 0.1;
const MAX_INTENSITY: f64 = 1.5;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Core settings
    pub core: CoreConfig,

    /// Generation service settings
    #[serde(default)]
    pub generation: GenerationConfig,

    /// Pipeline tuning and policy constants
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Blob storage for source text
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Quota targets per tier
    #[serde(default)]
    pub quota: QuotaConfig,
}

/// Core configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Data directory path (supports ~ expansion)
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Generation service configuration
///
/// Any OpenAI-compatible chat completions endpoint works.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Base URL of the chat completions API
    #[serde(default = "default_generation_base_url")]
    pub base_url: String,

    /// Model used for regular-sized inputs
    #[serde(default = "default_model")]
    pub model: String,

    /// Model used when the page text exceeds `large_model_cutoff_chars`
    #[serde(default = "default_large_model")]
    pub large_model: String,

    #[serde(default = "default_large_model_cutoff")]
    pub large_model_cutoff_chars: usize,

    /// Name of the environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Per-call timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Base sampling temperature for legislative sources
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Sampling temperature for profile pages
    #[serde(default = "default_profile_temperature")]
    pub profile_temperature: f64,
}

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Single knob scaling concurrency, samples and output budget (0.1-1.5)
    #[serde(default = "default_intensity")]
    pub intensity: f64,

    #[serde(default = "default_chunk_target")]
    pub chunk_target_chars: usize,

    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap_chars: usize,

    /// Run a second wave when the first inserts fewer cards than this
    #[serde(default = "default_min_cards")]
    pub min_cards_before_second_wave: usize,

    /// Maximum rows inserted per batch
    #[serde(default = "default_soft_max_cards")]
    pub soft_max_cards: usize,

    /// Title Jaccard similarity at or above which a title is a near-duplicate
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Token overlap ratio at or above which a snippet supports a claim
    #[serde(default = "default_evidence_threshold")]
    pub evidence_overlap_threshold: f64,

    /// Enforce the evidence gate for sources that carry snippets
    #[serde(default = "default_true")]
    pub require_evidence: bool,

    /// Retries per generation task after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff unit between retries; attempt n waits n * backoff
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Outer wall-clock budget for one invocation
    #[serde(default = "default_invocation_budget")]
    pub invocation_budget_secs: u64,

    /// Source units processed per invocation when none are named explicitly
    #[serde(default = "default_units_per_invocation")]
    pub units_per_invocation: usize,

    /// Profile pages longer than this are truncated before generation
    #[serde(default = "default_profile_text_cap")]
    pub profile_text_cap_chars: usize,

    /// Prefix agenda titles with a broad policy tag
    #[serde(default = "default_true")]
    pub title_tags: bool,
}

/// Runtime knobs derived from `PipelineConfig::intensity`
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tuning {
    pub intensity: f64,
    pub parallel_requests: usize,
    pub samples_per_chunk_wave1: usize,
    pub samples_per_chunk_wave2: usize,
    pub max_output_tokens: u32,
}

/// Blob storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend: "fs" or "http"
    #[serde(default = "default_storage_backend")]
    pub backend: String,

    /// Root directory for the fs backend (defaults to <data_dir>/blobs)
    #[serde(default)]
    pub root: Option<PathBuf>,

    /// Base URL of a public object store for the http backend
    #[serde(default)]
    pub base_url: Option<String>,

    /// Bucket name for the http backend
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

/// Quota targets
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QuotaConfig {
    /// Base tier: cards per screen
    #[serde(default = "default_base_per_screen")]
    pub base_per_screen: u32,

    /// Soft tier: cards per named category
    #[serde(default = "default_soft_per_category")]
    pub soft_per_category: u32,

    /// Hard tier: cards per named category
    #[serde(default = "default_hard_per_category")]
    pub hard_per_category: u32,

    /// Hard tier: overflow ("more") cards per screen
    #[serde(default = "default_hard_overflow")]
    pub hard_overflow_per_screen: u32,
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("~/.cardsmith")
}

fn default_generation_base_url() -> String {
    "https://api.mistral.ai/v1".to_string()
}

fn default_model() -> String {
    "mistral-small-latest".to_string()
}

fn default_large_model() -> String {
    "mistral-large-latest".to_string()
}

fn default_large_model_cutoff() -> usize {
    110_000
}

fn default_api_key_env() -> String {
    "CARDSMITH_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    180
}

fn default_temperature() -> f64 {
    0.2
}

fn default_profile_temperature() -> f64 {
    0.1
}

fn default_intensity() -> f64 {
    1.0
}

fn default_chunk_target() -> usize {
    6_000
}

fn default_chunk_overlap() -> usize {
    1_000
}

fn default_min_cards() -> usize {
    5
}

fn default_soft_max_cards() -> usize {
    250
}

fn default_similarity_threshold() -> f64 {
    0.9
}

fn default_evidence_threshold() -> f64 {
    0.4
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_backoff_ms() -> u64 {
    5_000
}

fn default_invocation_budget() -> u64 {
    300
}

fn default_units_per_invocation() -> usize {
    1
}

fn default_profile_text_cap() -> usize {
    300_000
}

fn default_storage_backend() -> String {
    "fs".to_string()
}

fn default_bucket() -> String {
    "web".to_string()
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

fn default_base_per_screen() -> u32 {
    10
}

fn default_soft_per_category() -> u32 {
    6
}

fn default_hard_per_category() -> u32 {
    10
}

fn default_hard_overflow() -> u32 {
    5
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_generation_base_url(),
            model: default_model(),
            large_model: default_large_model(),
            large_model_cutoff_chars: default_large_model_cutoff(),
            api_key_env: default_api_key_env(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            profile_temperature: default_profile_temperature(),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            intensity: default_intensity(),
            chunk_target_chars: default_chunk_target(),
            chunk_overlap_chars: default_chunk_overlap(),
            min_cards_before_second_wave: default_min_cards(),
            soft_max_cards: default_soft_max_cards(),
            similarity_threshold: default_similarity_threshold(),
            evidence_overlap_threshold: default_evidence_threshold(),
            require_evidence: true,
            max_retries: default_max_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            invocation_budget_secs: default_invocation_budget(),
            units_per_invocation: default_units_per_invocation(),
            profile_text_cap_chars: default_profile_text_cap(),
            title_tags: true,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_storage_backend(),
            root: None,
            base_url: None,
            bucket: default_bucket(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

impl Default for QuotaConfig {
    fn default() -> Self {
        Self {
            base_per_screen: default_base_per_screen(),
            soft_per_category: default_soft_per_category(),
            hard_per_category: default_hard_per_category(),
            hard_overflow_per_screen: default_hard_overflow(),
        }
    }
}

impl PipelineConfig {
    /// Derive concurrency and sampling knobs from the intensity slider
    pub fn tuning(&self) -> Tuning {
        let i = self.intensity.clamp(MIN_INTENSITY, MAX_INTENSITY);
        let scaled =
            |base: f64, slope: f64, lo: f64, hi: f64| (base + slope * i).round().clamp(lo, hi);

        Tuning {
            intensity: i,
            parallel_requests: scaled(5.0, 20.0, 5.0, 30.0) as usize,
            samples_per_chunk_wave1: scaled(1.0, 3.0, 1.0, 6.0) as usize,
            samples_per_chunk_wave2: scaled(0.0, 1.0, 1.0, 3.0) as usize,
            max_output_tokens: scaled(1800.0, 1400.0, 1800.0, 3200.0) as u32,
        }
    }
}

impl Config {
    /// Load configuration from the default location (~/.cardsmith/config.toml)
    ///
    /// If the configuration file doesn't exist, creates a default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Configuration file cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    pub fn load_or_create() -> Result<Self, PipelineError> {
        let config_path = Self::default_config_path()?;

        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Self::create_default(&config_path)
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &Path) -> Result<Self, PipelineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| PipelineError::Config(format!("Failed to read config file: {}", e)))?;

        let mut config: Config = toml::from_str(&contents)
            .map_err(|e| PipelineError::Config(format!("Failed to parse config: {}", e)))?;

        config.validate_and_process()?;

        Ok(config)
    }

    /// Create default configuration and save to path
    fn create_default(path: &Path) -> Result<Self, PipelineError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                PipelineError::Config(format!("Failed to create config directory: {}", e))
            })?;
        }

        let default = Self::default_config();

        let toml_string = toml::to_string_pretty(&default)
            .map_err(|e| PipelineError::Config(format!("Failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| PipelineError::Config(format!("Failed to write config file: {}", e)))?;

        let mut config = default;
        config.validate_and_process()?;

        Ok(config)
    }

    /// Get the default configuration file path (~/.cardsmith/config.toml)
    fn default_config_path() -> Result<PathBuf, PipelineError> {
        let home = dirs::home_dir().ok_or_else(|| {
            PipelineError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(".cardsmith").join("config.toml"))
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            core: CoreConfig::default(),
            generation: GenerationConfig::default(),
            pipeline: PipelineConfig::default(),
            storage: StorageConfig::default(),
            server: ServerConfig::default(),
            quota: QuotaConfig::default(),
        }
    }

    /// Path of the SQLite database inside the data directory
    pub fn db_path(&self) -> PathBuf {
        self.core.data_dir.join("cardsmith.db")
    }

    /// Root directory of the filesystem blob store
    pub fn blob_root(&self) -> PathBuf {
        self.storage
            .root
            .clone()
            .unwrap_or_else(|| self.core.data_dir.join("blobs"))
    }

    /// Validate and process configuration
    ///
    /// This method:
    /// - Validates enumerations and numeric ranges
    /// - Applies the `CARD_GEN_INTENSITY` override and clamps intensity
    /// - Expands ~ in paths and creates the data directory
    pub fn validate_and_process(&mut self) -> Result<(), PipelineError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.core.log_level.as_str()) {
            return Err(PipelineError::Config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.core.log_level,
                valid_log_levels.join(", ")
            )));
        }

        if let Ok(raw) = std::env::var(INTENSITY_ENV) {
            if let Ok(value) = raw.trim().parse::<f64>() {
                if value.is_finite() {
                    self.pipeline.intensity = value;
                }
            }
        }
        if !self.pipeline.intensity.is_finite() {
            self.pipeline.intensity = default_intensity();
        }
        self.pipeline.intensity = self.pipeline.intensity.clamp(MIN_INTENSITY, MAX_INTENSITY);

        for (name, value) in [
            ("similarity_threshold", self.pipeline.similarity_threshold),
            (
                "evidence_overlap_threshold",
                self.pipeline.evidence_overlap_threshold,
            ),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(PipelineError::Config(format!(
                    "{} must be between 0.0 and 1.0",
                    name
                )));
            }
        }

        if self.pipeline.chunk_target_chars == 0 {
            return Err(PipelineError::Config(
                "chunk_target_chars must be greater than 0".to_string(),
            ));
        }
        if self.pipeline.chunk_overlap_chars >= self.pipeline.chunk_target_chars {
            return Err(PipelineError::Config(
                "chunk_overlap_chars must be smaller than chunk_target_chars".to_string(),
            ));
        }

        if self.pipeline.units_per_invocation == 0 {
            return Err(PipelineError::Config(
                "units_per_invocation must be at least 1".to_string(),
            ));
        }

        match self.storage.backend.as_str() {
            "fs" => {}
            "http" => {
                if self.storage.base_url.is_none() {
                    return Err(PipelineError::Config(
                        "storage.base_url is required for the http backend".to_string(),
                    ));
                }
            }
            other => {
                return Err(PipelineError::Config(format!(
                    "Invalid storage backend '{}'. Must be one of: fs, http",
                    other
                )));
            }
        }

        self.core.data_dir = expand_path(&self.core.data_dir)?;
        if let Some(root) = &self.storage.root {
            self.storage.root = Some(expand_path(root)?);
        }

        if !self.core.data_dir.exists() {
            fs::create_dir_all(&self.core.data_dir).map_err(|e| {
                PipelineError::Config(format!("Failed to create data directory: {}", e))
            })?;
        }

        Ok(())
    }
}

/// Expand ~ in path to user's home directory
fn expand_path(path: &Path) -> Result<PathBuf, PipelineError> {
    let path_str = path
        .to_str()
        .ok_or_else(|| PipelineError::Config("Invalid UTF-8 in path".to_string()))?;

    if let Some(rest) = path_str.strip_prefix("~/") {
        let home = dirs::home_dir().ok_or_else(|| {
            PipelineError::Config("Could not determine home directory".to_string())
        })?;

        Ok(home.join(rest))
    } else if path_str == "~" {
        dirs::home_dir()
            .ok_or_else(|| PipelineError::Config("Could not determine home directory".to_string()))
    } else {
        Ok(path.to_path_buf())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_creation() {
        let config = Config::default_config();

        assert_eq!(config.core.log_level, "info");
        assert_eq!(config.pipeline.chunk_target_chars, 6_000);
        assert_eq!(config.pipeline.chunk_overlap_chars, 1_000);
        assert_eq!(config.pipeline.similarity_threshold, 0.9);
        assert_eq!(config.pipeline.evidence_overlap_threshold, 0.4);
        assert_eq!(config.quota.hard_per_category, 10);
        assert_eq!(config.storage.backend, "fs");
    }

    #[test]
    fn test_tuning_at_default_intensity() {
        let tuning = PipelineConfig::default().tuning();

        assert_eq!(tuning.parallel_requests, 25);
        assert_eq!(tuning.samples_per_chunk_wave1, 4);
        assert_eq!(tuning.samples_per_chunk_wave2, 1);
        assert_eq!(tuning.max_output_tokens, 3200);
    }

    #[test]
    fn test_tuning_is_clamped() {
        let low = PipelineConfig {
            intensity: 0.0,
            ..Default::default()
        }
        .tuning();
        assert_eq!(low.intensity, 0.1);
        assert_eq!(low.parallel_requests, 7);
        assert_eq!(low.samples_per_chunk_wave1, 1);
        assert_eq!(low.samples_per_chunk_wave2, 1);
        assert_eq!(low.max_output_tokens, 1940);

        let high = PipelineConfig {
            intensity: 9.0,
            ..Default::default()
        }
        .tuning();
        assert_eq!(high.parallel_requests, 30);
        assert_eq!(high.samples_per_chunk_wave1, 6);
        assert_eq!(high.samples_per_chunk_wave2, 2);
        assert_eq!(high.max_output_tokens, 3200);
    }

    #[test]
    fn test_expand_path_with_tilde() {
        let path = PathBuf::from("~/test");
        let expanded = expand_path(&path).unwrap();

        let home = dirs::home_dir().unwrap();
        assert_eq!(expanded, home.join("test"));
    }

    #[test]
    fn test_expand_path_without_tilde() {
        let path = PathBuf::from("/absolute/path");
        assert_eq!(expand_path(&path).unwrap(), path);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_target() {
        let mut config = Config::default_config();
        config.core.data_dir = std::env::temp_dir().join("cardsmith-config-test");
        config.pipeline.chunk_overlap_chars = config.pipeline.chunk_target_chars;

        let err = config.validate_and_process().unwrap_err();
        assert!(err.to_string().contains("chunk_overlap_chars"));
    }

    #[test]
    fn test_http_backend_requires_base_url() {
        let mut config = Config::default_config();
        config.core.data_dir = std::env::temp_dir().join("cardsmith-config-test");
        config.storage.backend = "http".to_string();

        assert!(config.validate_and_process().is_err());

        config.storage.base_url =
            Some("https://example.supabase.co/storage/v1/object/public".into());
        assert!(config.validate_and_process().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default_config();
        let toml_string = toml::to_string(&config).unwrap();

        let deserialized: Config = toml::from_str(&toml_string).unwrap();
        assert_eq!(config.core.log_level, deserialized.core.log_level);
        assert_eq!(config.generation.model, deserialized.generation.model);
    }

    #[test]
    fn test_minimal_toml_fills_defaults() {
        let config: Config = toml::from_str("[core]\nlog_level = \"debug\"\n").unwrap();
        assert_eq!(config.core.log_level, "debug");
        assert_eq!(config.pipeline.min_cards_before_second_wave, 5);
        assert_eq!(config.server.bind, "127.0.0.1:8787");
    }
}
