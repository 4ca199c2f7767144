//! Configuration management for Recall.
//!
//! Configuration is layered, later sources winning:
//! - Built-in defaults
//! - A YAML config file (`RECALL_CONFIG`, or `./recall.yaml` when present)
//! - Environment variables
//! - Command-line flags

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Default config file looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "recall.yaml";

/// Embedding providers the knowledge crate knows how to construct.
pub const KNOWN_EMBEDDING_PROVIDERS: [&str; 2] = ["trigram", "ollama"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Maximum number of built indexes memorized per knowledge base
    pub max_to_memorize: usize,

    /// Default number of similar documents returned by a query
    pub top_n: usize,

    /// Number of candidates fetched before a search filter is applied
    pub fetch_k: usize,

    /// Embedding provider settings
    pub embedding: EmbeddingSettings,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,
}

/// Embedding provider settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingSettings {
    /// Provider name: "trigram" or "ollama"
    pub provider: String,

    /// Model identifier (provider-specific)
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Provider endpoint, for providers that talk to a server
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "trigram".to_string(),
            model: "trigram-v1".to_string(),
            dimensions: 384,
            endpoint: None,
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    max_to_memorize: Option<usize>,
    top_n: Option<usize>,
    fetch_k: Option<usize>,
    embedding: Option<EmbeddingFileConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct EmbeddingFileConfig {
    provider: Option<String>,
    model: Option<String>,
    dimensions: Option<usize>,
    endpoint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            config_file: None,
            max_to_memorize: 5,
            top_n: 5,
            fetch_k: 20,
            embedding: EmbeddingSettings::default(),
            log_level: None,
            verbose: false,
            no_color: false,
        }
    }
}

impl AppConfig {
    /// Load configuration from the config file, environment variables and defaults.
    ///
    /// Environment variables:
    /// - `RECALL_CONFIG`: Path to config file
    /// - `RECALL_MAX_TO_MEMORIZE`: Index cache bound per knowledge base
    /// - `RECALL_EMBEDDING_PROVIDER`: Embedding provider
    /// - `RECALL_EMBEDDING_MODEL`: Embedding model
    /// - `RECALL_EMBEDDING_DIMENSIONS`: Embedding dimensions
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use recall_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Cache bound: {}", config.max_to_memorize);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with_file(std::env::var("RECALL_CONFIG").ok().map(PathBuf::from))
    }

    /// Like [`AppConfig::load`], reading an explicit config file when one is given.
    pub fn load_with_file(config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self {
            config_file,
            ..Self::default()
        };

        let config_path = match config.config_file {
            Some(ref cf) => {
                if !cf.exists() {
                    return Err(AppError::Config(format!(
                        "Config file does not exist: {:?}",
                        cf
                    )));
                }
                Some(cf.clone())
            }
            None => {
                let default_path = PathBuf::from(DEFAULT_CONFIG_FILE);
                default_path.exists().then_some(default_path)
            }
        };

        if let Some(path) = config_path {
            config = config.merge_yaml(&path)?;
        }

        // Environment variables override YAML config
        if let Ok(value) = std::env::var("RECALL_MAX_TO_MEMORIZE") {
            config.max_to_memorize = parse_env("RECALL_MAX_TO_MEMORIZE", &value)?;
        }

        if let Ok(provider) = std::env::var("RECALL_EMBEDDING_PROVIDER") {
            config.embedding.provider = provider;
        }

        if let Ok(model) = std::env::var("RECALL_EMBEDDING_MODEL") {
            config.embedding.model = model;
        }

        if let Ok(value) = std::env::var("RECALL_EMBEDDING_DIMENSIONS") {
            config.embedding.dimensions = parse_env("RECALL_EMBEDDING_DIMENSIONS", &value)?;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();
        result.config_file = Some(path.to_path_buf());

        if let Some(max) = config_file.max_to_memorize {
            result.max_to_memorize = max;
        }
        if let Some(top_n) = config_file.top_n {
            result.top_n = top_n;
        }
        if let Some(fetch_k) = config_file.fetch_k {
            result.fetch_k = fetch_k;
        }

        if let Some(embedding) = config_file.embedding {
            if let Some(provider) = embedding.provider {
                result.embedding.provider = provider;
            }
            if let Some(model) = embedding.model {
                result.embedding.model = model;
            }
            if let Some(dimensions) = embedding.dimensions {
                result.embedding.dimensions = dimensions;
            }
            if embedding.endpoint.is_some() {
                result.embedding.endpoint = embedding.endpoint;
            }
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(result)
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// CLI flags take precedence over environment variables and the config file.
    pub fn with_overrides(
        mut self,
        max_to_memorize: Option<usize>,
        embedding_provider: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(max) = max_to_memorize {
            self.max_to_memorize = max;
        }

        if let Some(provider) = embedding_provider {
            self.embedding.provider = provider;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Validate the configuration.
    pub fn validate(&self) -> AppResult<()> {
        if self.max_to_memorize == 0 {
            return Err(AppError::Config(
                "max_to_memorize must be at least 1".to_string(),
            ));
        }

        if self.top_n == 0 {
            return Err(AppError::Config("top_n must be at least 1".to_string()));
        }

        let provider = self.embedding.provider.as_str();
        if !KNOWN_EMBEDDING_PROVIDERS.contains(&provider) {
            return Err(AppError::Config(format!(
                "Unknown embedding provider: {}. Supported: {}",
                provider,
                KNOWN_EMBEDDING_PROVIDERS.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "embedding dimensions must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_env(name: &str, value: &str) -> AppResult<usize> {
    value.trim().parse().map_err(|_| {
        AppError::Config(format!(
            "Environment variable {} must be a non-negative integer, got '{}'",
            name, value
        ))
    })
}
