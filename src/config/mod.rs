//! Configuration management for docent
//!
//! Handles loading, saving, and validating configuration from TOML files.

mod defaults;

pub use defaults::*;

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Web crawling configuration
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Chunking configuration
    #[serde(default)]
    pub chunking: ChunkingConfig,

    /// Embedding backend configuration
    #[serde(default)]
    pub embedding: EmbeddingConfig,

    /// Answer generation configuration
    #[serde(default)]
    pub answer: AnswerConfig,

    /// Paths configuration (internal, not user-editable)
    #[serde(skip)]
    pub paths: PathsConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind host
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Bind port
    #[serde(default = "default_server_port")]
    pub port: u16,
}

/// Web crawling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// Maximum pages per job when the request omits it
    #[serde(default = "default_crawler_max_pages")]
    pub max_pages: u32,

    /// Maximum crawl depth when the request omits it
    #[serde(default = "default_crawler_max_depth")]
    pub max_depth: u32,

    /// Number of concurrent fetch workers
    #[serde(default = "default_crawler_workers")]
    pub workers: usize,

    /// Per-fetch timeout in seconds
    #[serde(default = "default_crawler_timeout")]
    pub timeout_secs: u64,

    /// Retries after a failed fetch (timeouts, 5xx, 429)
    #[serde(default = "default_crawler_max_retries")]
    pub max_retries: u32,

    /// Minimum interval between requests to one host (milliseconds)
    #[serde(default = "default_crawler_politeness_delay_ms")]
    pub politeness_delay_ms: u64,

    /// User agent string
    #[serde(default = "default_crawler_user_agent")]
    pub user_agent: String,

    /// Treat allowlisted domains as matching their subdomains too
    #[serde(default)]
    pub allow_subdomains: bool,
}

/// Chunking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Overlap characters between consecutive chunks
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Minimum trimmed chunk length to embed and index
    #[serde(default = "default_min_chunk_chars")]
    pub min_chunk_chars: usize,
}

/// Embedding backend configuration (OpenAI-compatible HTTP)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// Backend base URL
    #[serde(default = "default_embedding_url")]
    pub url: String,

    /// Model name/identifier
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension (must match model)
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Batch size for embedding requests
    #[serde(default = "default_embedding_batch_size")]
    pub batch_size: usize,

    /// Retries for a failed batch (429, 5xx, timeouts)
    #[serde(default = "default_embedding_max_retries")]
    pub max_retries: u32,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Environment variable holding the API key
    #[serde(default = "default_embedding_api_key_env")]
    pub api_key_env: String,
}

/// Answer generation configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerConfig {
    /// Generation backend base URL (OpenAI-compatible)
    #[serde(default = "default_generation_url")]
    pub url: String,

    /// Model name/identifier
    #[serde(default = "default_generation_model")]
    pub model: String,

    /// Maximum tokens for a generated answer
    #[serde(default = "default_generation_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_generation_temperature")]
    pub temperature: f32,

    /// Request timeout in seconds
    #[serde(default = "default_generation_timeout")]
    pub timeout_secs: u64,

    /// Environment variable holding the API key
    #[serde(default = "default_generation_api_key_env")]
    pub api_key_env: String,

    /// Similarity floor below which retrieval counts as a miss
    #[serde(default = "default_similarity_floor")]
    pub similarity_floor: f32,

    /// Confidence threshold when the request omits it
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Citation excerpt length in words
    #[serde(default = "default_max_excerpt_words")]
    pub max_excerpt_words: usize,
}

/// Internal paths configuration
#[derive(Debug, Clone, Default)]
pub struct PathsConfig {
    /// Base directory for docent data
    pub base_dir: PathBuf,

    /// Path to config file
    pub config_file: PathBuf,

    /// Path to SQLite job database
    pub db_file: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            crawler: CrawlerConfig::default(),
            chunking: ChunkingConfig::default(),
            embedding: EmbeddingConfig::default(),
            answer: AnswerConfig::default(),
            paths: PathsConfig::default(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            max_pages: default_crawler_max_pages(),
            max_depth: default_crawler_max_depth(),
            workers: default_crawler_workers(),
            timeout_secs: default_crawler_timeout(),
            max_retries: default_crawler_max_retries(),
            politeness_delay_ms: default_crawler_politeness_delay_ms(),
            user_agent: default_crawler_user_agent(),
            allow_subdomains: false,
        }
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            min_chunk_chars: default_min_chunk_chars(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            url: default_embedding_url(),
            model: default_embedding_model(),
            dimension: default_embedding_dimension(),
            batch_size: default_embedding_batch_size(),
            max_retries: default_embedding_max_retries(),
            timeout_secs: default_embedding_timeout(),
            api_key_env: default_embedding_api_key_env(),
        }
    }
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            url: default_generation_url(),
            model: default_generation_model(),
            max_tokens: default_generation_max_tokens(),
            temperature: default_generation_temperature(),
            timeout_secs: default_generation_timeout(),
            api_key_env: default_generation_api_key_env(),
            similarity_floor: default_similarity_floor(),
            min_confidence: default_min_confidence(),
            max_excerpt_words: default_max_excerpt_words(),
        }
    }
}

impl Config {
    /// Get the default base directory for docent (~/.docent)
    pub fn default_base_dir() -> PathBuf {
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".docent")
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        Self::default_base_dir().join("config.toml")
    }

    /// Initialize paths configuration
    pub fn init_paths(&mut self, base_dir: Option<PathBuf>) {
        let base = base_dir.unwrap_or_else(Self::default_base_dir);
        self.paths = PathsConfig {
            config_file: base.join("config.toml"),
            db_file: base.join("jobs.db"),
            base_dir: base,
        };
    }

    /// Load configuration from a specific file path
    pub fn load(config_path: &Path) -> Result<Self> {
        debug!("Loading config from {:?}", config_path);

        if !config_path.exists() {
            return Err(Error::Config(format!(
                "Config file not found: {}",
                config_path.display()
            )));
        }

        let content = std::fs::read_to_string(config_path)?;
        let mut config: Config = toml::from_str(&content)?;

        // Set up paths based on config file location
        let base = config_path.parent().unwrap_or(Path::new(".")).to_path_buf();
        config.paths = PathsConfig {
            config_file: config_path.to_path_buf(),
            db_file: base.join("jobs.db"),
            base_dir: base,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a base directory, falling back to defaults
    pub fn load_from(base_dir: Option<PathBuf>) -> Result<Self> {
        let mut config = Config::default();
        config.init_paths(base_dir);

        if config.paths.config_file.exists() {
            debug!("Loading config from {:?}", config.paths.config_file);
            let content = std::fs::read_to_string(&config.paths.config_file)?;
            let mut loaded: Config = toml::from_str(&content)?;
            loaded.paths = config.paths;
            config = loaded;
        } else {
            debug!("No config file found, using defaults");
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save(&self) -> Result<()> {
        if let Some(parent) = self.paths.config_file.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&self.paths.config_file, content)?;
        info!("Saved config to {:?}", self.paths.config_file);
        Ok(())
    }

    /// Get the embedding API key from environment
    pub fn embedding_api_key(&self) -> Option<String> {
        std::env::var(&self.embedding.api_key_env).ok()
    }

    /// Get the generation API key from environment
    pub fn generation_api_key(&self) -> Option<String> {
        std::env::var(&self.answer.api_key_env).ok()
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunking.chunk_size == 0 {
            return Err(Error::Config(
                "chunking.chunk_size must be positive".to_string(),
            ));
        }

        if self.chunking.chunk_overlap >= self.chunking.chunk_size {
            return Err(Error::Config(
                "chunking.chunk_overlap must be < chunking.chunk_size".to_string(),
            ));
        }

        if self.crawler.workers == 0 {
            return Err(Error::Config(
                "crawler.workers must be at least 1".to_string(),
            ));
        }

        if self.crawler.max_pages == 0 || self.crawler.max_depth == 0 {
            return Err(Error::Config(
                "crawler.max_pages and crawler.max_depth must be at least 1".to_string(),
            ));
        }

        if self.embedding.dimension == 0 {
            return Err(Error::Config(
                "embedding.dimension must be positive".to_string(),
            ));
        }

        if self.embedding.batch_size == 0 {
            return Err(Error::Config(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.answer.similarity_floor) {
            return Err(Error::Config(
                "answer.similarity_floor must be between 0.0 and 1.0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.answer.min_confidence) {
            return Err(Error::Config(
                "answer.min_confidence must be between 0.0 and 1.0".to_string(),
            ));
        }

        Ok(())
    }
}
