// Configuration management
// Layers: built-in defaults < TOML config file < environment (.env included) < CLI flags


use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;
use url::Url;

use crate::schema::CollectionSchema;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 19530;
pub const DEFAULT_BATCH_SIZE: usize = 1000;

const HOST_VARS: [&str; 2] = ["HOST", "MILVUS_HOST"];
const PORT_VARS: [&str; 2] = ["PORT", "MILVUS_PORT"];
const TOKEN_VAR: &str = "MILVUS_TOKEN";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Config {
    #[serde(default)]
    pub milvus: MilvusConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub schema: CollectionSchema,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MilvusConfig {
    pub protocol: String,
    pub host: String,
    pub port: u16,
    /// Bearer token, `user:password` or an API key
    pub token: Option<String>,
    pub timeout_seconds: u64,
    pub retry_attempts: u32,
    pub load_timeout_seconds: u64,
    pub load_poll_interval_ms: u64,
}

impl Default for MilvusConfig {
    fn default() -> Self {
        Self {
            protocol: "http".to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            token: None,
            timeout_seconds: 30,
            retry_attempts: 3,
            load_timeout_seconds: 300,
            load_poll_interval_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum number of rows sent in one insert request
    pub batch_size: usize,
    /// Issue the create-index call again once all rows are inserted
    pub rebuild_index_after_insert: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            rebuild_index_after_insert: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration directory not found")]
    DirectoryError,
    #[error("Invalid URL format: {0}")]
    InvalidUrl(String),
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(String),
    #[error("Invalid protocol: {0} (must be 'http' or 'https')")]
    InvalidProtocol(String),
    #[error("Invalid host: {0:?} (cannot be empty)")]
    InvalidHost(String),
    #[error("Invalid batch size: {0} (must be between 1 and 100000)")]
    InvalidBatchSize(usize),
    #[error("Invalid embedding dimension: {0} (must be between 1 and 32768)")]
    InvalidEmbeddingDimension(u32),
    #[error("Invalid max content length: {0} (must be between 1 and 65535)")]
    InvalidMaxContentLength(u32),
    #[error("Invalid timeout: {0} seconds (must be greater than 0)")]
    InvalidTimeout(u64),
    #[error("Invalid retry attempts: {0} (must be between 1 and 10)")]
    InvalidRetryAttempts(u32),
    #[error("Invalid index name: {0:?} (cannot be empty)")]
    InvalidIndexName(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Config {
    /// Directory holding the default config file
    #[inline]
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::home_dir()
            .map(|home| home.join(".milvus-ingest"))
            .ok_or(ConfigError::DirectoryError)
    }

    #[inline]
    pub fn default_config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load a config file, falling back to defaults when it does not exist
    #[inline]
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        let config_path = config_path.as_ref();

        if !config_path.exists() {
            debug!(
                "No config file at {}, using defaults",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;

        debug!("Loaded config from {}", config_path.display());
        Ok(config)
    }

    /// Resolve the full configuration: file, then `.env` and process environment
    ///
    /// An explicit `config_path` must exist; the default location is optional.
    #[inline]
    pub fn resolve(config_path: Option<&Path>) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => {
                if !path.exists() {
                    anyhow::bail!("Config file not found: {}", path.display());
                }
                Self::load(path)
                    .with_context(|| format!("Failed to load config file: {}", path.display()))?
            }
            None => match Self::default_config_path() {
                Ok(path) => Self::load(&path)
                    .with_context(|| format!("Failed to load config file: {}", path.display()))?,
                Err(_) => Self::default(),
            },
        };

        if let Ok(path) = dotenvy::dotenv() {
            debug!("Loaded environment from {}", path.display());
        }

        config.apply_env(|key| env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Override connection settings from environment variables
    ///
    /// `HOST`/`PORT` win over `MILVUS_HOST`/`MILVUS_PORT`. Empty values are ignored.
    #[inline]
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let first_set = |keys: &[&str]| {
            keys.iter()
                .filter_map(|key| lookup(*key))
                .find(|value| !value.trim().is_empty())
        };

        if let Some(host) = first_set(HOST_VARS.as_slice()) {
            self.milvus.host = host.trim().to_string();
        }

        if let Some(port) = first_set(PORT_VARS.as_slice()) {
            self.milvus.set_port_str(&port)?;
        }

        if let Some(token) = first_set([TOKEN_VAR].as_slice()) {
            self.milvus.token = Some(token);
        }

        Ok(())
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.milvus.validate()?;
        self.validate_ingest()?;
        self.validate_schema()?;
        Ok(())
    }

    fn validate_ingest(&self) -> Result<(), ConfigError> {
        if !(1..=100_000).contains(&self.ingest.batch_size) {
            return Err(ConfigError::InvalidBatchSize(self.ingest.batch_size));
        }
        Ok(())
    }

    fn validate_schema(&self) -> Result<(), ConfigError> {
        let schema = &self.schema;

        if !(1..=32768).contains(&schema.dimension) {
            return Err(ConfigError::InvalidEmbeddingDimension(schema.dimension));
        }

        if !(1..=65535).contains(&schema.max_content_length) {
            return Err(ConfigError::InvalidMaxContentLength(
                schema.max_content_length,
            ));
        }

        if schema.index.name.trim().is_empty() {
            return Err(ConfigError::InvalidIndexName(schema.index.name.clone()));
        }

        Ok(())
    }
}

impl MilvusConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.protocol != "http" && self.protocol != "https" {
            return Err(ConfigError::InvalidProtocol(self.protocol.clone()));
        }

        if self.host.trim().is_empty() {
            return Err(ConfigError::InvalidHost(self.host.clone()));
        }

        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port.to_string()));
        }

        self.base_url()?;

        if self.timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout(self.timeout_seconds));
        }

        if self.load_timeout_seconds == 0 {
            return Err(ConfigError::InvalidTimeout(self.load_timeout_seconds));
        }

        if !(1..=10).contains(&self.retry_attempts) {
            return Err(ConfigError::InvalidRetryAttempts(self.retry_attempts));
        }

        Ok(())
    }

    /// `host:port` address of the Milvus service
    #[inline]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    #[inline]
    pub fn base_url(&self) -> Result<Url, ConfigError> {
        let url_str = format!("{}://{}", self.protocol, self.address());
        Url::parse(&url_str).map_err(|_| ConfigError::InvalidUrl(url_str))
    }

    #[inline]
    pub fn set_host(&mut self, host: String) -> Result<(), ConfigError> {
        if host.trim().is_empty() {
            return Err(ConfigError::InvalidHost(host));
        }
        self.host = host;
        Ok(())
    }

    #[inline]
    pub fn set_port(&mut self, port: u16) -> Result<(), ConfigError> {
        if port == 0 {
            return Err(ConfigError::InvalidPort(port.to_string()));
        }
        self.port = port;
        Ok(())
    }

    fn set_port_str(&mut self, port: &str) -> Result<(), ConfigError> {
        let parsed = port
            .trim()
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort(port.to_string()))?;
        self.set_port(parsed)
    }
}
