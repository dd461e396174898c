//! Runtime configuration for asset-cache-agent.
//!
//! Configuration is loaded from a JSON file or constructed programmatically.
//! Everything that is fixed per build (namespace, version, manifest) lives
//! here next to the host settings (listen address, upstream, storage path).

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::Url;

use crate::cache::generation::{Generation, GenerationError, DEFAULT_NAMESPACE};
use crate::lifecycle::manifest::AssetManifest;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Invalid upstream origin {origin:?}: {source}")]
    InvalidOrigin {
        origin: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Upstream origin must be http or https: {0}")]
    UnsupportedScheme(String),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

/// Command-line arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "asset-cache-agent",
    version,
    about = "Offline-first asset cache agent for single-page apps"
)]
pub struct Cli {
    /// Path to configuration file (JSON).
    #[arg(short, long, default_value = "config.json")]
    pub config: PathBuf,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    pub listen: Option<String>,

    /// Application version tag (overrides config).
    #[arg(long)]
    pub app_version: Option<String>,

    /// Enable verbose logging.
    #[arg(short, long)]
    pub verbose: bool,
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Proxy server settings.
    pub server: ServerConfig,

    /// Cache generation naming.
    pub generation: GenerationConfig,

    /// Origin the application is served from.
    pub upstream: UpstreamConfig,

    /// Cache storage location.
    pub storage: StorageConfig,

    /// Assets required for offline operation, relative to the origin.
    pub manifest: AssetManifest,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Listen address (e.g. "127.0.0.1:8080").
    pub listen: String,

    /// Maximum request body forwarded to the network, in bytes.
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            max_body_bytes: 16 * 1024 * 1024, // 16 MB
        }
    }
}

/// Generation naming settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Prefix of every cache key.
    pub namespace: String,

    /// Application version; changing it starts a new generation.
    pub version: String,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Upstream origin settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Base URL the manifest and incoming paths are resolved against.
    pub origin: String,

    /// Total request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Connection timeout in seconds.
    pub connect_timeout_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            origin: "http://127.0.0.1:3000/".to_string(),
            request_timeout_secs: 30,
            connect_timeout_secs: 5,
        }
    }
}

/// Cache storage settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one subdirectory per cache store.
    pub cache_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            cache_dir: PathBuf::from("/tmp/asset-cache"),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file, falling back to defaults if it is missing.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            let config: Config = serde_json::from_str(&data)?;
            Ok(config)
        } else {
            tracing::warn!("Config file not found at {:?}, using defaults", path);
            Ok(Config::default())
        }
    }

    /// Apply command-line overrides.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(listen) = &cli.listen {
            self.server.listen = listen.clone();
        }
        if let Some(version) = &cli.app_version {
            self.generation.version = version.clone();
        }
    }

    /// The origin as a URL. Paths are resolved relative to it, so a trailing
    /// slash is added when missing.
    pub fn scope(&self) -> Result<Url, ConfigError> {
        let mut origin = self.upstream.origin.clone();
        if !origin.ends_with('/') {
            origin.push('/');
        }
        let url = Url::parse(&origin).map_err(|source| ConfigError::InvalidOrigin {
            origin: self.upstream.origin.clone(),
            source,
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Build the current generation from the configured namespace and version.
    pub fn generation(&self) -> Result<Generation, ConfigError> {
        Ok(Generation::from_version(
            &self.generation.namespace,
            &self.generation.version,
        )?)
    }

    /// Check everything that can be checked without touching the network.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.scope()?;
        self.generation()?;
        Ok(())
    }
}
