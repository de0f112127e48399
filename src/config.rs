//! WolfBlob Configuration
//!
//! Configuration structures for the storage gateway. Values come from an
//! optional TOML file and are then overridden by the environment
//! (`PORT`, `AZURE_STORAGE_CONN`, `AZURE_CONTAINER`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the listen port
pub const ENV_PORT: &str = "PORT";
/// Environment variable holding the storage connection string
pub const ENV_CONNECTION_STRING: &str = "AZURE_STORAGE_CONN";
/// Environment variable holding the target container name
pub const ENV_CONTAINER: &str = "AZURE_CONTAINER";

/// Main WolfBlob configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WolfBlobConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Storage backend configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host/interface to bind
    #[serde(default = "default_bind_host")]
    pub bind_host: String,

    /// Listen port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Enable permissive CORS
    #[serde(default)]
    pub cors_enabled: bool,

    /// Maximum accepted upload body in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

/// Which object store implementation backs the gateway
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Azure Blob Storage over its REST API
    Azure,
    /// In-process store, contents are lost on exit
    Memory,
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendKind::Azure => write!(f, "azure"),
            BackendKind::Memory => write!(f, "memory"),
        }
    }
}

/// Storage backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend implementation
    #[serde(default = "default_backend")]
    pub backend: BackendKind,

    /// Storage account connection string (required for azure)
    #[serde(default)]
    pub connection_string: Option<String>,

    /// Target container for /files, /upload and /download
    #[serde(default = "default_container")]
    pub container: String,

    /// Directory where multipart uploads are staged before transfer
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (pretty, json)
    #[serde(default = "default_log_format")]
    pub format: String,
}

// Default value functions
fn default_bind_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_max_upload_mb() -> usize {
    512
}

fn default_backend() -> BackendKind {
    BackendKind::Azure
}

fn default_container() -> String {
    "development".to_string()
}

fn default_staging_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: default_bind_host(),
            port: default_port(),
            cors_enabled: false,
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            connection_string: None,
            container: default_container(),
            staging_dir: default_staging_dir(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl WolfBlobConfig {
    /// Load configuration for the server.
    ///
    /// The file is optional: when it does not exist the defaults are used.
    /// Environment overrides are applied last, then the result is validated.
    pub fn load(path: &Path) -> crate::Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            toml::from_str(&content)?
        } else {
            tracing::debug!("No configuration file at {:?}, using defaults", path);
            WolfBlobConfig::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file, without environment overrides
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML string
    pub fn parse(content: &str) -> crate::Result<Self> {
        let config: WolfBlobConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides using the given variable lookup.
    ///
    /// An unparseable `PORT` is ignored and the configured port is kept.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(port) = lookup(ENV_PORT) {
            match port.trim().parse::<u16>() {
                Ok(p) => self.server.port = p,
                Err(_) => tracing::warn!("Ignoring invalid {} value {:?}", ENV_PORT, port),
            }
        }

        if let Some(conn) = lookup(ENV_CONNECTION_STRING).filter(|c| !c.trim().is_empty()) {
            self.storage.connection_string = Some(conn);
        }

        if let Some(container) = lookup(ENV_CONTAINER).filter(|c| !c.trim().is_empty()) {
            self.storage.container = container;
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        if self.server.port == 0 {
            return Err(crate::Error::Config("server.port cannot be 0".into()));
        }

        if self.server.max_upload_mb == 0 {
            return Err(crate::Error::Config("server.max_upload_mb cannot be 0".into()));
        }

        if self.storage.container.trim().is_empty() {
            return Err(crate::Error::Config("storage.container cannot be empty".into()));
        }

        if self.storage.backend == BackendKind::Azure
            && self
                .storage
                .connection_string
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
        {
            return Err(crate::Error::Config(format!(
                "storage.connection_string (or {}) is required for the azure backend",
                ENV_CONNECTION_STRING
            )));
        }

        Ok(())
    }

    /// Address the HTTP server binds to
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.bind_host, self.server.port)
    }

    /// Upload body limit in bytes
    pub fn max_upload_bytes(&self) -> usize {
        self.server.max_upload_mb.saturating_mul(1024 * 1024)
    }

    /// Render a sample configuration file
    pub fn sample() -> crate::Result<String> {
        let mut config = WolfBlobConfig::default();
        config.storage.connection_string = Some(
            "DefaultEndpointsProtocol=https;AccountName=<account>;AccountKey=<key>;EndpointSuffix=core.windows.net"
                .to_string(),
        );
        Ok(toml::to_string_pretty(&config)?)
    }
}
