//! Engine configuration module
//!
//! Configuration is assembled from defaults, an optional TOML file and
//! environment overrides, in that order.
//!
//! # Sources
//!
//! - `PUNCHQUEUE_CONFIG` or `<config_dir>/punchqueue/config.toml`
//! - `PUNCHQUEUE_ORIGIN`, `PUNCHQUEUE_DATA_DIR`, `PUNCHQUEUE_STORAGE`,
//!   `PUNCHQUEUE_LISTEN`, `PUNCHQUEUE_SESSION_COOKIE`
//!
//! ```rust
//! use punchqueue::shared::config::{EngineConfig, StorageBackend};
//!
//! let config = EngineConfig::builder()
//!     .origin("https://zeit.example.com")
//!     .storage_backend(StorageBackend::Fallback)
//!     .build()
//!     .unwrap();
//! assert_eq!(config.endpoint_url("/punch").as_str(), "https://zeit.example.com/punch");
//! ```

use reqwest::Url;
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default origin of the time-tracking server
pub const DEFAULT_ORIGIN: &str = "http://127.0.0.1:8000";

/// Default cache generation of the app shell
pub const DEFAULT_CACHE_GENERATION: &str = "zeiterfassung-shell-v1";

const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8080";
const DEFAULT_TICK_SECS: u64 = 30;
const DEFAULT_BANNER_HIDE_SECS: u64 = 4;

/// Which queue store backend to use
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Structured database when available, fallback otherwise
    #[default]
    Auto,
    /// Always the structured database
    Structured,
    /// Always the flat key-value fallback
    Fallback,
}

impl std::str::FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(StorageBackend::Auto),
            "structured" | "sqlite" => Ok(StorageBackend::Structured),
            "fallback" | "kv" => Ok(StorageBackend::Fallback),
            other => Err(ConfigError::InvalidValue {
                field: "storage_backend",
                value: other.to_string(),
            }),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Origin the endpoints and app shell live on
    pub origin: Url,
    /// Root directory for per-origin storage
    pub data_dir: PathBuf,
    /// Queue store backend preference
    pub storage_backend: StorageBackend,
    /// Refresh period of the elapsed-time display
    pub tick_interval: Duration,
    /// Optional per-request timeout; `None` uses the platform default
    pub request_timeout: Option<Duration>,
    /// How long a `synced` banner stays visible
    pub banner_hide_after: Duration,
    /// App-shell cache generation name
    pub cache_generation: String,
    /// Listen address of the proxy front
    pub listen_addr: SocketAddr,
    /// `Cookie` header the worker sends when installing login-gated pages
    pub session_cookie: Option<String>,
}

impl EngineConfig {
    /// Create a new EngineConfigBuilder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Load configuration from the config file and environment
    pub fn load() -> Result<Self, ConfigError> {
        let mut builder = EngineConfigBuilder::default();

        if let Some(path) = Self::config_file_path() {
            if path.exists() {
                tracing::info!("Loading configuration from {}", path.display());
                builder = builder.merge_file(&path)?;
            }
        }

        builder.merge_env()?.build()
    }

    fn config_file_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("PUNCHQUEUE_CONFIG") {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("punchqueue").join("config.toml"))
    }

    /// Absolute URL of an origin-relative path
    pub fn endpoint_url(&self, path: &str) -> Url {
        self.origin
            .join(path)
            .unwrap_or_else(|_| self.origin.clone())
    }

    /// Filesystem-safe name of the origin, used to scope storage
    pub fn origin_slug(&self) -> String {
        let host = self.origin.host_str().unwrap_or("local");
        let raw = match self.origin.port_or_known_default() {
            Some(port) => format!("{}_{}_{}", self.origin.scheme(), host, port),
            None => format!("{}_{}", self.origin.scheme(), host),
        };
        raw.chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '-' })
            .collect()
    }

    /// Storage directory for this origin
    pub fn origin_dir(&self) -> PathBuf {
        self.data_dir.join(self.origin_slug())
    }
}

/// Builder for EngineConfig
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    origin: Option<String>,
    data_dir: Option<PathBuf>,
    storage_backend: Option<StorageBackend>,
    tick_interval: Option<Duration>,
    request_timeout: Option<Duration>,
    banner_hide_after: Option<Duration>,
    cache_generation: Option<String>,
    listen_addr: Option<String>,
    session_cookie: Option<String>,
}

/// On-disk configuration file
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    origin: Option<String>,
    data_dir: Option<PathBuf>,
    storage_backend: Option<StorageBackend>,
    tick_interval_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    banner_hide_after_secs: Option<u64>,
    cache_generation: Option<String>,
    listen_addr: Option<String>,
    session_cookie: Option<String>,
}

impl EngineConfigBuilder {
    /// Set the server origin
    pub fn origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    /// Set the storage root directory
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    pub fn storage_backend(mut self, backend: StorageBackend) -> Self {
        self.storage_backend = Some(backend);
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = Some(timeout);
        self
    }

    pub fn banner_hide_after(mut self, after: Duration) -> Self {
        self.banner_hide_after = Some(after);
        self
    }

    pub fn cache_generation(mut self, generation: impl Into<String>) -> Self {
        self.cache_generation = Some(generation.into());
        self
    }

    pub fn listen_addr(mut self, addr: impl Into<String>) -> Self {
        self.listen_addr = Some(addr.into());
        self
    }

    /// Session cookie for fetching pages behind the login
    pub fn session_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.session_cookie = Some(cookie.into());
        self
    }

    /// Apply values from a TOML file
    pub fn merge_file(mut self, path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let file: ConfigFile = toml::from_str(&contents)?;

        if file.origin.is_some() {
            self.origin = file.origin;
        }
        if file.data_dir.is_some() {
            self.data_dir = file.data_dir;
        }
        if file.storage_backend.is_some() {
            self.storage_backend = file.storage_backend;
        }
        if let Some(secs) = file.tick_interval_secs {
            self.tick_interval = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = file.request_timeout_secs {
            self.request_timeout = Some(Duration::from_secs(secs));
        }
        if let Some(secs) = file.banner_hide_after_secs {
            self.banner_hide_after = Some(Duration::from_secs(secs));
        }
        if file.cache_generation.is_some() {
            self.cache_generation = file.cache_generation;
        }
        if file.listen_addr.is_some() {
            self.listen_addr = file.listen_addr;
        }
        if file.session_cookie.is_some() {
            self.session_cookie = file.session_cookie;
        }
        Ok(self)
    }

    /// Apply `PUNCHQUEUE_*` environment overrides
    pub fn merge_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(origin) = std::env::var("PUNCHQUEUE_ORIGIN") {
            self.origin = Some(origin);
        }
        if let Ok(dir) = std::env::var("PUNCHQUEUE_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(backend) = std::env::var("PUNCHQUEUE_STORAGE") {
            self.storage_backend = Some(backend.parse()?);
        }
        if let Ok(addr) = std::env::var("PUNCHQUEUE_LISTEN") {
            self.listen_addr = Some(addr);
        }
        if let Ok(cookie) = std::env::var("PUNCHQUEUE_SESSION_COOKIE") {
            self.session_cookie = Some(cookie);
        }
        Ok(self)
    }

    /// Build the configuration
    pub fn build(self) -> Result<EngineConfig, ConfigError> {
        let origin_raw = self.origin.unwrap_or_else(|| DEFAULT_ORIGIN.to_string());
        let origin =
            Url::parse(&origin_raw).map_err(|_| ConfigError::InvalidUrl(origin_raw.clone()))?;
        if !matches!(origin.scheme(), "http" | "https") || origin.host_str().is_none() {
            return Err(ConfigError::InvalidUrl(origin_raw));
        }

        let data_dir = match self.data_dir {
            Some(dir) => dir,
            None => dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("punchqueue"),
        };

        let listen_raw = self
            .listen_addr
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
        let listen_addr = listen_raw
            .parse::<SocketAddr>()
            .map_err(|_| ConfigError::InvalidValue {
                field: "listen_addr",
                value: listen_raw.clone(),
            })?;

        let cache_generation = self
            .cache_generation
            .unwrap_or_else(|| DEFAULT_CACHE_GENERATION.to_string());
        if cache_generation.trim().is_empty() {
            return Err(ConfigError::MissingValue("cache_generation"));
        }

        let tick_interval = self
            .tick_interval
            .unwrap_or(Duration::from_secs(DEFAULT_TICK_SECS));
        if tick_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                field: "tick_interval",
                value: format!("{:?}", tick_interval),
            });
        }

        Ok(EngineConfig {
            origin,
            data_dir,
            storage_backend: self.storage_backend.unwrap_or_default(),
            tick_interval,
            request_timeout: self.request_timeout,
            banner_hide_after: self
                .banner_hide_after
                .unwrap_or(Duration::from_secs(DEFAULT_BANNER_HIDE_SECS)),
            cache_generation,
            listen_addr,
            session_cookie: self.session_cookie.filter(|c| !c.trim().is_empty()),
        })
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("missing value: {0}")]
    MissingValue(&'static str),
    #[error("invalid value for {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}
