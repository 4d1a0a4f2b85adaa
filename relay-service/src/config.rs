//! Service configuration.
//!
//! Values come from an optional `config` file in the working directory and
//! from `RELAY_`-prefixed environment variables (see [`loader`]).

mod loader;

pub use loader::load_config;

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration for the relay service
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    #[serde(default = "default_server")]
    pub server: ServerConfig,

    #[serde(default = "default_storage")]
    pub storage: StorageConfig,

    #[serde(default = "default_openai")]
    pub openai: OpenAiConfig,

    #[serde(default = "default_limits")]
    pub limits: LimitsConfig,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            storage: default_storage(),
            openai: default_openai(),
            limits: default_limits(),
        }
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Browser origin allowed by CORS. When unset, any origin is allowed
    /// (without credentials).
    #[serde(default)]
    pub cors_origin: Option<String>,
}

/// Storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded documents while they are being extracted.
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
}

/// Completion API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Bearer credential. Checked when a request is relayed, not at startup.
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

impl OpenAiConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Size limits
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_max_upload_size")]
    pub max_upload_size_bytes: u64,

    /// How many levels of ZIP-inside-ZIP are followed
    #[serde(default = "default_max_archive_depth")]
    pub max_archive_depth: usize,

    #[serde(default = "default_max_archive_entries")]
    pub max_archive_entries: usize,

    /// Bytes that may be unpacked from a single archive
    #[serde(default = "default_max_archive_unpacked")]
    pub max_archive_unpacked_bytes: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        default_limits()
    }
}

// ==================== Default Value Functions ====================

fn default_server() -> ServerConfig {
    ServerConfig {
        host: default_host(),
        port: default_port(),
        cors_origin: None,
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_storage() -> StorageConfig {
    StorageConfig {
        upload_dir: default_upload_dir(),
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}

fn default_openai() -> OpenAiConfig {
    OpenAiConfig {
        base_url: default_base_url(),
        api_key: None,
        model: default_model(),
        max_tokens: default_max_tokens(),
        temperature: default_temperature(),
        connect_timeout_secs: default_connect_timeout_secs(),
    }
}

fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_max_tokens() -> u32 {
    1550
}

fn default_temperature() -> f32 {
    0.7
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_limits() -> LimitsConfig {
    LimitsConfig {
        max_upload_size_bytes: default_max_upload_size(),
        max_archive_depth: default_max_archive_depth(),
        max_archive_entries: default_max_archive_entries(),
        max_archive_unpacked_bytes: default_max_archive_unpacked(),
    }
}

fn default_max_upload_size() -> u64 {
    52_428_800 // 50MB
}

fn default_max_archive_depth() -> usize {
    2
}

fn default_max_archive_entries() -> usize {
    256
}

fn default_max_archive_unpacked() -> u64 {
    268_435_456 // 256MB
}
