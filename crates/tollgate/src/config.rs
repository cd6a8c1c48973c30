use std::io::ErrorKind;
use std::path::Path;

use tokio::fs;

use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// Config (root)
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub admission: AdmissionConfig,
    #[serde(default)]
    pub upstreams: UpstreamsConfig,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Maximum accepted inbound request body.
    #[serde(default = "default_body_limit")]
    pub body_limit_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
            body_limit_bytes: default_body_limit(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

fn default_request_timeout() -> u64 {
    300
}

fn default_body_limit() -> usize {
    50 * 1024 * 1024
}

// ============================================================================
// AdmissionConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct AdmissionConfig {
    /// Maximum number of image fetches in flight at once.
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
        }
    }
}

fn default_concurrency_limit() -> usize {
    10
}

// ============================================================================
// UpstreamsConfig
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct UpstreamsConfig {
    #[serde(default = "default_openai_base_url")]
    pub openai_base_url: String,
    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,
    /// Full endpoint URL of the Flux model on fal.run.
    #[serde(default = "default_flux_url")]
    pub flux_url: String,
    /// Cap on a buffered image download.
    #[serde(default = "default_image_max_bytes")]
    pub image_max_bytes: usize,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
}

impl Default for UpstreamsConfig {
    fn default() -> Self {
        Self {
            openai_base_url: default_openai_base_url(),
            anthropic_base_url: default_anthropic_base_url(),
            flux_url: default_flux_url(),
            image_max_bytes: default_image_max_bytes(),
            connect_timeout_seconds: default_connect_timeout(),
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_flux_url() -> String {
    "https://fal.run/fal-ai/flux/dev".to_string()
}

fn default_image_max_bytes() -> usize {
    10 * 1024 * 1024
}

fn default_connect_timeout() -> u64 {
    10
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),
}

// ============================================================================
// Tests
// ============================================================================
