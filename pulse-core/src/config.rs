use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

/// Top-level configuration for the telemetry pipeline. Every field has a
/// default, so a bare process with no config file and no environment still
/// starts with sane values.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PulseConfig {
    #[serde(default)]
    pub client: ClientConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ClientConfig {
    /// Base URL of the ingestion service.
    pub endpoint: String,
    /// Stable external endpoint used for the connectivity probe.
    pub probe_url: String,
    pub probe_timeout_seconds: u64,
    /// Hours between scheduled submissions.
    pub submit_interval_hours: u64,
    /// Directory holding the local batch and state files. `None` resolves to
    /// the platform data dir at client construction.
    pub data_dir: Option<PathBuf>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8787".to_string(),
            probe_url: "https://www.google.com/generate_204".to_string(),
            probe_timeout_seconds: 5,
            submit_interval_hours: crate::limits::SUBMIT_INTERVAL.as_secs() / 3600,
            data_dir: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Directory where accepted submissions are persisted, one file each.
    pub storage_dir: PathBuf,
    /// Origins allowed by the CORS layer; `["*"]` allows any.
    pub allowed_origins: Vec<String>,
    /// Salt mixed into the caller-address hash.
    pub ip_salt: String,
    /// Version string reported by /api/health and stamped on records.
    pub service_version: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8787,
            storage_dir: PathBuf::from("telemetry-data"),
            allowed_origins: vec!["*".to_string()],
            ip_salt: "pulse-dev-salt".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl PulseConfig {
    /// Load from an optional TOML file, then apply `PULSE_*` environment
    /// overrides (e.g. `PULSE_SERVER__PORT=9000`).
    pub fn load(path: &str) -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(Environment::with_prefix("PULSE").separator("__"))
            .build()?;
        s.try_deserialize()
    }
}
