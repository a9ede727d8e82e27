//! Process-wide configuration, sourced from environment variables (with an
//! optional `config/default.yaml` base layer) and exposed through a single
//! `settings()` accessor, mirroring the reference system's
//! `config::settings()` singleton.

use once_cell::sync::OnceCell;
use serde::Deserialize;

static SETTINGS: OnceCell<Settings> = OnceCell::new();

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GmailSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AwsSettings {
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub region: String,
    pub s3_bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PubsubSettings {
    pub project_id: String,
    pub topic_name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WorkerSettings {
    #[serde(default = "default_sync_concurrency")]
    pub email_worker_concurrency: usize,
    #[serde(default = "default_attachment_concurrency")]
    pub attachment_worker_concurrency: usize,
}

fn default_sync_concurrency() -> usize {
    2
}
fn default_attachment_concurrency() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsSettings {
    #[serde(default = "default_prometheus_port")]
    pub prometheus_port: u16,
    #[serde(default = "default_worker_metrics_port")]
    pub worker_metrics_port: u16,
}

fn default_prometheus_port() -> u16 {
    9100
}
fn default_worker_metrics_port() -> u16 {
    9101
}

#[derive(Debug, Clone, Deserialize)]
pub struct TracingSettings {
    pub otel_exporter_otlp_endpoint: Option<String>,
    #[serde(default)]
    pub enable_tracing: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    /// Raw 32-byte key material for the token vault, before decoding.
    pub encryption_key: String,
    pub gmail: GmailSettings,
    pub aws: AwsSettings,
    pub pubsub: PubsubSettings,

    #[serde(default = "default_backend_port")]
    pub backend_port: u16,
    pub frontend_url: String,

    #[serde(default)]
    pub use_queue: bool,

    #[serde(default)]
    pub worker: WorkerSettings,
    #[serde(default)]
    pub metrics: MetricsSettings,
    #[serde(default)]
    pub tracing: TracingSettings,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_backend_port() -> u16 {
    8080
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            email_worker_concurrency: default_sync_concurrency(),
            attachment_worker_concurrency: default_attachment_concurrency(),
        }
    }
}
impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            prometheus_port: default_prometheus_port(),
            worker_metrics_port: default_worker_metrics_port(),
        }
    }
}
impl Default for TracingSettings {
    fn default() -> Self {
        Self {
            otel_exporter_otlp_endpoint: None,
            enable_tracing: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("configuration error: {0}")]
    Source(#[from] config::ConfigError),
    #[error("ENCRYPTION_KEY must decode to exactly 32 bytes, got {0}")]
    BadKeyLength(usize),
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();

        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default").required(false))
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            );

        let raw = builder.build()?;
        let settings: Settings = raw.try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let decoded = base64::Engine::decode(
            &base64::engine::general_purpose::STANDARD,
            &self.encryption_key,
        )
        .map_err(|_| ConfigError::BadKeyLength(0))?;
        if decoded.len() != 32 {
            return Err(ConfigError::BadKeyLength(decoded.len()));
        }
        Ok(())
    }
}

/// Load configuration once and return a process-wide reference. Panics
/// if the environment is malformed — startup should not proceed with a
/// half-configured process.
pub fn settings() -> &'static Settings {
    SETTINGS.get_or_init(|| Settings::load().expect("invalid configuration, refusing to start"))
}

/// Used by tests that want to install a fixed configuration instead of
/// reading the environment.
pub fn try_settings() -> Option<&'static Settings> {
    SETTINGS.get()
}
