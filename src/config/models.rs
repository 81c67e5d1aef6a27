use crate::humanize::ByteSize;
use crate::request::CachePolicy;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub source: SourceConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub fetch: FetchConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Remote provider
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SourceConfig {
    #[serde(default = "default_source_id")]
    pub id: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Loaded from environment, never from the config file
    #[serde(skip)]
    pub api_key: Option<String>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            id: default_source_id(),
            base_url: default_base_url(),
            api_key: None,
        }
    }
}

fn default_source_id() -> String {
    "api".to_string()
}

fn default_base_url() -> String {
    "http://127.0.0.1:8080/api/path".to_string()
}

/// Worker pool sizing
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Terminal task states remembered for `state()` lookups
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            history_limit: default_history_limit(),
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}

fn default_history_limit() -> usize {
    1024
}

/// HTTP client configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl HttpConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_request_timeout_secs() -> u64 {
    300
}

fn default_user_agent() -> String {
    format!("TransferBox/{}", env!("CARGO_PKG_VERSION"))
}

/// Upload streaming
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: ByteSize,
    /// Minimum fraction between two progress reports
    #[serde(default = "default_progress_step")]
    pub progress_step: f64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            progress_step: default_progress_step(),
        }
    }
}

fn default_chunk_size() -> ByteSize {
    ByteSize(64 * 1024)
}

fn default_progress_step() -> f64 {
    0.01
}

/// Metadata and content fetching
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FetchConfig {
    #[serde(default)]
    pub cache_policy: CachePolicy,
    /// Default directory for downloads made from the CLI
    pub download_dir: Option<PathBuf>,
}

/// Telemetry configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.scheduler.max_concurrency, 4);
        assert_eq!(config.http.connect_timeout(), Duration::from_secs(10));
        assert_eq!(config.upload.chunk_size.as_u64(), 64 * 1024);
        assert_eq!(config.fetch.cache_policy, CachePolicy::UseProtocol);
        assert!(config.http.user_agent.starts_with("TransferBox/"));
        assert!(config.source.api_key.is_none());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
[scheduler]
max_concurrency = 2

[fetch]
cache_policy = "reload_ignoring_cache"
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.max_concurrency, 2);
        assert_eq!(config.scheduler.history_limit, 1024);
        assert_eq!(config.fetch.cache_policy, CachePolicy::ReloadIgnoringCache);
    }
}
