use super::models::Config;
use reqwest::Url;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid source base_url '{url}': {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    #[error("Unsupported base_url scheme '{scheme}', expected 'http' or 'https'")]
    UnsupportedScheme { scheme: String },

    #[error("Source id must not be empty")]
    EmptySourceId,

    #[error("scheduler.max_concurrency must be at least 1")]
    ZeroConcurrency,

    #[error("upload.chunk_size must be positive")]
    ZeroChunkSize,

    #[error("upload.progress_step must be in (0, 1], got {value}")]
    InvalidProgressStep { value: f64 },

    #[error("http.{field} must be positive")]
    ZeroTimeout { field: &'static str },
}

/// Validate the entire configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_source(config)?;
    validate_scheduler(config)?;
    validate_upload(config)?;
    validate_http(config)?;
    Ok(())
}

fn validate_source(config: &Config) -> Result<(), ValidationError> {
    if config.source.id.trim().is_empty() {
        return Err(ValidationError::EmptySourceId);
    }

    let url = Url::parse(&config.source.base_url).map_err(|e| ValidationError::InvalidBaseUrl {
        url: config.source.base_url.clone(),
        reason: e.to_string(),
    })?;

    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ValidationError::UnsupportedScheme {
            scheme: other.to_string(),
        }),
    }
}

fn validate_scheduler(config: &Config) -> Result<(), ValidationError> {
    if config.scheduler.max_concurrency == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }
    Ok(())
}

fn validate_upload(config: &Config) -> Result<(), ValidationError> {
    if config.upload.chunk_size.as_u64() == 0 {
        return Err(ValidationError::ZeroChunkSize);
    }

    let step = config.upload.progress_step;
    if !(step > 0.0 && step <= 1.0) {
        return Err(ValidationError::InvalidProgressStep { value: step });
    }
    Ok(())
}

fn validate_http(config: &Config) -> Result<(), ValidationError> {
    if config.http.connect_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "connect_timeout_secs",
        });
    }
    if config.http.request_timeout_secs == 0 {
        return Err(ValidationError::ZeroTimeout {
            field: "request_timeout_secs",
        });
    }
    Ok(())
}
