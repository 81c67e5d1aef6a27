//! Remote storage providers
//!
//! A [`Source`] owns the base URL and credentials of a provider. Requests are
//! built relative to it and resolved once, right before they are sent.

use reqwest::Url;
use std::fmt;

use crate::config::SourceConfig;
use crate::error::{Result, TransferError};
use crate::request::RequestDescriptor;
use crate::transport::ResolvedRequest;

pub trait Source: Send + Sync + fmt::Debug {
    fn id(&self) -> &str;

    /// Absolute URL for a request target. Absolute targets pass through.
    fn resolve_url(&self, target: &str) -> Result<Url>;

    /// Inject authentication headers for a request to `url`
    fn authorize(&self, url: &Url, headers: &mut Vec<(String, String)>);

    fn resolve(&self, descriptor: &RequestDescriptor) -> Result<ResolvedRequest> {
        let url = self.resolve_url(&descriptor.target)?;
        let mut headers = descriptor.headers.clone();
        self.authorize(&url, &mut headers);

        Ok(ResolvedRequest {
            method: descriptor.method,
            url,
            headers,
        })
    }
}

/// HTTP API provider authenticated with a bearer key
#[derive(Clone)]
pub struct ApiSource {
    id: String,
    base_url: Url,
    api_key: Option<String>,
}

impl ApiSource {
    pub fn new(id: impl Into<String>, base_url: &str, api_key: Option<String>) -> Result<Self> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransferError::invalid(format!("invalid base url {base_url}: {e}")))?;

        Ok(Self {
            id: id.into(),
            base_url,
            api_key,
        })
    }

    pub fn from_config(config: &SourceConfig) -> Result<Self> {
        Self::new(&config.id, &config.base_url, config.api_key.clone())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn same_origin(&self, url: &Url) -> bool {
        url.scheme() == self.base_url.scheme()
            && url.host_str() == self.base_url.host_str()
            && url.port_or_known_default() == self.base_url.port_or_known_default()
    }
}

// Keeps the key out of logs
impl fmt::Debug for ApiSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiSource")
            .field("id", &self.id)
            .field("base_url", &self.base_url.as_str())
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

impl Source for ApiSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn resolve_url(&self, target: &str) -> Result<Url> {
        if target.starts_with("http://") || target.starts_with("https://") {
            return Url::parse(target)
                .map_err(|e| TransferError::invalid(format!("invalid url {target}: {e}")));
        }

        let base = self.base_url.as_str().trim_end_matches('/');
        let joined = if target.starts_with('/') {
            format!("{base}{target}")
        } else {
            format!("{base}/{target}")
        };

        Url::parse(&joined)
            .map_err(|e| TransferError::invalid(format!("invalid request target {target}: {e}")))
    }

    fn authorize(&self, url: &Url, headers: &mut Vec<(String, String)>) {
        // Never leak the key to third-party hosts (e.g. CDN download links)
        if !self.same_origin(url) {
            return;
        }
        if let Some(key) = &self.api_key {
            headers.push(("Authorization".to_string(), format!("Bearer {key}")));
        }
    }
}
