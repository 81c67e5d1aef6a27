//! Outbound request construction
//!
//! Turns a [`LoadRequest`] into a [`RequestDescriptor`]: the target
//! (load path, optional suffix, negotiation query) and an ordered header
//! set. Building is pure: no clock, no network, same input gives a
//! byte-identical descriptor.

mod cache;

pub use cache::CachePolicy;

use bon::Builder;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use std::fmt;

use crate::error::{Result, TransferError};

/// Characters left as-is in query values
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'/')
    .remove(b',')
    .remove(b'.')
    .remove(b'-')
    .remove(b'_')
    .remove(b'*');

pub const FORMAT_PARAM: &str = "format";
pub const MIMETYPES_PARAM: &str = "mimetypes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => f.write_str("GET"),
            Method::Post => f.write_str("POST"),
        }
    }
}

/// Inputs that fully determine a load request
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
pub struct LoadRequest {
    #[builder(into)]
    pub load_path: String,
    /// Server-side representation, e.g. `png` or `info`
    #[builder(into)]
    pub format: Option<String>,
    /// Preference order, first is most preferred
    #[builder(default)]
    pub acceptable_mimetypes: Vec<String>,
    /// Appended verbatim to `load_path`
    #[builder(into)]
    pub path_suffix: Option<String>,
    #[builder(default)]
    pub cache_policy: CachePolicy,
}

/// A request ready to be resolved against a source and handed to a transport
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct RequestDescriptor {
    pub method: Method,
    /// Path plus query, relative to the source's base URL
    pub target: String,
    pub headers: Vec<(String, String)>,
}

impl RequestDescriptor {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Value of a query parameter, still percent-encoded
    pub fn query_param(&self, name: &str) -> Option<&str> {
        let (_, query) = self.target.split_once('?')?;
        query
            .split('&')
            .filter_map(|pair| pair.split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }
}

/// Build the descriptor for a load request
pub fn build(request: &LoadRequest) -> Result<RequestDescriptor> {
    if request.load_path.is_empty() {
        return Err(TransferError::invalid("load path must not be empty"));
    }

    let mut target = request.load_path.clone();
    if let Some(suffix) = &request.path_suffix {
        target.push_str(suffix);
    }

    let mimetypes: Vec<&str> = request
        .acceptable_mimetypes
        .iter()
        .map(|m| m.trim())
        .filter(|m| !m.is_empty())
        .collect();
    let accept = mimetypes.join(",");

    let mut query: Vec<(&str, &str)> = Vec::new();
    if let Some(format) = request.format.as_deref().filter(|f| !f.is_empty()) {
        query.push((FORMAT_PARAM, format));
    }
    if !accept.is_empty() {
        query.push((MIMETYPES_PARAM, &accept));
    }
    append_query(&mut target, &query);

    let mut headers = Vec::new();
    if !accept.is_empty() {
        headers.push(("Accept".to_string(), accept.clone()));
    }
    if let Some(directive) = request.cache_policy.cache_control() {
        headers.push(("Cache-Control".to_string(), directive.to_string()));
    }
    if let Some(pragma) = request.cache_policy.pragma() {
        headers.push(("Pragma".to_string(), pragma.to_string()));
    }

    Ok(RequestDescriptor {
        method: Method::Get,
        target,
        headers,
    })
}

pub fn request_for_load_path(
    load_path: &str,
    format: Option<&str>,
    mimetypes: &[String],
    cache_policy: CachePolicy,
) -> Result<RequestDescriptor> {
    request_for_load_path_appending(load_path, format, mimetypes, None, cache_policy)
}

pub fn request_for_load_path_appending(
    load_path: &str,
    format: Option<&str>,
    mimetypes: &[String],
    suffix: Option<&str>,
    cache_policy: CachePolicy,
) -> Result<RequestDescriptor> {
    let request = LoadRequest::builder()
        .load_path(load_path)
        .maybe_format(format)
        .acceptable_mimetypes(mimetypes.to_vec())
        .maybe_path_suffix(suffix)
        .cache_policy(cache_policy)
        .build();
    build(&request)
}

/// POST descriptor for storing a file under `destination_path`
pub fn upload_request(destination_path: &str) -> Result<RequestDescriptor> {
    if destination_path.is_empty() {
        return Err(TransferError::invalid("destination path must not be empty"));
    }

    Ok(RequestDescriptor {
        method: Method::Post,
        target: destination_path.to_string(),
        headers: vec![("Accept".to_string(), mime::APPLICATION_JSON.to_string())],
    })
}

fn append_query(target: &mut String, params: &[(&str, &str)]) {
    for (i, (key, value)) in params.iter().enumerate() {
        let separator = if i == 0 && !target.contains('?') { '?' } else { '&' };
        target.push(separator);
        target.push_str(key);
        target.push('=');
        target.extend(utf8_percent_encode(value, QUERY_VALUE));
    }
}
