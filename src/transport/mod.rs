//! HTTP transport seam
//!
//! The core only needs `send(request, body) -> stream of events`. Dropping the
//! returned stream aborts the exchange.

mod http;

pub use http::HttpTransport;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::Url;
use std::fmt;
use thiserror::Error;

use crate::request::Method;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("connection timeout")]
    Timeout,

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to read body: {0}")]
    Body(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Descriptor resolved against a source: absolute URL, auth injected
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedRequest {
    pub method: Method,
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

pub type BodyStream = BoxStream<'static, std::io::Result<Bytes>>;

pub enum RequestBody {
    /// Single-part multipart/form-data upload
    Multipart {
        field: String,
        filename: String,
        mimetype: String,
        length: u64,
        content: BodyStream,
    },
}

impl fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestBody::Multipart {
                field,
                filename,
                mimetype,
                length,
                ..
            } => f
                .debug_struct("Multipart")
                .field("field", field)
                .field("filename", filename)
                .field("mimetype", mimetype)
                .field("length", length)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Response head received with a success status
    Response {
        status: u16,
        content_length: Option<u64>,
    },
    Chunk(Bytes),
    Complete,
}

pub type EventStream = BoxStream<'static, Result<TransportEvent, TransportError>>;

pub trait Transport: Send + Sync {
    fn send(&self, request: ResolvedRequest, body: Option<RequestBody>) -> EventStream;
}

/// Drain a response into memory. Errors if the stream ends without `Complete`.
pub async fn collect_body(mut events: EventStream) -> Result<Bytes, TransportError> {
    let mut body = Vec::new();
    while let Some(event) = events.next().await {
        match event? {
            TransportEvent::Response { content_length, .. } => {
                if let Some(len) = content_length {
                    body.reserve(len as usize);
                }
            }
            TransportEvent::Chunk(chunk) => body.extend_from_slice(&chunk),
            TransportEvent::Complete => return Ok(Bytes::from(body)),
        }
    }

    Err(TransportError::Body(
        "connection closed before the response completed".to_string(),
    ))
}
