//! reqwest-backed transport

use futures_util::{StreamExt, stream};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, Response};
use tracing::debug;

use super::{EventStream, RequestBody, ResolvedRequest, Transport, TransportError, TransportEvent};
use crate::config::HttpConfig;
use crate::request::Method;

/// Longest error body kept in a `Status` error
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &HttpConfig) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(config.connect_timeout())
            .timeout(config.request_timeout())
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| TransportError::Request(e.to_string()))?;

        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn execute(
        client: Client,
        request: ResolvedRequest,
        body: Option<RequestBody>,
    ) -> Result<Response, TransportError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
        };
        debug!(%method, url = %request.url, "Sending request");

        let mut builder = client.request(method, request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }

        if let Some(RequestBody::Multipart {
            field,
            filename,
            mimetype,
            length,
            content,
        }) = body
        {
            let part = Part::stream_with_length(Body::wrap_stream(content), length)
                .file_name(filename)
                .mime_str(&mimetype)
                .map_err(|e| TransportError::Request(format!("invalid mimetype: {e}")))?;
            builder = builder.multipart(Form::new().part(field, part));
        }

        let response = builder.send().await.map_err(map_send_error)?;

        let status = response.status();
        if !status.is_success() {
            let mut text = response.text().await.unwrap_or_default();
            if text.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| text.is_char_boundary(*i))
                    .unwrap_or(0);
                text.truncate(cut);
            }
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: text,
            });
        }

        Ok(response)
    }
}

fn map_send_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout
    } else {
        TransportError::Request(e.to_string())
    }
}

impl Transport for HttpTransport {
    fn send(&self, request: ResolvedRequest, body: Option<RequestBody>) -> EventStream {
        let client = self.client.clone();

        let exchange = async move {
            let response = match Self::execute(client, request, body).await {
                Ok(response) => response,
                Err(e) => return stream::once(async move { Err(e) }).boxed(),
            };

            let head = TransportEvent::Response {
                status: response.status().as_u16(),
                content_length: response.content_length(),
            };
            let chunks = response.bytes_stream().map(|chunk| {
                chunk.map(TransportEvent::Chunk).map_err(|e| {
                    if e.is_timeout() {
                        TransportError::Timeout
                    } else {
                        TransportError::Body(e.to_string())
                    }
                })
            });

            stream::once(async move { Ok(head) })
                .chain(chunks)
                .chain(stream::once(async { Ok(TransportEvent::Complete) }))
                .boxed()
        };

        stream::once(exchange).flatten().boxed()
    }
}
