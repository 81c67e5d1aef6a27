//! Object metadata resolution and content download
//!
//! A fetch always asks the source for the object's metadata first. Content is
//! only requested once metadata succeeded, and only when the caller asked to
//! download.

mod sink;
mod types;

pub use types::{DownloadedContent, FetchedMedia, MediaInfo, ObjectDescriptor};

use futures_util::StreamExt;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{Result, TransferError};
use crate::observer::{Progress, Reporter};
use crate::request::{self, CachePolicy, LoadRequest, Method};
use crate::source::Source;
use crate::task::DownloadTarget;
use crate::transport::{ResolvedRequest, Transport, TransportEvent, collect_body};
use sink::ContentSink;

/// Format asking the source for JSON metadata instead of content
pub const INFO_FORMAT: &str = "info";

#[derive(Clone)]
pub struct MediaFetcher {
    transport: Arc<dyn Transport>,
    cache_policy: CachePolicy,
}

impl MediaFetcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            cache_policy: CachePolicy::UseProtocol,
        }
    }

    pub fn with_cache_policy(mut self, cache_policy: CachePolicy) -> Self {
        self.cache_policy = cache_policy;
        self
    }

    /// Resolve metadata and, when `should_download` is set, the content.
    ///
    /// Metadata failures are reported as [`TransferError::MetadataFetchFailed`]
    /// and stop the fetch; content failures as [`TransferError::DownloadFailed`],
    /// with partial data discarded.
    pub async fn fetch(
        &self,
        object: &ObjectDescriptor,
        source: &Arc<dyn Source>,
        should_download: bool,
        target: &DownloadTarget,
        reporter: &Reporter<FetchedMedia>,
    ) -> Result<FetchedMedia> {
        let metadata = self.fetch_info(object, source).await?;
        debug!(task_id = %reporter.task_id(), path = %object.link_path, "Metadata resolved");

        if !should_download {
            return Ok(FetchedMedia {
                metadata,
                content: None,
            });
        }

        let content = self
            .download(&metadata, object, source, target, reporter)
            .await?;
        info!(
            task_id = %reporter.task_id(),
            path = %object.link_path,
            bytes = content.len(),
            "Download completed"
        );

        Ok(FetchedMedia {
            metadata,
            content: Some(content),
        })
    }

    pub async fn fetch_info(
        &self,
        object: &ObjectDescriptor,
        source: &Arc<dyn Source>,
    ) -> Result<MediaInfo> {
        let request = LoadRequest::builder()
            .load_path(object.link_path.as_str())
            .format(INFO_FORMAT)
            .acceptable_mimetypes(object.mimetype.iter().cloned().collect())
            .cache_policy(self.cache_policy)
            .build();
        let descriptor = request::build(&request)?;
        let resolved = source.resolve(&descriptor)?;

        let body = collect_body(self.transport.send(resolved, None))
            .await
            .map_err(|e| TransferError::MetadataFetchFailed(e.to_string()))?;

        serde_json::from_slice(&body)
            .map_err(|e| TransferError::MetadataFetchFailed(format!("invalid metadata: {e}")))
    }

    async fn download(
        &self,
        metadata: &MediaInfo,
        object: &ObjectDescriptor,
        source: &Arc<dyn Source>,
        target: &DownloadTarget,
        reporter: &Reporter<FetchedMedia>,
    ) -> Result<DownloadedContent> {
        // Without a content location the metadata is unusable for a download
        let location = metadata.url.as_deref().filter(|u| !u.is_empty()).ok_or_else(|| {
            TransferError::MetadataFetchFailed("metadata does not name a content url".to_string())
        })?;

        let url = source
            .resolve_url(location)
            .map_err(|e| TransferError::DownloadFailed(e.to_string()))?;
        let mut headers = Vec::new();
        if let Some(policy) = self.cache_policy.cache_control() {
            headers.push(("Cache-Control".to_string(), policy.to_string()));
        }
        source.authorize(&url, &mut headers);
        let request = ResolvedRequest {
            method: Method::Get,
            url,
            headers,
        };

        let file_name = types::local_file_name(metadata, object);
        let mut total = metadata.size.or(object.size);
        let mut sink = ContentSink::open(target, &file_name, total)
            .await
            .map_err(|e| TransferError::DownloadFailed(format!("cannot open destination: {e}")))?;

        let mut events = self.transport.send(request, None);
        let mut received = 0u64;

        while let Some(event) = events.next().await {
            match event.map_err(|e| TransferError::DownloadFailed(e.to_string()))? {
                TransportEvent::Response { content_length, .. } => {
                    if content_length.is_some() {
                        total = content_length;
                    }
                }
                TransportEvent::Chunk(chunk) => {
                    received += chunk.len() as u64;
                    sink.write(&chunk)
                        .await
                        .map_err(|e| TransferError::DownloadFailed(format!("write failed: {e}")))?;
                    reporter.progress(download_progress(received, total));
                }
                TransportEvent::Complete => {
                    if total == Some(0) {
                        reporter.progress(Progress::fraction(1.0));
                    }
                    return sink
                        .commit()
                        .await
                        .map_err(|e| TransferError::DownloadFailed(format!("commit failed: {e}")));
                }
            }
        }

        Err(TransferError::DownloadFailed(
            "connection closed before the download completed".to_string(),
        ))
    }
}

fn download_progress(received: u64, total: Option<u64>) -> Progress {
    match total {
        Some(total) if total > 0 => Progress::fraction(received as f64 / total as f64),
        _ => Progress::Indeterminate { received },
    }
}
