//! Uploading buffers and local files to a destination path
//!
//! Both entry points build an [`UploadPayload`] and run the same pipeline:
//! validate, build a multipart body streamed in chunks, send, and parse the
//! server's confirmation.

mod progress;

use bytes::Bytes;
use futures_util::{StreamExt, TryStreamExt, stream};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::fs::File;
use tokio_util::io::ReaderStream;
use tracing::info;

use crate::config::UploadConfig;
use crate::error::{Result, TransferError};
use crate::observer::Reporter;
use crate::request;
use crate::source::Source;
use crate::transport::{BodyStream, RequestBody, Transport, collect_body};
use progress::UploadProgress;

/// Multipart field carrying the file
pub const UPLOAD_FIELD: &str = "fileUpload";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadContent {
    Data(Bytes),
    /// Streamed from disk, never fully buffered
    File(PathBuf),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    pub content: UploadContent,
    pub filename: String,
    pub destination_path: String,
    pub mimetype: String,
}

impl UploadPayload {
    pub fn data(
        data: impl Into<Bytes>,
        filename: impl Into<String>,
        destination_path: impl Into<String>,
        mimetype: impl Into<String>,
    ) -> Self {
        Self {
            content: UploadContent::Data(data.into()),
            filename: filename.into(),
            destination_path: destination_path.into(),
            mimetype: mimetype.into(),
        }
    }

    pub fn file(
        local_path: impl Into<PathBuf>,
        filename: impl Into<String>,
        destination_path: impl Into<String>,
        mimetype: impl Into<String>,
    ) -> Self {
        Self {
            content: UploadContent::File(local_path.into()),
            filename: filename.into(),
            destination_path: destination_path.into(),
            mimetype: mimetype.into(),
        }
    }

    /// Checks that need no I/O
    pub fn validate(&self) -> Result<()> {
        if self.filename.trim().is_empty() {
            return Err(TransferError::invalid("filename must not be empty"));
        }
        if self.mimetype.trim().is_empty() {
            return Err(TransferError::invalid("mimetype must not be empty"));
        }
        self.mimetype
            .parse::<mime::Mime>()
            .map_err(|e| TransferError::invalid(format!("invalid mimetype {}: {e}", self.mimetype)))?;
        if self.destination_path.is_empty() {
            return Err(TransferError::invalid("destination path must not be empty"));
        }
        Ok(())
    }
}

/// Server confirmation of a stored upload
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct UploadedAsset {
    /// Confirmed remote path; may differ from the requested one
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default, alias = "type")]
    pub mimetype: Option<String>,
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Clone)]
pub struct AssetUploader {
    transport: Arc<dyn Transport>,
    chunk_size: usize,
    progress_step: f64,
}

impl AssetUploader {
    pub fn new(transport: Arc<dyn Transport>, config: &UploadConfig) -> Self {
        Self {
            transport,
            chunk_size: config.chunk_size.as_usize().max(1),
            progress_step: config.progress_step,
        }
    }

    pub async fn upload_data(
        &self,
        data: Bytes,
        filename: &str,
        destination_path: &str,
        mimetype: &str,
        source: &Arc<dyn Source>,
        reporter: &Reporter<UploadedAsset>,
    ) -> Result<UploadedAsset> {
        let payload = UploadPayload::data(data, filename, destination_path, mimetype);
        self.upload(&payload, source, reporter).await
    }

    pub async fn upload_file(
        &self,
        local_path: PathBuf,
        filename: &str,
        destination_path: &str,
        mimetype: &str,
        source: &Arc<dyn Source>,
        reporter: &Reporter<UploadedAsset>,
    ) -> Result<UploadedAsset> {
        let payload = UploadPayload::file(local_path, filename, destination_path, mimetype);
        self.upload(&payload, source, reporter).await
    }

    pub async fn upload(
        &self,
        payload: &UploadPayload,
        source: &Arc<dyn Source>,
        reporter: &Reporter<UploadedAsset>,
    ) -> Result<UploadedAsset> {
        payload.validate()?;

        let descriptor = request::upload_request(&payload.destination_path)?;
        let resolved = source.resolve(&descriptor)?;

        let (length, content) = self.open_content(&payload.content).await?;
        let mut tracker = UploadProgress::new(length, self.progress_step, reporter.sink());
        let content: BodyStream = content
            .inspect_ok(move |chunk| tracker.advance(chunk.len() as u64))
            .boxed();

        let body = RequestBody::Multipart {
            field: UPLOAD_FIELD.to_string(),
            filename: payload.filename.clone(),
            mimetype: payload.mimetype.clone(),
            length,
            content,
        };

        let response = collect_body(self.transport.send(resolved, Some(body)))
            .await
            .map_err(|e| TransferError::UploadFailed(e.to_string()))?;

        let mut asset: UploadedAsset = serde_json::from_slice(&response)
            .map_err(|e| TransferError::UploadFailed(format!("invalid upload response: {e}")))?;
        if asset.path.is_empty() {
            asset.path = payload.destination_path.clone();
        }

        info!(
            task_id = %reporter.task_id(),
            path = %asset.path,
            bytes = length,
            "Upload completed"
        );
        Ok(asset)
    }

    async fn open_content(&self, content: &UploadContent) -> Result<(u64, BodyStream)> {
        match content {
            UploadContent::Data(data) => Ok((data.len() as u64, chunked(data.clone(), self.chunk_size))),
            UploadContent::File(path) => {
                let file = File::open(path).await.map_err(|e| {
                    TransferError::UploadFailed(format!("cannot read {}: {e}", path.display()))
                })?;
                let length = file
                    .metadata()
                    .await
                    .map_err(|e| {
                        TransferError::UploadFailed(format!("cannot stat {}: {e}", path.display()))
                    })?
                    .len();

                Ok((length, ReaderStream::with_capacity(file, self.chunk_size).boxed()))
            }
        }
    }
}

/// Split a buffer into zero-copy slices of `chunk_size`
fn chunked(data: Bytes, chunk_size: usize) -> BodyStream {
    let len = data.len();
    stream::iter((0..len).step_by(chunk_size).map(move |start| {
        let end = (start + chunk_size).min(len);
        Ok(data.slice(start..end))
    }))
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ExecutionContext;
    use crate::humanize::ByteSize;
    use crate::task::TaskId;
    use crate::testing::{FakeTransport, RecordingObserver, Reply, test_source};
    use serde_json::json;

    fn uploader(transport: &Arc<FakeTransport>, chunk_size: u64, step: f64) -> AssetUploader {
        let config = UploadConfig {
            chunk_size: ByteSize(chunk_size),
            progress_step: step,
        };
        AssetUploader::new(transport.clone(), &config)
    }

    fn reporter(observer: &Arc<RecordingObserver<UploadedAsset>>) -> Reporter<UploadedAsset> {
        Reporter::new(TaskId(1), observer.clone(), ExecutionContext::Inline)
    }

    #[tokio::test]
    async fn test_empty_filename_rejected_before_transport() {
        let transport = FakeTransport::new();
        let observer = RecordingObserver::new();

        let err = uploader(&transport, 4, 0.01)
            .upload_data(
                Bytes::from_static(b"data"),
                "",
                "/up/",
                "text/plain",
                &test_source(),
                &reporter(&observer),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::InvalidArgument(_)));
        assert!(transport.calls().is_empty());
    }

    #[test]
    fn test_validate_mimetype() {
        let mut payload = UploadPayload::data(Bytes::new(), "a.txt", "/up/", "");
        assert!(payload.validate().is_err());
        payload.mimetype = "not a mime".to_string();
        assert!(payload.validate().is_err());
        payload.mimetype = "text/plain; charset=utf-8".to_string();
        assert!(payload.validate().is_ok());
        payload.destination_path.clear();
        assert!(payload.validate().is_err());
    }

    #[tokio::test]
    async fn test_upload_data_streams_chunks_with_progress() {
        let transport = FakeTransport::new();
        transport.route("/up/", Reply::json(json!({ "path": "/up/a (1).txt", "size": 10 })));
        let observer = RecordingObserver::new();

        let asset = uploader(&transport, 4, 0.01)
            .upload_data(
                Bytes::from_static(b"0123456789"),
                "a.txt",
                "/up/",
                "text/plain",
                &test_source(),
                &reporter(&observer),
            )
            .await
            .unwrap();

        // Server renamed on conflict
        assert_eq!(asset.path, "/up/a (1).txt");
        assert_eq!(observer.fractions(), vec![0.4, 0.8, 1.0]);

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, request::Method::Post);
        assert_eq!(calls[0].body.as_deref(), Some(b"0123456789".as_slice()));
        assert_eq!(calls[0].body_chunks, 3);
        assert_eq!(calls[0].header("authorization"), Some("Bearer test-key"));
    }

    #[tokio::test]
    async fn test_progress_step_limits_reports() {
        let transport = FakeTransport::new();
        transport.route("/up/", Reply::json(json!({})));
        let observer = RecordingObserver::new();

        let asset = uploader(&transport, 1, 0.5)
            .upload_data(
                Bytes::from_static(b"0123456789"),
                "a.txt",
                "/up/",
                "text/plain",
                &test_source(),
                &reporter(&observer),
            )
            .await
            .unwrap();

        assert_eq!(observer.fractions(), vec![0.5, 1.0]);
        // Server omitted the path, requested destination is kept
        assert_eq!(asset.path, "/up/");
    }

    #[tokio::test]
    async fn test_upload_file_streams_from_disk() {
        let dir = tempfile::TempDir::new().unwrap();
        let local = dir.path().join("report.pdf");
        std::fs::write(&local, vec![7u8; 1000]).unwrap();

        let transport = FakeTransport::new();
        transport.route("/docs/", Reply::json(json!({ "path": "/docs/report.pdf" })));
        let observer = RecordingObserver::new();

        let asset = uploader(&transport, 256, 0.01)
            .upload_file(
                local,
                "report.pdf",
                "/docs/",
                "application/pdf",
                &test_source(),
                &reporter(&observer),
            )
            .await
            .unwrap();

        assert_eq!(asset.path, "/docs/report.pdf");
        let calls = transport.calls();
        assert_eq!(calls[0].body.as_ref().map(Vec::len), Some(1000));
        assert_eq!(observer.fractions().last(), Some(&1.0));
    }

    #[tokio::test]
    async fn test_missing_local_file() {
        let transport = FakeTransport::new();
        let observer = RecordingObserver::new();

        let err = uploader(&transport, 256, 0.01)
            .upload_file(
                PathBuf::from("/definitely/not/here.bin"),
                "here.bin",
                "/up/",
                "application/octet-stream",
                &test_source(),
                &reporter(&observer),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, TransferError::UploadFailed(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_is_upload_failure() {
        let transport = FakeTransport::new();
        transport.route("/up/", Reply::Status(500));
        let observer = RecordingObserver::new();

        let err = uploader(&transport, 4, 0.01)
            .upload_data(
                Bytes::from_static(b"abc"),
                "a.txt",
                "/up/",
                "text/plain",
                &test_source(),
                &reporter(&observer),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TransferError::UploadFailed(_)));
    }

    #[tokio::test]
    async fn test_chunked_slices() {
        let chunks: Vec<Bytes> = chunked(Bytes::from_static(b"abcde"), 2)
            .try_collect()
            .await
            .unwrap();
        assert_eq!(
            chunks,
            vec![
                Bytes::from_static(b"ab"),
                Bytes::from_static(b"cd"),
                Bytes::from_static(b"e")
            ]
        );
    }
}
