//! Caller-facing entry points
//!
//! Every method validates what it can without I/O, builds a [`TransferTask`]
//! and hands it to the scheduler. Results arrive through the observer.

use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::debug;

use crate::config::Config;
use crate::context::ExecutionContext;
use crate::error::{Result, TransferError};
use crate::fetcher::{FetchedMedia, MediaFetcher, ObjectDescriptor};
use crate::observer::TransferObserver;
use crate::request::{self, CachePolicy, RequestDescriptor};
use crate::scheduler::{TransferRunner, TransferScheduler};
use crate::source::Source;
use crate::task::{DownloadTarget, TaskHandle, TaskState, TransferTask};
use crate::transport::{HttpTransport, Transport};
use crate::uploader::{AssetUploader, UploadPayload, UploadedAsset};

#[derive(Clone)]
pub struct TransferLibrary {
    scheduler: TransferScheduler,
    download_dir: Option<PathBuf>,
}

impl TransferLibrary {
    pub fn new(scheduler: TransferScheduler) -> Self {
        Self {
            scheduler,
            download_dir: None,
        }
    }

    /// Wire the reqwest transport, fetcher, uploader and scheduler from config
    pub fn from_config(config: &Config, runtime: Handle) -> Result<Self> {
        let transport: Arc<dyn Transport> = Arc::new(HttpTransport::new(&config.http)?);
        Ok(Self::with_transport(config, transport, runtime))
    }

    pub fn with_transport(config: &Config, transport: Arc<dyn Transport>, runtime: Handle) -> Self {
        let fetcher =
            MediaFetcher::new(transport.clone()).with_cache_policy(config.fetch.cache_policy);
        let uploader = AssetUploader::new(transport, &config.upload);
        let runner = Arc::new(TransferRunner::new(fetcher, uploader));
        let scheduler = TransferScheduler::new(&config.scheduler, runner, runtime);

        Self {
            scheduler,
            download_dir: config.fetch.download_dir.clone(),
        }
    }

    /// Downloads go to this directory instead of memory
    pub fn with_download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.download_dir = Some(dir.into());
        self
    }

    pub fn scheduler(&self) -> &TransferScheduler {
        &self.scheduler
    }

    pub fn request_object_media_info(
        &self,
        object: ObjectDescriptor,
        source: Arc<dyn Source>,
        context: ExecutionContext,
        should_download: bool,
        observer: Arc<dyn TransferObserver<FetchedMedia>>,
    ) -> Result<TaskHandle> {
        if object.link_path.is_empty() {
            return Err(TransferError::invalid("object link path must not be empty"));
        }

        let target = match &self.download_dir {
            Some(dir) if should_download => DownloadTarget::Directory(dir.clone()),
            _ => DownloadTarget::Memory,
        };
        let task = TransferTask::fetch(source, object, should_download, observer, context)
            .with_download_target(target);
        Ok(self.submit(task))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn upload_data(
        &self,
        data: impl Into<Bytes>,
        filename: &str,
        destination_path: &str,
        mimetype: &str,
        source: Arc<dyn Source>,
        context: ExecutionContext,
        observer: Arc<dyn TransferObserver<UploadedAsset>>,
    ) -> Result<TaskHandle> {
        let payload = UploadPayload::data(data, filename, destination_path, mimetype);
        self.upload(payload, source, context, observer)
    }

    /// Upload a local file, streamed from disk. A missing file is reported
    /// through `on_failure` once the task runs.
    #[allow(clippy::too_many_arguments)]
    pub fn upload_data_url(
        &self,
        local_path: impl Into<PathBuf>,
        filename: &str,
        destination_path: &str,
        mimetype: &str,
        source: Arc<dyn Source>,
        context: ExecutionContext,
        observer: Arc<dyn TransferObserver<UploadedAsset>>,
    ) -> Result<TaskHandle> {
        let local_path = local_path.into();
        if local_path.as_os_str().is_empty() {
            return Err(TransferError::invalid("local file path must not be empty"));
        }
        let payload = UploadPayload::file(local_path, filename, destination_path, mimetype);
        self.upload(payload, source, context, observer)
    }

    pub fn upload(
        &self,
        payload: UploadPayload,
        source: Arc<dyn Source>,
        context: ExecutionContext,
        observer: Arc<dyn TransferObserver<UploadedAsset>>,
    ) -> Result<TaskHandle> {
        payload.validate()?;
        Ok(self.submit(TransferTask::upload(source, payload, observer, context)))
    }

    /// Build a descriptor without sending it
    pub fn request_for_load_path(
        &self,
        load_path: &str,
        format: Option<&str>,
        mimetypes: &[String],
        cache_policy: CachePolicy,
    ) -> Result<RequestDescriptor> {
        request::request_for_load_path(load_path, format, mimetypes, cache_policy)
    }

    /// Same as [`Self::request_for_load_path`] with `suffix` appended verbatim
    /// to the load path, e.g. to address a thumbnail rendition
    pub fn request_for_load_path_appending(
        &self,
        load_path: &str,
        format: Option<&str>,
        mimetypes: &[String],
        suffix: Option<&str>,
        cache_policy: CachePolicy,
    ) -> Result<RequestDescriptor> {
        request::request_for_load_path_appending(load_path, format, mimetypes, suffix, cache_policy)
    }

    pub fn cancel(&self, handle: &TaskHandle) -> bool {
        self.scheduler.cancel(handle)
    }

    pub fn state(&self, handle: &TaskHandle) -> Option<TaskState> {
        self.scheduler.state(handle)
    }

    fn submit(&self, task: TransferTask) -> TaskHandle {
        let handle = self.scheduler.submit(task);
        debug!(task_id = %handle.id(), "Accepted by library");
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeTransport, RecordingObserver, Reply, test_source};
    use serde_json::json;
    use std::time::Duration;

    fn library(transport: &Arc<FakeTransport>) -> TransferLibrary {
        TransferLibrary::with_transport(&Config::default(), transport.clone(), Handle::current())
    }

    async fn settle(library: &TransferLibrary) {
        tokio::time::timeout(Duration::from_secs(1), library.scheduler().idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_invalid_upload_rejected_synchronously() {
        let transport = FakeTransport::new();
        let library = library(&transport);
        let observer = RecordingObserver::<UploadedAsset>::new();

        let err = library
            .upload_data(
                Bytes::from_static(b"x"),
                "a.txt",
                "/up/",
                "",
                test_source(),
                ExecutionContext::Inline,
                observer.clone(),
            )
            .unwrap_err();

        assert!(matches!(err, TransferError::InvalidArgument(_)));
        assert!(observer.log().is_empty());
        assert_eq!(library.scheduler().queued() + library.scheduler().running(), 0);
    }

    #[tokio::test]
    async fn test_empty_link_path_rejected() {
        let library = library(&FakeTransport::new());
        let err = library
            .request_object_media_info(
                ObjectDescriptor::new(""),
                test_source(),
                ExecutionContext::Inline,
                false,
                RecordingObserver::<FetchedMedia>::new(),
            )
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_media_info_runs_through_scheduler() {
        let transport = FakeTransport::new();
        transport.route("/f/7", Reply::json(json!({ "filename": "seven.jpg", "size": 7 })));
        let library = library(&transport);
        let observer = RecordingObserver::<FetchedMedia>::new();

        let handle = library
            .request_object_media_info(
                ObjectDescriptor::new("/f/7"),
                test_source(),
                ExecutionContext::Inline,
                false,
                observer.clone(),
            )
            .unwrap();
        settle(&library).await;

        assert_eq!(library.state(&handle), Some(TaskState::Succeeded));
        assert_eq!(observer.terminal_count(), 1);
        assert!(observer.fractions().is_empty());
    }

    #[tokio::test]
    async fn test_missing_local_file_fails_in_task() {
        let transport = FakeTransport::new();
        let library = library(&transport);
        let observer = RecordingObserver::<UploadedAsset>::new();

        let handle = library
            .upload_data_url(
                "/no/such/file.bin",
                "file.bin",
                "/up/",
                "application/octet-stream",
                test_source(),
                ExecutionContext::Inline,
                observer.clone(),
            )
            .unwrap();
        settle(&library).await;

        assert_eq!(library.state(&handle), Some(TaskState::Failed));
        assert_eq!(observer.log(), vec!["failure UPLOAD_FAILED"]);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_download_dir_applies_to_downloads() {
        let dir = tempfile::TempDir::new().unwrap();
        let transport = FakeTransport::new();
        transport.route("/f/1", Reply::json(json!({ "url": "https://cdn.test/c", "filename": "c.txt" })));
        transport.route("/c", Reply::chunks(vec![b"hello".as_slice()], Some(5)));
        let library = library(&transport).with_download_dir(dir.path());
        let observer = RecordingObserver::<FetchedMedia>::new();

        library
            .request_object_media_info(
                ObjectDescriptor::new("/f/1"),
                test_source(),
                ExecutionContext::Inline,
                true,
                observer.clone(),
            )
            .unwrap();
        settle(&library).await;

        assert_eq!(std::fs::read(dir.path().join("c.txt")).unwrap(), b"hello");
        assert_eq!(observer.fractions(), vec![1.0]);
    }

    #[test]
    fn test_request_for_load_path() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let library = TransferLibrary::with_transport(
            &Config::default(),
            FakeTransport::new(),
            runtime.handle().clone(),
        );

        let descriptor = library
            .request_for_load_path("/media/1", Some("thumb"), &[], CachePolicy::UseProtocol)
            .unwrap();
        assert_eq!(descriptor.target, "/media/1?format=thumb");

        let appended = library
            .request_for_load_path_appending(
                "/media/1",
                Some("png"),
                &["image/png".to_string()],
                Some("/thumbnail"),
                CachePolicy::ReloadIgnoringCache,
            )
            .unwrap();
        assert_eq!(appended.target, "/media/1/thumbnail?format=png&mimetypes=image/png");
        assert_eq!(appended.header("Cache-Control"), Some("no-cache"));
        assert!(
            library
                .request_for_load_path_appending("", None, &[], Some("/x"), CachePolicy::UseProtocol)
                .is_err()
        );
    }
}
