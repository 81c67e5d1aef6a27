//! Units of work accepted by the scheduler

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::context::ExecutionContext;
use crate::error::TransferError;
use crate::fetcher::{FetchedMedia, ObjectDescriptor};
use crate::observer::{Reporter, TransferObserver};
use crate::source::Source;
use crate::uploader::{UploadPayload, UploadedAsset};

/// Sequence number assigned at submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    FetchInfo,
    FetchAndDownload,
    Upload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Cancelled
        )
    }
}

/// Called with a task's final state before its terminal callback runs
pub type TerminalHook = Arc<dyn Fn(TaskState) + Send + Sync>;

/// Where downloaded content ends up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DownloadTarget {
    #[default]
    Memory,
    /// Directory the file is written into, named after the object
    Directory(PathBuf),
}

pub enum TaskPayload {
    Fetch {
        object: ObjectDescriptor,
        should_download: bool,
        target: DownloadTarget,
        observer: Arc<dyn TransferObserver<FetchedMedia>>,
    },
    Upload {
        upload: UploadPayload,
        observer: Arc<dyn TransferObserver<UploadedAsset>>,
    },
}

pub struct TransferTask {
    pub source: Arc<dyn Source>,
    pub payload: TaskPayload,
    pub context: ExecutionContext,
    pub cancellation: CancellationToken,
    /// Set by the scheduler when the task starts
    pub terminal_hook: Option<TerminalHook>,
}

impl TransferTask {
    pub fn fetch(
        source: Arc<dyn Source>,
        object: ObjectDescriptor,
        should_download: bool,
        observer: Arc<dyn TransferObserver<FetchedMedia>>,
        context: ExecutionContext,
    ) -> Self {
        Self {
            source,
            payload: TaskPayload::Fetch {
                object,
                should_download,
                target: DownloadTarget::Memory,
                observer,
            },
            context,
            cancellation: CancellationToken::new(),
            terminal_hook: None,
        }
    }

    pub fn upload(
        source: Arc<dyn Source>,
        upload: UploadPayload,
        observer: Arc<dyn TransferObserver<UploadedAsset>>,
        context: ExecutionContext,
    ) -> Self {
        Self {
            source,
            payload: TaskPayload::Upload { upload, observer },
            context,
            cancellation: CancellationToken::new(),
            terminal_hook: None,
        }
    }

    /// Write downloads into `target` instead of memory; no effect on uploads
    pub fn with_download_target(mut self, new_target: DownloadTarget) -> Self {
        if let TaskPayload::Fetch { target, .. } = &mut self.payload {
            *target = new_target;
        }
        self
    }

    /// Use a caller-owned token, e.g. a child of a wider scope
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn kind(&self) -> TaskKind {
        match &self.payload {
            TaskPayload::Fetch {
                should_download: false,
                ..
            } => TaskKind::FetchInfo,
            TaskPayload::Fetch { .. } => TaskKind::FetchAndDownload,
            TaskPayload::Upload { .. } => TaskKind::Upload,
        }
    }

    /// Logical resource this task addresses
    pub fn path(&self) -> &str {
        match &self.payload {
            TaskPayload::Fetch { object, .. } => &object.link_path,
            TaskPayload::Upload { upload, .. } => &upload.destination_path,
        }
    }

    /// Deliver a terminal failure without running the task
    pub(crate) fn reject(self, id: TaskId, error: TransferError) -> TaskState {
        match self.payload {
            TaskPayload::Fetch { observer, .. } => {
                Reporter::new(id, observer, self.context).fail(error)
            }
            TaskPayload::Upload { observer, .. } => {
                Reporter::new(id, observer, self.context).fail(error)
            }
        }
    }
}

impl fmt::Debug for TransferTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferTask")
            .field("kind", &self.kind())
            .field("source", &self.source.id())
            .field("path", &self.path())
            .field("context", &self.context)
            .finish()
    }
}

/// Returned by `submit`, used to query or cancel the task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TaskHandle {
    id: TaskId,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId) -> Self {
        Self { id }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }
}
