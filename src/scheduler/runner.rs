//! Task runner - executes one accepted TransferTask to its terminal callback

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, TransferError};
use crate::fetcher::MediaFetcher;
use crate::observer::Reporter;
use crate::task::{TaskId, TaskPayload, TaskState, TransferTask};
use crate::uploader::AssetUploader;

/// Runs a task and delivers its terminal callback before returning.
///
/// Build the task's [`Reporter`] with its `terminal_hook` so the scheduler
/// records the final state before the observer hears about it.
#[async_trait]
pub trait TaskRunner: Send + Sync + 'static {
    async fn run(&self, id: TaskId, task: TransferTask) -> TaskState;
}

/// Dispatches fetch tasks to the fetcher and upload tasks to the uploader
#[derive(Clone)]
pub struct TransferRunner {
    fetcher: MediaFetcher,
    uploader: AssetUploader,
}

impl TransferRunner {
    pub fn new(fetcher: MediaFetcher, uploader: AssetUploader) -> Self {
        Self { fetcher, uploader }
    }
}

#[async_trait]
impl TaskRunner for TransferRunner {
    async fn run(&self, id: TaskId, task: TransferTask) -> TaskState {
        let kind = task.kind();
        let TransferTask {
            source,
            payload,
            context,
            cancellation,
            terminal_hook,
        } = task;

        let state = match payload {
            TaskPayload::Fetch {
                object,
                should_download,
                target,
                observer,
            } => {
                let reporter = Reporter::with_terminal_hook(id, observer, context, terminal_hook);
                let outcome = until_cancelled(
                    &cancellation,
                    self.fetcher
                        .fetch(&object, &source, should_download, &target, &reporter),
                )
                .await;
                log_outcome(id, &outcome);
                reporter.finish(outcome)
            }
            TaskPayload::Upload { upload, observer } => {
                let reporter = Reporter::with_terminal_hook(id, observer, context, terminal_hook);
                let outcome =
                    until_cancelled(&cancellation, self.uploader.upload(&upload, &source, &reporter))
                        .await;
                log_outcome(id, &outcome);
                reporter.finish(outcome)
            }
        };

        debug!(task_id = %id, ?kind, ?state, "Task finished");
        state
    }
}

/// Race an operation against its token. A cancelled operation is dropped,
/// which drops the transport stream and aborts the exchange.
pub async fn until_cancelled<T>(
    token: &CancellationToken,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    tokio::select! {
        biased;
        _ = token.cancelled() => Err(TransferError::Cancelled),
        outcome = operation => outcome,
    }
}

fn log_outcome<T>(id: TaskId, outcome: &Result<T>) {
    match outcome {
        Ok(_) => {}
        Err(TransferError::Cancelled) => debug!(task_id = %id, "Task cancelled"),
        Err(e) => warn!(task_id = %id, error = %e, code = e.code(), "Task failed"),
    }
}
