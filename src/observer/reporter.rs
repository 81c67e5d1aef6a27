use std::sync::{Arc, Mutex, PoisonError};
use tracing::debug;

use super::{Progress, TransferObserver};
use crate::context::ExecutionContext;
use crate::error::{Result, TransferError};
use crate::task::{TaskId, TaskState, TerminalHook};

struct Gate {
    finished: bool,
    last: Option<Progress>,
}

struct Shared<T> {
    task_id: TaskId,
    observer: Arc<dyn TransferObserver<T>>,
    context: ExecutionContext,
    on_terminal: Option<TerminalHook>,
    gate: Mutex<Gate>,
}

impl<T: Send + 'static> Shared<T> {
    fn progress(&self, progress: Progress) {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if gate.finished || !advances(gate.last, progress) {
            return;
        }
        gate.last = Some(progress);

        // Dispatch under the gate so nothing can slip in after the terminal callback
        let observer = self.observer.clone();
        self.context
            .dispatch(Box::new(move || observer.on_progress(progress)));
    }

    fn terminal(&self, outcome: Result<T>) -> Option<TaskState> {
        let mut gate = self.gate.lock().unwrap_or_else(PoisonError::into_inner);
        if gate.finished {
            return None;
        }
        gate.finished = true;

        let state = match &outcome {
            Ok(_) => TaskState::Succeeded,
            Err(error) if error.is_cancelled() => TaskState::Cancelled,
            Err(_) => TaskState::Failed,
        };
        // Owners see the final state before the observer does
        if let Some(on_terminal) = &self.on_terminal {
            on_terminal(state);
        }

        let observer = self.observer.clone();
        match outcome {
            Ok(output) => self
                .context
                .dispatch(Box::new(move || observer.on_success(output))),
            Err(error) => self
                .context
                .dispatch(Box::new(move || observer.on_failure(error))),
        }

        debug!(task_id = %self.task_id, ?state, "Terminal callback dispatched");
        Some(state)
    }
}

/// Progress must move forward; a known total may replace an unknown one
fn advances(last: Option<Progress>, next: Progress) -> bool {
    match (last, next) {
        (None, _) => true,
        (Some(Progress::Fraction { value: prev }), Progress::Fraction { value }) => value > prev,
        (Some(Progress::Indeterminate { received: prev }), Progress::Indeterminate { received }) => {
            received > prev
        }
        (Some(Progress::Indeterminate { .. }), Progress::Fraction { .. }) => true,
        (Some(Progress::Fraction { .. }), Progress::Indeterminate { .. }) => false,
    }
}

/// Delivers one task's callbacks on its execution context.
///
/// The terminal methods consume the reporter, and dropping an unfinished
/// reporter reports [`TransferError::Cancelled`], so every task ends with
/// exactly one terminal callback.
pub struct Reporter<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> Reporter<T> {
    pub fn new(
        task_id: TaskId,
        observer: Arc<dyn TransferObserver<T>>,
        context: ExecutionContext,
    ) -> Self {
        Self::with_terminal_hook(task_id, observer, context, None)
    }

    /// `on_terminal` runs once, with the final state, right before the
    /// terminal callback is dispatched
    pub fn with_terminal_hook(
        task_id: TaskId,
        observer: Arc<dyn TransferObserver<T>>,
        context: ExecutionContext,
        on_terminal: Option<TerminalHook>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                task_id,
                observer,
                context,
                on_terminal,
                gate: Mutex::new(Gate {
                    finished: false,
                    last: None,
                }),
            }),
        }
    }

    pub fn task_id(&self) -> TaskId {
        self.shared.task_id
    }

    pub fn progress(&self, progress: Progress) {
        self.shared.progress(progress);
    }

    /// Progress-only handle, e.g. for a body stream read by the transport
    pub fn sink(&self) -> ProgressSink<T> {
        ProgressSink {
            shared: self.shared.clone(),
        }
    }

    pub fn finish(self, outcome: Result<T>) -> TaskState {
        self.shared
            .terminal(outcome)
            .unwrap_or(TaskState::Cancelled)
    }

    pub fn succeed(self, output: T) -> TaskState {
        self.finish(Ok(output))
    }

    pub fn fail(self, error: TransferError) -> TaskState {
        self.finish(Err(error))
    }
}

impl<T: Send + 'static> Drop for Reporter<T> {
    fn drop(&mut self) {
        self.shared.terminal(Err(TransferError::Cancelled));
    }
}

pub struct ProgressSink<T: Send + 'static> {
    shared: Arc<Shared<T>>,
}

impl<T: Send + 'static> ProgressSink<T> {
    pub fn progress(&self, progress: Progress) {
        self.shared.progress(progress);
    }
}

impl<T: Send + 'static> Clone for ProgressSink<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}
