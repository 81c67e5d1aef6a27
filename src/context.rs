//! Execution contexts on which transfer callbacks are delivered

use std::fmt;
use std::io;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::thread;
use tokio::sync::mpsc;
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// Where a task's callbacks run
#[derive(Clone, Debug)]
pub enum ExecutionContext {
    /// On the worker driving the transfer
    Inline,
    /// On a serial callback queue
    Queue(CallbackQueue),
}

impl ExecutionContext {
    /// New serial queue with its own delivery thread
    pub fn queue(label: &str) -> io::Result<Self> {
        CallbackQueue::new(label).map(ExecutionContext::Queue)
    }

    pub(crate) fn dispatch(&self, job: Job) {
        match self {
            ExecutionContext::Inline => job(),
            ExecutionContext::Queue(queue) => queue.dispatch(job),
        }
    }
}

/// Serial queue: jobs run one at a time, in dispatch order, on a dedicated
/// thread. The thread exits once every handle is dropped. A panicking
/// callback is logged and does not stop delivery of later ones.
#[derive(Clone)]
pub struct CallbackQueue {
    label: Arc<str>,
    tx: mpsc::UnboundedSender<Job>,
}

impl CallbackQueue {
    pub fn new(label: &str) -> io::Result<Self> {
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let label: Arc<str> = Arc::from(label);

        let thread_label = label.clone();
        thread::Builder::new()
            .name(format!("callbacks-{label}"))
            .spawn(move || {
                while let Some(job) = rx.blocking_recv() {
                    if catch_unwind(AssertUnwindSafe(job)).is_err() {
                        error!(queue = %thread_label, "Callback panicked");
                    }
                }
                debug!(queue = %thread_label, "Callback queue drained");
            })?;

        Ok(Self { label, tx })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    fn dispatch(&self, job: Job) {
        if self.tx.send(job).is_err() {
            warn!(queue = %self.label, "Callback queue closed, dropping callback");
        }
    }
}

impl fmt::Debug for CallbackQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackQueue")
            .field("label", &self.label)
            .finish()
    }
}
