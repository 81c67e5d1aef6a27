//! Observers receiving transfer progress and the terminal result
//!
//! - [`TransferObserver`] - trait implemented by anything consuming results
//! - [`Callbacks`] - observer built from closures
//! - [`ChannelObserver`] - observer forwarding [`TransferEvent`]s to a channel
//! - [`Reporter`] - per-task guard enforcing "progress*, then exactly one terminal"

mod reporter;

pub use reporter::{ProgressSink, Reporter};

use serde::Serialize;
use tokio::sync::mpsc;

use crate::error::TransferError;

/// Progress of a running transfer
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Progress {
    /// Completed fraction in `[0, 1]`
    Fraction { value: f64 },
    /// Total size unknown; bytes moved so far
    Indeterminate { received: u64 },
}

impl Progress {
    pub fn fraction(value: f64) -> Self {
        Progress::Fraction {
            value: value.clamp(0.0, 1.0),
        }
    }

    pub fn as_fraction(&self) -> Option<f64> {
        match self {
            Progress::Fraction { value } => Some(*value),
            Progress::Indeterminate { .. } => None,
        }
    }
}

pub trait TransferObserver<T>: Send + Sync + 'static {
    fn on_progress(&self, _progress: Progress) {}

    fn on_success(&self, output: T);

    fn on_failure(&self, error: TransferError);
}

type ProgressFn = Box<dyn Fn(Progress) + Send + Sync>;

/// Observer assembled from success/failure/progress closures
pub struct Callbacks<T> {
    success: Box<dyn Fn(T) + Send + Sync>,
    failure: Box<dyn Fn(TransferError) + Send + Sync>,
    progress: Option<ProgressFn>,
}

impl<T> Callbacks<T> {
    pub fn new(
        success: impl Fn(T) + Send + Sync + 'static,
        failure: impl Fn(TransferError) + Send + Sync + 'static,
    ) -> Self {
        Self {
            success: Box::new(success),
            failure: Box::new(failure),
            progress: None,
        }
    }

    pub fn with_progress(mut self, progress: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }
}

impl<T: 'static> TransferObserver<T> for Callbacks<T> {
    fn on_progress(&self, progress: Progress) {
        if let Some(callback) = &self.progress {
            callback(progress);
        }
    }

    fn on_success(&self, output: T) {
        (self.success)(output);
    }

    fn on_failure(&self, error: TransferError) {
        (self.failure)(error);
    }
}

#[derive(Debug)]
pub enum TransferEvent<T> {
    Progress(Progress),
    Success(T),
    Failure(TransferError),
}

impl<T> TransferEvent<T> {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransferEvent::Progress(_))
    }
}

/// Observer that turns callbacks into an event stream
pub struct ChannelObserver<T> {
    tx: mpsc::UnboundedSender<TransferEvent<T>>,
}

impl<T: Send + 'static> ChannelObserver<T> {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TransferEvent<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: TransferEvent<T>) {
        // Receiver gone means nobody is listening
        let _ = self.tx.send(event);
    }
}

impl<T: Send + 'static> TransferObserver<T> for ChannelObserver<T> {
    fn on_progress(&self, progress: Progress) {
        self.forward(TransferEvent::Progress(progress));
    }

    fn on_success(&self, output: T) {
        self.forward(TransferEvent::Success(output));
    }

    fn on_failure(&self, error: TransferError) {
        self.forward(TransferEvent::Failure(error));
    }
}
