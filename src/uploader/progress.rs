use crate::observer::{Progress, ProgressSink};

use super::UploadedAsset;

/// Turns bytes handed to the transport into throttled progress reports
pub(super) struct UploadProgress {
    total: u64,
    sent: u64,
    step: f64,
    last_reported: f64,
    sink: ProgressSink<UploadedAsset>,
}

impl UploadProgress {
    pub(super) fn new(total: u64, step: f64, sink: ProgressSink<UploadedAsset>) -> Self {
        Self {
            total,
            sent: 0,
            step,
            last_reported: 0.0,
            sink,
        }
    }

    pub(super) fn advance(&mut self, bytes: u64) {
        if self.total == 0 {
            return;
        }
        self.sent = (self.sent + bytes).min(self.total);

        let fraction = self.sent as f64 / self.total as f64;
        let finished = self.sent == self.total;
        if finished || fraction - self.last_reported >= self.step {
            self.last_reported = fraction;
            self.sink.progress(Progress::fraction(fraction));
        }
    }
}
