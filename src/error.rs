//! Error kinds surfaced through `on_failure` and from synchronous entry points

use thiserror::Error;

use crate::transport::TransportError;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Malformed input, always detected before any transport call
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("metadata fetch failed: {0}")]
    MetadataFetchFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("transfer cancelled")]
    Cancelled,

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl TransferError {
    pub fn invalid(message: impl Into<String>) -> Self {
        TransferError::InvalidArgument(message.into())
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransferError::Cancelled)
    }

    /// Stable machine-readable code, used in CLI output
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidArgument(_) => "INVALID_ARGUMENT",
            TransferError::MetadataFetchFailed(_) => "METADATA_FETCH_FAILED",
            TransferError::DownloadFailed(_) => "DOWNLOAD_FAILED",
            TransferError::UploadFailed(_) => "UPLOAD_FAILED",
            TransferError::Cancelled => "CANCELLED",
            TransferError::Transport(_) => "TRANSPORT_ERROR",
        }
    }
}

pub type Result<T> = std::result::Result<T, TransferError>;
