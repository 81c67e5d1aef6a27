pub mod config;
pub mod context;
pub mod error;
pub mod fetcher;
pub mod humanize;
pub mod library;
pub mod observer;
pub mod request;
pub mod scheduler;
pub mod source;
pub mod task;
pub mod telemetry;
pub mod transport;
pub mod uploader;

#[cfg(test)]
mod testing;

pub use error::{Result, TransferError};
pub use library::TransferLibrary;
