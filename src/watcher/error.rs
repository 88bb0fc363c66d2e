//! Error types for the watch manager.

use std::path::PathBuf;
use thiserror::Error;

/// Errors from watch registration and event consumption.
#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Failed to initialize notification service: {reason}")]
    InitFailed { reason: String },

    #[error("Not a directory: {path}")]
    NotADirectory { path: PathBuf },

    #[error("Cannot watch {path}: {reason}")]
    WatchUnavailable { path: PathBuf, reason: String },

    #[error("Notification read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event channel closed by consumer")]
    ChannelClosed,
}
