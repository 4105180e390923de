//! Error types for the log manager.

use probelog_core::{CoreError, DeviceId};
use probelog_sync::SyncError;
use thiserror::Error;

/// Errors that can occur during manager operations.
#[derive(Debug, Error)]
pub enum ManagerError {
    /// Core error.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Rejected configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// No log exists for the device.
    #[error("unknown device: {0}")]
    UnknownDevice(DeviceId),

    /// The device's worker task has exited.
    #[error("worker for device {0} stopped")]
    WorkerStopped(DeviceId),
}

/// Result type for manager operations.
pub type Result<T> = std::result::Result<T, ManagerError>;
