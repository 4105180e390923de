//! Error types for the sync module.

use thiserror::Error;

use probelog_core::{CoreError, DeviceId};

/// Errors that can occur while driving the reconciliation protocol.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Core construction failed.
    #[error("core error: {0}")]
    Core(#[from] CoreError),

    /// The outbound sink no longer accepts events.
    #[error("event sink closed: {0}")]
    SinkClosed(String),

    /// An event was routed to the wrong device's coordinator.
    #[error("event for device {got} delivered to coordinator for {expected}")]
    DeviceMismatch { expected: DeviceId, got: DeviceId },
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
