//! # Probelog
//!
//! Keeps a host-side time-series log in step with the circular,
//! sequence-numbered record buffer of a remote sensing device.
//!
//! ## Overview
//!
//! Devices reach the host over a slow, lossy, possibly multi-hop radio link
//! through two channels:
//!
//! - **Cursor broadcasts**: a periodic push of the latest record
//! - **Bulk transfers**: explicit requests that stream a historical range
//!
//! Both may reorder, duplicate, or drop records, and a device may reset into a
//! new session at any time. Probelog merges both channels into one
//! deduplicated, gap-aware, session-scoped log per device, decides what to
//! request and backfill, detects stalled transfers, and reports progress as an
//! [`UploadState`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use probelog::{ChannelSink, LogManager, ManagerConfig};
//!
//! async fn example() {
//!     // Outbound events (bulk requests, state changes) arrive on `rx`.
//!     let (sink, mut rx) = ChannelSink::new(64);
//!     let manager = LogManager::new(ManagerConfig::default(), sink).unwrap();
//!
//!     // Feed decoded transport events in arrival order:
//!     // manager.dispatch(event).await?;
//!
//!     while let Some(outbound) = rx.recv().await {
//!         // Hand bulk requests to the radio, state changes to the UI.
//!         let _ = outbound;
//!     }
//!     manager.shutdown().await;
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `probelog::core` - Sequence numbers, ranges, sessions, device logs
//! - `probelog::sync` - Coordinator state machine and event types

pub mod error;
pub mod manager;

// Re-export component crates
pub use probelog_core as core;
pub use probelog_sync as sync;

// Re-export main types for convenience
pub use error::{ManagerError, Result};
pub use manager::{LogManager, ManagerConfig, DEFAULT_CHANNEL_CAPACITY};

pub use probelog_core::{
    DataPoint, DeviceId, DeviceLog, LoggedPoint, RecordRange, SequenceNumber, Session,
    SessionConfig, SessionId, SessionInfo, SessionStatus, UploadProgress,
};
pub use probelog_sync::{
    ChannelSink, CoordinatorConfig, EventSink, Inbound, LogCoordinator, Outbound, UploadState,
};
