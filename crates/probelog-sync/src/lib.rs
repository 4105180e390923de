//! # Probelog Sync
//!
//! The reconciliation protocol that keeps a host-side log in step with a
//! device's circular record buffer.
//!
//! ## Overview
//!
//! A [`LogCoordinator`] owns one device's [`DeviceLog`](probelog_core::DeviceLog)
//! and its caller-visible [`UploadState`]. It consumes decoded [`Inbound`]
//! events and answers with [`Outbound`] events: bulk requests for the
//! transport layer and state changes for the caller.
//!
//! ## Upload State Machine
//!
//! ```text
//!                  cursor                 start transfer
//!  Unavailable ───────────► TransferNeeded ─────────────► InProgress
//!      ▲                                                   │    │
//!      │ disconnect (from any state)      all records / stall │    │ bulk record
//!      │                                                   ▼    │
//!      └──────────────────────────────────────────────── Complete ◄┘
//!                                                  (background backfill)
//! ```
//!
//! ## Key Properties
//!
//! - **Absorbing**: duplicates, stale and out-of-order records never fail
//! - **Gap-aware**: cursor gaps trigger narrow backfill requests
//! - **Never stuck**: a stalled transfer is force-completed after a window of
//!   cursor ticks without bulk progress
//! - **Single writer**: the coordinator is a plain `&mut self` state machine;
//!   callers serialize each device's events into one stream

pub mod coordinator;
pub mod error;
pub mod messages;
pub mod transport;

pub use coordinator::{CoordinatorConfig, LogCoordinator};
pub use error::{Result, SyncError};
pub use messages::{Inbound, Outbound, UploadState};
pub use transport::{memory::ChannelSink, EventSink};
