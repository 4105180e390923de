//! # Probelog Core
//!
//! Pure primitives for reconciling a device's circular record buffer with a
//! host-side log: sequence numbers, ranges, sessions, and per-device logs.
//!
//! This crate performs no I/O and never reads the clock; wall-clock time is
//! passed in by the caller. Every operation is synchronous and bounded by the
//! number of records held.
//!
//! ## Key Types
//!
//! - [`SequenceNumber`] - Position of one record in a session's stream
//! - [`RecordRange`] - Inclusive, never-empty span of sequence numbers
//! - [`Session`] - Deduplicated record store for one device-session identity
//! - [`DeviceLog`] - Ordered sessions for one device, spanning resets
//! - [`UploadProgress`] / [`SessionStatus`] - Value snapshots returned by mutations
//!
//! ## Channels
//!
//! Records reach a session over two independent channels. The *cursor*
//! channel is a periodic push of the device's latest record; the *bulk*
//! channel streams historical records in answer to an explicit request. Both
//! may duplicate, reorder, or drop records, and both feed the same
//! deduplicated map keyed by sequence number.

pub mod device_log;
pub mod error;
pub mod progress;
pub mod range;
pub mod record;
pub mod session;
pub mod types;

pub use device_log::DeviceLog;
pub use error::{CoreError, Result};
pub use progress::{SessionStatus, UploadProgress};
pub use range::RecordRange;
pub use record::{DataPoint, LoggedPoint};
pub use session::{Session, SessionConfig, DEFAULT_STALE_THRESHOLD};
pub use types::{DeviceId, SequenceNumber, SessionId, SessionInfo};
