//! Records held in a session.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::types::{SequenceNumber, SessionId};

/// One decoded record: its position and opaque sample payload.
///
/// The payload is produced by the wire decoder and never interpreted here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataPoint {
    pub sequence: SequenceNumber,
    pub payload: Bytes,
}

impl DataPoint {
    pub fn new(sequence: SequenceNumber, payload: impl Into<Bytes>) -> Self {
        Self {
            sequence,
            payload: payload.into(),
        }
    }
}

/// A record placed in a device's full history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggedPoint {
    /// Session the record belongs to.
    pub session_id: SessionId,
    /// Wall-clock estimate in unix milliseconds, when the session start is known.
    pub timestamp_ms: Option<i64>,
    /// The record itself.
    pub point: DataPoint,
}
