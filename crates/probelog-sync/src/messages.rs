//! Events exchanged with the transport layer and the caller.
//!
//! Inbound events are already decoded into `(sequence, payload)` pairs; no
//! wire format is defined here.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use probelog_core::{DeviceId, RecordRange, SequenceNumber, SessionInfo, SessionStatus};

/// Events consumed by a coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Inbound {
    /// The transport connected to or lost the device.
    ConnectionStateChanged { device_id: DeviceId, connected: bool },

    /// Periodic status push: the device's latest record.
    CursorBroadcast {
        device_id: DeviceId,
        sequence: SequenceNumber,
        payload: Bytes,
        session_info: SessionInfo,
    },

    /// One record answering an outstanding bulk request.
    BulkResponse {
        device_id: DeviceId,
        sequence: SequenceNumber,
        payload: Bytes,
    },

    /// The caller wants the log brought up to date with the device.
    StartTransferRequested {
        device_id: DeviceId,
        device_min: SequenceNumber,
        device_max: SequenceNumber,
        session_info: SessionInfo,
    },

    /// The caller abandons the outstanding transfer.
    CancelTransfer { device_id: DeviceId },
}

impl Inbound {
    /// The device this event concerns.
    pub fn device_id(&self) -> DeviceId {
        match self {
            Inbound::ConnectionStateChanged { device_id, .. }
            | Inbound::CursorBroadcast { device_id, .. }
            | Inbound::BulkResponse { device_id, .. }
            | Inbound::StartTransferRequested { device_id, .. }
            | Inbound::CancelTransfer { device_id } => *device_id,
        }
    }
}

/// Events produced by a coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outbound {
    /// Ask the device for every record in `range`.
    IssueBulkRequest {
        device_id: DeviceId,
        range: RecordRange,
    },

    /// The caller-visible upload state changed.
    UploadStateChanged {
        device_id: DeviceId,
        state: UploadState,
    },
}

impl Outbound {
    pub fn device_id(&self) -> DeviceId {
        match self {
            Outbound::IssueBulkRequest { device_id, .. }
            | Outbound::UploadStateChanged { device_id, .. } => *device_id,
        }
    }
}

/// Upload progress as seen by callers. Exactly one per device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UploadState {
    /// The device is not connected.
    #[default]
    Unavailable,
    /// Enough is known to start a transfer; waiting for the caller.
    TransferNeeded,
    /// A bulk transfer is running.
    InProgress { transferred: u32, requested: u32 },
    /// The log is up to date, possibly with background backfill running.
    Complete {
        min_seq: Option<SequenceNumber>,
        max_seq: Option<SequenceNumber>,
        total: usize,
    },
}

impl UploadState {
    /// Build the complete state a session status implies.
    pub fn complete_from(status: &SessionStatus) -> Self {
        UploadState::Complete {
            min_seq: status.min_seq,
            max_seq: status.max_seq,
            total: status.record_count,
        }
    }

    pub fn is_complete(&self) -> bool {
        matches!(self, UploadState::Complete { .. })
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(self, UploadState::InProgress { .. })
    }

    pub fn is_unavailable(&self) -> bool {
        matches!(self, UploadState::Unavailable)
    }
}
