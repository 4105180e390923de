//! Test fixtures and helpers.
//!
//! Common setup code for unit and integration tests.

use std::time::Duration;

use bytes::Bytes;

use probelog_core::{
    DeviceId, DeviceLog, SequenceNumber, Session, SessionConfig, SessionId, SessionInfo,
};
use probelog_sync::{CoordinatorConfig, Inbound, LogCoordinator};

/// Fixed wall clock used by fixtures, 2025-01-14T16:00:00Z.
pub const FIXTURE_NOW_MS: i64 = 1_736_870_400_000;

/// A device identity with one session, plus event builders.
#[derive(Debug, Clone)]
pub struct DeviceFixture {
    pub device_id: DeviceId,
    pub session_info: SessionInfo,
    pub config: CoordinatorConfig,
}

impl DeviceFixture {
    /// Create a fixture for a default device.
    pub fn new() -> Self {
        Self::with_id(0x1000_0001)
    }

    /// Create a fixture for a specific serial number.
    pub fn with_id(serial: u32) -> Self {
        Self {
            device_id: DeviceId(serial),
            session_info: SessionInfo::new(SessionId(1), Duration::from_secs(5)),
            config: CoordinatorConfig::default(),
        }
    }

    /// Same device after a reset into session `id`.
    pub fn next_session(&self, id: u32) -> Self {
        Self {
            session_info: SessionInfo::new(SessionId(id), self.session_info.sample_period),
            ..self.clone()
        }
    }

    /// Deterministic payload for a sequence number.
    pub fn payload(seq: u32) -> Bytes {
        Bytes::from(seq.to_be_bytes().to_vec())
    }

    /// An empty session.
    pub fn session(&self) -> Session {
        Session::new(self.session_info, self.config.session).expect("fixture config is valid")
    }

    /// A session holding the given records, ingested over the bulk channel.
    pub fn session_with_records(&self, seqs: impl IntoIterator<Item = u32>) -> Session {
        let mut session = self.session();
        for n in seqs {
            session.ingest_bulk_record(SequenceNumber(n), Self::payload(n));
        }
        session
    }

    /// A log with one open session holding the given records.
    pub fn log_with_records(&self, seqs: impl IntoIterator<Item = u32>) -> DeviceLog {
        let mut log =
            DeviceLog::new(self.device_id, self.config.session).expect("fixture config is valid");
        log.ensure_session(self.session_info, SequenceNumber::ZERO, FIXTURE_NOW_MS)
            .expect("fixture config is valid");
        for n in seqs {
            log.ingest_bulk_record(SequenceNumber(n), Self::payload(n));
        }
        log
    }

    /// A fresh coordinator for this device.
    pub fn coordinator(&self) -> LogCoordinator {
        LogCoordinator::new(self.device_id, self.config).expect("fixture config is valid")
    }

    /// Fixture with a custom staleness window.
    pub fn with_stale_threshold(mut self, stale_threshold: u32) -> Self {
        self.config.session = SessionConfig { stale_threshold };
        self
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event builders
    // ─────────────────────────────────────────────────────────────────────────

    pub fn cursor(&self, seq: u32) -> Inbound {
        Inbound::CursorBroadcast {
            device_id: self.device_id,
            sequence: SequenceNumber(seq),
            payload: Self::payload(seq),
            session_info: self.session_info,
        }
    }

    pub fn bulk(&self, seq: u32) -> Inbound {
        Inbound::BulkResponse {
            device_id: self.device_id,
            sequence: SequenceNumber(seq),
            payload: Self::payload(seq),
        }
    }

    pub fn bulk_range(&self, seqs: impl IntoIterator<Item = u32>) -> Vec<Inbound> {
        seqs.into_iter().map(|n| self.bulk(n)).collect()
    }

    pub fn start(&self, min: u32, max: u32) -> Inbound {
        Inbound::StartTransferRequested {
            device_id: self.device_id,
            device_min: SequenceNumber(min),
            device_max: SequenceNumber(max),
            session_info: self.session_info,
        }
    }

    pub fn connected(&self, connected: bool) -> Inbound {
        Inbound::ConnectionStateChanged {
            device_id: self.device_id,
            connected,
        }
    }

    pub fn cancel(&self) -> Inbound {
        Inbound::CancelTransfer {
            device_id: self.device_id,
        }
    }
}

impl Default for DeviceFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// Create fixtures for several distinct devices.
pub fn multi_device_fixtures(count: usize) -> Vec<DeviceFixture> {
    (0..count)
        .map(|i| DeviceFixture::with_id(0x1000_0000 + i as u32))
        .collect()
}
