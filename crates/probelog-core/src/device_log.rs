//! DeviceLog: the ordered sessions recorded for one device.
//!
//! The last session is the current one and receives every mutation. Earlier
//! sessions are frozen and kept only so the full history survives resets.

use bytes::Bytes;
use tracing::info;

use crate::error::Result;
use crate::progress::{SessionStatus, UploadProgress};
use crate::range::RecordRange;
use crate::record::LoggedPoint;
use crate::session::{Session, SessionConfig};
use crate::types::{DeviceId, SequenceNumber, SessionInfo};

/// Append-only list of sessions for one device serial number.
#[derive(Debug, Clone)]
pub struct DeviceLog {
    device_id: DeviceId,
    config: SessionConfig,
    sessions: Vec<Session>,
}

impl DeviceLog {
    /// Create an empty log. The first session opens on first contact.
    pub fn new(device_id: DeviceId, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            device_id,
            config,
            sessions: Vec::new(),
        })
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// All sessions, oldest first.
    pub fn sessions(&self) -> &[Session] {
        &self.sessions
    }

    /// The session receiving new records.
    pub fn current_session(&self) -> Option<&Session> {
        self.sessions.last()
    }

    fn current_mut(&mut self) -> Option<&mut Session> {
        self.sessions.last_mut()
    }

    /// Open a new session if none exists or the device reports a new id.
    ///
    /// `latest` anchors the new session's start time at `now_ms`. Returns
    /// true when a session was opened.
    pub fn ensure_session(
        &mut self,
        session_info: SessionInfo,
        latest: SequenceNumber,
        now_ms: i64,
    ) -> Result<bool> {
        if let Some(current) = self.current_session() {
            if current.id() == session_info.id {
                return Ok(false);
            }
            info!(
                device = %self.device_id,
                previous = %current.id(),
                session = %session_info.id,
                "device session changed"
            );
        } else {
            info!(device = %self.device_id, session = %session_info.id, "first session opened");
        }

        let mut session = Session::new(session_info, self.config)?;
        session.anchor_start_time(latest, now_ms);
        self.sessions.push(session);
        Ok(true)
    }

    /// Decide which records still need to be fetched from the device.
    ///
    /// Opens a new session first when `session_info` names a different
    /// session. Returns `None` when nothing is needed.
    pub fn prepare_request(
        &mut self,
        device_min: SequenceNumber,
        device_max: SequenceNumber,
        session_info: SessionInfo,
        now_ms: i64,
    ) -> Result<Option<RecordRange>> {
        self.ensure_session(session_info, device_max, now_ms)?;

        let start = match self.current_session() {
            Some(current) if !current.is_empty() => current.bulk_request_start_sequence(device_min),
            _ => device_min,
        };

        Ok(RecordRange::new(start, device_max))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Delegation to the current session
    // ─────────────────────────────────────────────────────────────────────────

    pub fn start_bulk_request(&mut self, range: RecordRange) -> Option<UploadProgress> {
        self.current_mut().map(|s| s.start_bulk_request(range))
    }

    pub fn start_backfill_request(
        &mut self,
        range: RecordRange,
        cursor_at_request: SequenceNumber,
    ) -> Option<UploadProgress> {
        self.current_mut()
            .map(|s| s.start_backfill_request(range, cursor_at_request))
    }

    pub fn ingest_bulk_record(
        &mut self,
        seq: SequenceNumber,
        payload: Bytes,
    ) -> Option<UploadProgress> {
        self.current_mut().map(|s| s.ingest_bulk_record(seq, payload))
    }

    pub fn ingest_cursor_record(
        &mut self,
        seq: SequenceNumber,
        payload: Bytes,
    ) -> Option<SessionStatus> {
        self.current_mut().map(|s| s.ingest_cursor_record(seq, payload))
    }

    pub fn complete(&mut self) -> Option<SessionStatus> {
        self.current_mut().map(Session::complete)
    }

    pub fn expect_future_request(&mut self) {
        if let Some(current) = self.current_mut() {
            current.expect_future_request();
        }
    }

    pub fn missing_range(
        &self,
        start: SequenceNumber,
        end: SequenceNumber,
    ) -> Option<RecordRange> {
        self.current_session()?.missing_range(start, end)
    }

    pub fn is_stalled(&self) -> bool {
        self.current_session().is_some_and(Session::is_stalled)
    }

    pub fn progress(&self) -> Option<UploadProgress> {
        self.current_session().map(Session::progress)
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.current_session().map(Session::status)
    }

    /// Records held by the current session.
    pub fn record_count(&self) -> usize {
        self.current_session().map_or(0, Session::len)
    }

    /// Records held across every session.
    pub fn total_record_count(&self) -> usize {
        self.sessions.iter().map(Session::len).sum()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Export
    // ─────────────────────────────────────────────────────────────────────────

    /// Every record ever logged, in session order then sequence order.
    ///
    /// A pure snapshot read; call again for a fresh pass.
    pub fn history(&self) -> impl Iterator<Item = LoggedPoint> + '_ {
        self.sessions.iter().flat_map(|session| {
            session.data_points().map(move |point| LoggedPoint {
                session_id: session.id(),
                timestamp_ms: session.timestamp_of(point.sequence),
                point: point.clone(),
            })
        })
    }

    /// Drop every session.
    pub fn clear(&mut self) {
        info!(device = %self.device_id, sessions = self.sessions.len(), "device log cleared");
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SessionId;
    use std::time::Duration;

    const NOW: i64 = 1_736_870_400_000;

    fn seq(n: u32) -> SequenceNumber {
        SequenceNumber(n)
    }

    fn info(id: u32) -> SessionInfo {
        SessionInfo::new(SessionId(id), Duration::from_secs(1))
    }

    fn new_log() -> DeviceLog {
        DeviceLog::new(DeviceId(0x1000_0001), SessionConfig::default()).unwrap()
    }

    fn fill(log: &mut DeviceLog, seqs: impl IntoIterator<Item = u32>) {
        for n in seqs {
            log.ingest_bulk_record(seq(n), Bytes::from(vec![n as u8]));
        }
    }

    #[test]
    fn test_empty_log_requests_everything() {
        let mut log = new_log();
        let range = log.prepare_request(seq(0), seq(99), info(1), NOW).unwrap();

        assert_eq!(range, RecordRange::new(seq(0), seq(99)));
        assert_eq!(log.sessions().len(), 1);
    }

    #[test]
    fn test_new_session_anchors_start_time() {
        let mut log = new_log();
        log.prepare_request(seq(0), seq(99), info(1), NOW).unwrap();

        let session = log.current_session().unwrap();
        assert_eq!(session.start_time_ms(), Some(NOW - 99_000));
    }

    #[test]
    fn test_resume_after_partial_transfer() {
        let mut log = new_log();
        let range = log
            .prepare_request(seq(0), seq(99), info(1), NOW)
            .unwrap()
            .unwrap();
        log.start_bulk_request(range);
        fill(&mut log, 0..60);

        // Disconnect, then reconnect with the same session.
        log.expect_future_request();
        let session = log.current_session().unwrap();
        assert_eq!(session.bulk_request_start_sequence(seq(0)), seq(60));

        let range = log.prepare_request(seq(0), seq(149), info(1), NOW).unwrap();
        assert_eq!(range, RecordRange::new(seq(60), seq(149)));
        assert_eq!(log.sessions().len(), 1);
    }

    #[test]
    fn test_nothing_needed_returns_none() {
        let mut log = new_log();
        log.prepare_request(seq(0), seq(9), info(1), NOW).unwrap();
        fill(&mut log, 0..10);

        assert_eq!(log.prepare_request(seq(0), seq(9), info(1), NOW).unwrap(), None);
    }

    #[test]
    fn test_unset_device_max_needs_nothing() {
        let mut log = new_log();
        let range = log
            .prepare_request(seq(0), SequenceNumber(u32::MAX), info(1), NOW)
            .unwrap();

        assert_eq!(range, None);
        assert_eq!(log.sessions().len(), 1);
        assert_eq!(log.current_session().unwrap().start_time_ms(), None);
    }

    #[test]
    fn test_session_rollover_keeps_history() {
        let mut log = new_log();
        log.prepare_request(seq(0), seq(49), info(1), NOW).unwrap();
        fill(&mut log, 0..50);

        let range = log.prepare_request(seq(0), seq(4), info(2), NOW).unwrap();
        assert_eq!(range, RecordRange::new(seq(0), seq(4)));
        assert_eq!(log.sessions().len(), 2);
        assert_eq!(log.record_count(), 0);

        fill(&mut log, 0..5);

        let history: Vec<_> = log.history().collect();
        assert_eq!(history.len(), 55);
        assert!(history[..50].iter().all(|p| p.session_id == SessionId(1)));
        assert!(history[50..].iter().all(|p| p.session_id == SessionId(2)));
        assert_eq!(history[49].point.sequence, seq(49));
        assert_eq!(history[50].point.sequence, seq(0));
    }

    #[test]
    fn test_superseded_session_is_frozen() {
        let mut log = new_log();
        log.prepare_request(seq(0), seq(9), info(1), NOW).unwrap();
        fill(&mut log, 0..10);
        log.prepare_request(seq(0), seq(9), info(2), NOW).unwrap();

        fill(&mut log, 10..12);
        assert_eq!(log.sessions()[0].len(), 10);
        assert_eq!(log.sessions()[1].len(), 2);
    }

    #[test]
    fn test_operations_without_session_are_noops() {
        let mut log = new_log();
        assert!(log.ingest_cursor_record(seq(1), Bytes::new()).is_none());
        assert!(log.complete().is_none());
        assert!(!log.is_stalled());
        assert_eq!(log.history().count(), 0);
    }

    #[test]
    fn test_clear_drops_sessions() {
        let mut log = new_log();
        log.prepare_request(seq(0), seq(9), info(1), NOW).unwrap();
        fill(&mut log, 0..10);

        log.clear();
        assert!(log.sessions().is_empty());
        assert_eq!(log.total_record_count(), 0);
    }

    #[test]
    fn test_history_carries_timestamps() {
        let mut log = new_log();
        log.prepare_request(seq(0), seq(10), info(1), NOW).unwrap();
        fill(&mut log, [4]);

        let point = log.history().next().unwrap();
        assert_eq!(point.timestamp_ms, Some(NOW - 10_000 + 4_000));
    }
}
