//! Per-device reconciliation state machine.
//!
//! Merges cursor broadcasts and bulk responses into the device's log, decides
//! when to request or backfill records, and tracks the caller-visible
//! [`UploadState`].

use std::mem;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use tracing::{debug, info, warn};

use probelog_core::{
    DeviceId, DeviceLog, RecordRange, SequenceNumber, SessionConfig, SessionInfo, SessionStatus,
};

use crate::error::{Result, SyncError};
use crate::messages::{Inbound, Outbound, UploadState};

/// Configuration for coordinator behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Settings for every session the coordinator opens.
    pub session: SessionConfig,
    /// Whether cursor gaps seen after completion trigger backfill requests.
    pub backfill_on_gap: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            backfill_on_gap: true,
        }
    }
}

/// Reconciliation state for one device.
///
/// Every method takes `&mut self`: events for one device must be fed through
/// a single owner in arrival order.
#[derive(Debug)]
pub struct LogCoordinator {
    device_id: DeviceId,
    config: CoordinatorConfig,
    log: DeviceLog,
    state: UploadState,
    /// Gap currently being refilled in the background.
    backfill: Option<RecordRange>,
    /// Gaps below this position were given up after a stalled backfill.
    backfill_floor: SequenceNumber,
}

impl LogCoordinator {
    /// Create a coordinator for a device seen for the first time.
    pub fn new(device_id: DeviceId, config: CoordinatorConfig) -> Result<Self> {
        let log = DeviceLog::new(device_id, config.session)?;
        Ok(Self {
            device_id,
            config,
            log,
            state: UploadState::Unavailable,
            backfill: None,
            backfill_floor: SequenceNumber::ZERO,
        })
    }

    pub fn device_id(&self) -> DeviceId {
        self.device_id
    }

    /// Caller-visible upload state.
    pub fn state(&self) -> UploadState {
        self.state
    }

    /// The device's full log.
    pub fn log(&self) -> &DeviceLog {
        &self.log
    }

    /// Gap currently being backfilled, if any.
    pub fn backfill(&self) -> Option<RecordRange> {
        self.backfill
    }

    /// Status of the current session.
    pub fn status(&self) -> Option<SessionStatus> {
        self.log.status()
    }

    /// Apply one inbound event and return what must be sent out.
    pub fn handle(&mut self, event: Inbound) -> Result<Vec<Outbound>> {
        let got = event.device_id();
        if got != self.device_id {
            return Err(SyncError::DeviceMismatch {
                expected: self.device_id,
                got,
            });
        }

        let mut out = Vec::new();
        match event {
            Inbound::ConnectionStateChanged { connected, .. } => {
                self.on_connection_changed(connected, &mut out);
            }
            Inbound::CursorBroadcast {
                sequence,
                payload,
                session_info,
                ..
            } => self.on_cursor(sequence, payload, session_info, &mut out),
            Inbound::BulkResponse {
                sequence, payload, ..
            } => self.on_bulk(sequence, payload, &mut out),
            Inbound::StartTransferRequested {
                device_min,
                device_max,
                session_info,
                ..
            } => self.start_transfer(device_min, device_max, session_info, &mut out)?,
            Inbound::CancelTransfer { .. } => self.cancel_transfer(&mut out),
        }
        Ok(out)
    }

    /// Drop every session and start over. The device's history is lost.
    pub fn reset(&mut self) -> Vec<Outbound> {
        let mut out = Vec::new();
        self.log.clear();
        self.backfill = None;
        self.backfill_floor = SequenceNumber::ZERO;
        if !self.state.is_unavailable() {
            self.transition(UploadState::TransferNeeded, &mut out);
        }
        out
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Event handlers
    // ─────────────────────────────────────────────────────────────────────────

    fn on_connection_changed(&mut self, connected: bool, out: &mut Vec<Outbound>) {
        if connected || self.state.is_unavailable() {
            return;
        }
        info!(device = %self.device_id, "device disconnected");
        self.log.expect_future_request();
        self.backfill = None;
        self.transition(UploadState::Unavailable, out);
    }

    fn on_cursor(
        &mut self,
        seq: SequenceNumber,
        payload: Bytes,
        session_info: SessionInfo,
        out: &mut Vec<Outbound>,
    ) {
        match self.state {
            UploadState::Unavailable => {
                self.transition(UploadState::TransferNeeded, out);
                return;
            }
            UploadState::TransferNeeded => return,
            UploadState::InProgress { .. } | UploadState::Complete { .. } => {}
        }

        let current = self.log.current_session().map(|s| s.id());
        if current != Some(session_info.id) {
            info!(
                device = %self.device_id,
                session = %session_info.id,
                "cursor reports a new session"
            );
            self.backfill = None;
            self.backfill_floor = SequenceNumber::ZERO;
            self.transition(UploadState::TransferNeeded, out);
            return;
        }

        let Some(status) = self.log.ingest_cursor_record(seq, payload) else {
            return;
        };

        if self.state.is_in_progress() {
            if self.log.is_stalled() {
                warn!(device = %self.device_id, "bulk transfer stalled, forcing completion");
                self.finish(out);
            }
            return;
        }

        if self.backfill.is_some() && self.log.is_stalled() {
            self.abandon_backfill();
        }

        if self.backfill.is_some() {
            return;
        }

        match self.next_gap(&status) {
            Some(gap) if self.config.backfill_on_gap => {
                self.log.start_backfill_request(gap, seq);
                self.backfill = Some(gap);
                info!(device = %self.device_id, range = %gap, "backfilling gap");
                out.push(Outbound::IssueBulkRequest {
                    device_id: self.device_id,
                    range: gap,
                });
            }
            _ => self.transition(UploadState::complete_from(&status), out),
        }
    }

    fn on_bulk(&mut self, seq: SequenceNumber, payload: Bytes, out: &mut Vec<Outbound>) {
        let Some(progress) = self.log.ingest_bulk_record(seq, payload) else {
            debug!(device = %self.device_id, %seq, "bulk record with no session");
            return;
        };

        match self.state {
            UploadState::InProgress { .. } => {
                if progress.is_complete() {
                    self.finish(out);
                } else {
                    self.transition(
                        UploadState::InProgress {
                            transferred: progress.transferred,
                            requested: progress.requested,
                        },
                        out,
                    );
                }
            }
            UploadState::Complete { .. } => {
                if self.backfill.is_some() {
                    if !progress.is_complete() {
                        return;
                    }
                    info!(device = %self.device_id, "backfill complete");
                    self.backfill = None;
                    self.log.complete();
                }
                if let Some(status) = self.log.status() {
                    if !self.config.backfill_on_gap || self.next_gap(&status).is_none() {
                        self.transition(UploadState::complete_from(&status), out);
                    }
                }
            }
            UploadState::Unavailable | UploadState::TransferNeeded => {
                debug!(device = %self.device_id, %seq, "late bulk record");
            }
        }
    }

    fn start_transfer(
        &mut self,
        device_min: SequenceNumber,
        device_max: SequenceNumber,
        session_info: SessionInfo,
        out: &mut Vec<Outbound>,
    ) -> Result<()> {
        let range = self
            .log
            .prepare_request(device_min, device_max, session_info, now_millis())?;
        self.backfill = None;

        let Some(range) = range else {
            debug!(device = %self.device_id, "log already holds every device record");
            self.finish(out);
            return Ok(());
        };

        let Some(progress) = self.log.start_bulk_request(range) else {
            return Ok(());
        };

        info!(
            device = %self.device_id,
            %range,
            expected = progress.expected,
            "requesting records"
        );
        out.push(Outbound::IssueBulkRequest {
            device_id: self.device_id,
            range,
        });

        if progress.is_complete() {
            self.finish(out);
        } else {
            self.transition(
                UploadState::InProgress {
                    transferred: progress.transferred,
                    requested: progress.requested,
                },
                out,
            );
        }
        Ok(())
    }

    fn cancel_transfer(&mut self, out: &mut Vec<Outbound>) {
        if self.state.is_in_progress() {
            info!(device = %self.device_id, "transfer cancelled");
            self.finish(out);
        } else if self.backfill.take().is_some() {
            info!(device = %self.device_id, "backfill cancelled");
            self.log.complete();
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Helpers
    // ─────────────────────────────────────────────────────────────────────────

    /// Complete the current request and publish the resulting state.
    fn finish(&mut self, out: &mut Vec<Outbound>) {
        if let Some(status) = self.log.complete() {
            self.transition(UploadState::complete_from(&status), out);
        }
    }

    /// Give up on the outstanding backfill; its gap is not retried.
    fn abandon_backfill(&mut self) {
        if let Some(gap) = self.backfill.take() {
            warn!(device = %self.device_id, range = %gap, "backfill stalled, giving up gap");
            self.backfill_floor = self.backfill_floor.max(gap.max().next());
            self.log.complete();
        }
    }

    /// First missing run between the held bounds, above the give-up floor.
    fn next_gap(&self, status: &SessionStatus) -> Option<RecordRange> {
        if !status.has_dropped_records() {
            return None;
        }
        let span = status.span()?;
        let start = span.min().max(self.backfill_floor);
        self.log.missing_range(start, span.max())
    }

    fn transition(&mut self, next: UploadState, out: &mut Vec<Outbound>) {
        if self.state == next {
            return;
        }
        if mem::discriminant(&self.state) != mem::discriminant(&next) {
            info!(device = %self.device_id, from = ?self.state, to = ?next, "upload state changed");
        } else {
            debug!(device = %self.device_id, state = ?next, "upload state updated");
        }
        self.state = next;
        out.push(Outbound::UploadStateChanged {
            device_id: self.device_id,
            state: next,
        });
    }
}

/// Get current time in milliseconds.
fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use probelog_core::{SessionId, DEFAULT_STALE_THRESHOLD};
    use proptest::prelude::*;
    use std::time::Duration;

    const DEVICE: DeviceId = DeviceId(0x1000_00AB);

    fn seq(n: u32) -> SequenceNumber {
        SequenceNumber(n)
    }

    fn info(id: u32) -> SessionInfo {
        SessionInfo::new(SessionId(id), Duration::from_secs(5))
    }

    fn cursor(n: u32, session: u32) -> Inbound {
        Inbound::CursorBroadcast {
            device_id: DEVICE,
            sequence: seq(n),
            payload: Bytes::from(vec![n as u8]),
            session_info: info(session),
        }
    }

    fn bulk(n: u32) -> Inbound {
        Inbound::BulkResponse {
            device_id: DEVICE,
            sequence: seq(n),
            payload: Bytes::from(vec![n as u8]),
        }
    }

    fn start(min: u32, max: u32, session: u32) -> Inbound {
        Inbound::StartTransferRequested {
            device_id: DEVICE,
            device_min: seq(min),
            device_max: seq(max),
            session_info: info(session),
        }
    }

    fn connection(connected: bool) -> Inbound {
        Inbound::ConnectionStateChanged {
            device_id: DEVICE,
            connected,
        }
    }

    fn range(min: u32, max: u32) -> RecordRange {
        RecordRange::new(seq(min), seq(max)).unwrap()
    }

    fn bulk_requests(out: &[Outbound]) -> Vec<RecordRange> {
        out.iter()
            .filter_map(|e| match e {
                Outbound::IssueBulkRequest { range, .. } => Some(*range),
                _ => None,
            })
            .collect()
    }

    fn coordinator() -> LogCoordinator {
        LogCoordinator::new(DEVICE, CoordinatorConfig::default()).unwrap()
    }

    /// A coordinator that has fully uploaded `0..=max` in session 1.
    fn completed(max: u32) -> LogCoordinator {
        let mut c = coordinator();
        c.handle(cursor(max, 1)).unwrap();
        c.handle(start(0, max, 1)).unwrap();
        for n in 0..=max {
            c.handle(bulk(n)).unwrap();
        }
        assert!(c.state().is_complete());
        c
    }

    #[test]
    fn test_invalid_config_fails_at_construction() {
        let config = CoordinatorConfig {
            session: SessionConfig { stale_threshold: 0 },
            backfill_on_gap: true,
        };
        assert!(matches!(
            LogCoordinator::new(DEVICE, config),
            Err(SyncError::Core(_))
        ));
    }

    #[test]
    fn test_wrong_device_rejected() {
        let mut c = coordinator();
        let result = c.handle(Inbound::CancelTransfer {
            device_id: DeviceId(1),
        });
        assert!(matches!(result, Err(SyncError::DeviceMismatch { .. })));
    }

    #[test]
    fn test_first_cursor_makes_transfer_needed() {
        let mut c = coordinator();
        let out = c.handle(cursor(10, 1)).unwrap();

        assert_eq!(c.state(), UploadState::TransferNeeded);
        assert_eq!(
            out,
            vec![Outbound::UploadStateChanged {
                device_id: DEVICE,
                state: UploadState::TransferNeeded,
            }]
        );

        // Waits for the caller.
        assert!(c.handle(cursor(11, 1)).unwrap().is_empty());
    }

    #[test]
    fn test_start_transfer_issues_request() {
        let mut c = coordinator();
        c.handle(cursor(99, 1)).unwrap();
        let out = c.handle(start(0, 99, 1)).unwrap();

        assert_eq!(bulk_requests(&out), vec![range(0, 99)]);
        assert_eq!(
            c.state(),
            UploadState::InProgress {
                transferred: 0,
                requested: 100,
            }
        );
    }

    #[test]
    fn test_bulk_progress_then_complete() {
        let mut c = coordinator();
        c.handle(cursor(4, 1)).unwrap();
        c.handle(start(0, 4, 1)).unwrap();

        c.handle(bulk(2)).unwrap();
        assert_eq!(
            c.state(),
            UploadState::InProgress {
                transferred: 1,
                requested: 5,
            }
        );

        for n in [0, 4, 1, 3] {
            c.handle(bulk(n)).unwrap();
        }
        assert_eq!(
            c.state(),
            UploadState::Complete {
                min_seq: Some(seq(0)),
                max_seq: Some(seq(4)),
                total: 5,
            }
        );
    }

    #[test]
    fn test_stall_forces_completion() {
        let mut c = coordinator();
        c.handle(cursor(99, 1)).unwrap();
        c.handle(start(0, 99, 1)).unwrap();
        c.handle(bulk(0)).unwrap();

        for n in 0..DEFAULT_STALE_THRESHOLD {
            assert!(c.state().is_in_progress());
            c.handle(cursor(100 + n, 1)).unwrap();
        }

        assert!(c.state().is_complete());
        assert!(c.log().is_stalled());
    }

    #[test]
    fn test_disconnect_makes_unavailable() {
        let mut c = completed(9);
        let out = c.handle(connection(false)).unwrap();

        assert_eq!(c.state(), UploadState::Unavailable);
        assert_eq!(out.len(), 1);
        assert_eq!(c.log().current_session().unwrap().next_expected_cursor(), None);

        // Already unavailable: nothing more to say.
        assert!(c.handle(connection(false)).unwrap().is_empty());
        assert!(c.handle(connection(true)).unwrap().is_empty());
    }

    #[test]
    fn test_gap_after_completion_triggers_backfill() {
        let mut c = completed(9);
        let complete = c.state();

        c.handle(cursor(10, 1)).unwrap();
        let out = c.handle(cursor(15, 1)).unwrap();

        assert_eq!(bulk_requests(&out), vec![range(11, 14)]);
        assert_eq!(c.backfill(), Some(range(11, 14)));
        assert!(c.state().is_complete());
        assert_ne!(c.state(), complete);

        // Outstanding backfill is not re-issued on the next tick.
        let out = c.handle(cursor(16, 1)).unwrap();
        assert!(bulk_requests(&out).is_empty());

        for n in 11..=14 {
            c.handle(bulk(n)).unwrap();
        }
        assert_eq!(c.backfill(), None);
        assert_eq!(
            c.state(),
            UploadState::Complete {
                min_seq: Some(seq(0)),
                max_seq: Some(seq(16)),
                total: 17,
            }
        );
    }

    #[test]
    fn test_backfill_disabled() {
        let config = CoordinatorConfig {
            backfill_on_gap: false,
            ..CoordinatorConfig::default()
        };
        let mut c = LogCoordinator::new(DEVICE, config).unwrap();
        c.handle(cursor(3, 1)).unwrap();
        c.handle(start(0, 3, 1)).unwrap();
        for n in 0..=3 {
            c.handle(bulk(n)).unwrap();
        }

        c.handle(cursor(4, 1)).unwrap();
        let out = c.handle(cursor(8, 1)).unwrap();
        assert!(bulk_requests(&out).is_empty());
        assert_eq!(c.backfill(), None);

        // The gap is left alone but Complete still tracks the log.
        assert_eq!(
            c.state(),
            UploadState::Complete {
                min_seq: Some(seq(0)),
                max_seq: Some(seq(8)),
                total: 6,
            }
        );
        c.handle(cursor(9, 1)).unwrap();
        for n in 5..=7 {
            c.handle(bulk(n)).unwrap();
        }
        assert_eq!(
            c.state(),
            UploadState::Complete {
                min_seq: Some(seq(0)),
                max_seq: Some(seq(9)),
                total: 10,
            }
        );
    }

    #[test]
    fn test_unset_device_max_requests_nothing() {
        let mut c = coordinator();
        c.handle(cursor(9, 1)).unwrap();

        let out = c
            .handle(Inbound::StartTransferRequested {
                device_id: DEVICE,
                device_min: seq(0),
                device_max: SequenceNumber(u32::MAX),
                session_info: info(1),
            })
            .unwrap();

        assert!(bulk_requests(&out).is_empty());
        assert_eq!(
            c.state(),
            UploadState::Complete {
                min_seq: None,
                max_seq: None,
                total: 0,
            }
        );
    }

    #[test]
    fn test_stalled_backfill_is_abandoned() {
        let mut c = completed(9);
        c.handle(cursor(10, 1)).unwrap();
        c.handle(cursor(15, 1)).unwrap();
        assert_eq!(c.backfill(), Some(range(11, 14)));

        let mut next = 16;
        for _ in 0..DEFAULT_STALE_THRESHOLD {
            c.handle(cursor(next, 1)).unwrap();
            next += 1;
        }

        assert_eq!(c.backfill(), None);
        assert_eq!(
            c.state(),
            UploadState::Complete {
                min_seq: Some(seq(0)),
                max_seq: Some(seq(next - 1)),
                total: (next - 4) as usize,
            }
        );
    }

    #[test]
    fn test_new_session_id_needs_transfer() {
        let mut c = completed(49);
        let out = c.handle(cursor(0, 2)).unwrap();

        assert_eq!(c.state(), UploadState::TransferNeeded);
        assert_eq!(out.len(), 1);

        let out = c.handle(start(0, 3, 2)).unwrap();
        assert_eq!(bulk_requests(&out), vec![range(0, 3)]);
        assert_eq!(c.log().sessions().len(), 2);
    }

    #[test]
    fn test_nothing_to_transfer_completes() {
        let mut c = completed(9);
        c.handle(connection(false)).unwrap();
        c.handle(cursor(9, 1)).unwrap();
        assert_eq!(c.state(), UploadState::TransferNeeded);

        let out = c.handle(start(0, 9, 1)).unwrap();
        assert!(bulk_requests(&out).is_empty());
        assert!(c.state().is_complete());
    }

    #[test]
    fn test_cancel_in_progress() {
        let mut c = coordinator();
        c.handle(cursor(9, 1)).unwrap();
        c.handle(start(0, 9, 1)).unwrap();
        c.handle(bulk(0)).unwrap();

        c.handle(Inbound::CancelTransfer { device_id: DEVICE }).unwrap();
        assert_eq!(
            c.state(),
            UploadState::Complete {
                min_seq: Some(seq(0)),
                max_seq: Some(seq(0)),
                total: 1,
            }
        );

        // Cancelling again is harmless.
        assert!(c
            .handle(Inbound::CancelTransfer { device_id: DEVICE })
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_late_bulk_record_keeps_state() {
        let mut c = completed(4);
        c.handle(connection(false)).unwrap();
        let out = c.handle(bulk(7)).unwrap();

        assert!(out.is_empty());
        assert_eq!(c.state(), UploadState::Unavailable);
        assert!(c.log().current_session().unwrap().contains(seq(7)));
    }

    #[test]
    fn test_reset_clears_log() {
        let mut c = completed(4);
        let out = c.reset();

        assert_eq!(c.state(), UploadState::TransferNeeded);
        assert_eq!(out.len(), 1);
        assert!(c.log().sessions().is_empty());
    }

    proptest! {
        #[test]
        fn test_bulk_arrival_order_does_not_matter(
            order in (1u32..60).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
        ) {
            let max = order.len() as u32 - 1;
            let mut c = coordinator();
            c.handle(cursor(max, 1)).unwrap();
            let mut requests = bulk_requests(&c.handle(start(0, max, 1)).unwrap());

            for n in &order {
                prop_assert!(c.state().is_in_progress());
                requests.extend(bulk_requests(&c.handle(bulk(*n)).unwrap()));
                // Duplicates are absorbed.
                c.handle(bulk(*n)).unwrap();
            }

            prop_assert_eq!(requests, vec![range(0, max)]);
            prop_assert_eq!(
                c.state(),
                UploadState::Complete {
                    min_seq: Some(seq(0)),
                    max_seq: Some(seq(max)),
                    total: order.len(),
                }
            );
        }
    }
}
