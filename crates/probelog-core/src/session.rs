//! Session: the deduplicated record store for one device-session identity.
//!
//! A session merges records from the cursor channel and the bulk channel into
//! one map keyed by sequence number. It also carries the bookkeeping for the
//! outstanding bulk transfer: what was requested, what is still expected, and
//! how many cursor ticks have passed without bulk progress.

use std::collections::BTreeMap;

use bytes::Bytes;
use tracing::{debug, warn};

use crate::error::{CoreError, Result};
use crate::progress::{SessionStatus, UploadProgress};
use crate::range::RecordRange;
use crate::record::DataPoint;
use crate::types::{SequenceNumber, SessionId, SessionInfo};

/// Cursor ticks tolerated without bulk progress before a transfer is stalled.
pub const DEFAULT_STALE_THRESHOLD: u32 = 10;

/// Per-session tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Cursor ticks without a bulk record before the transfer counts as stalled.
    pub stale_threshold: u32,
}

impl SessionConfig {
    /// Create a validated config.
    pub fn new(stale_threshold: u32) -> Result<Self> {
        let config = Self { stale_threshold };
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every transfer stalled on arrival.
    pub fn validate(&self) -> Result<()> {
        if self.stale_threshold == 0 {
            return Err(CoreError::InvalidConfig(
                "stale_threshold must be at least one cursor tick".into(),
            ));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stale_threshold: DEFAULT_STALE_THRESHOLD,
        }
    }
}

/// One continuous run of sequence numbers from a single device power-on.
///
/// A session is mutated only through its own methods; the caller is expected
/// to hold it behind a single writer.
#[derive(Debug, Clone)]
pub struct Session {
    info: SessionInfo,
    config: SessionConfig,
    /// Unix millis at which sequence 0 was sampled. Fixed once known.
    start_time_ms: Option<i64>,
    records: BTreeMap<SequenceNumber, DataPoint>,
    next_expected_bulk: Option<SequenceNumber>,
    next_expected_cursor: Option<SequenceNumber>,
    total_requested: u32,
    total_expected: u32,
    transfer_count: u32,
    stale_counter: u32,
}

impl Session {
    /// Create an empty session.
    pub fn new(info: SessionInfo, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            info,
            config,
            start_time_ms: None,
            records: BTreeMap::new(),
            next_expected_bulk: None,
            next_expected_cursor: None,
            total_requested: 0,
            total_expected: 0,
            transfer_count: 0,
            stale_counter: config.stale_threshold,
        })
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    pub fn id(&self) -> SessionId {
        self.info.id
    }

    pub fn info(&self) -> &SessionInfo {
        &self.info
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Wall-clock estimate of sequence 0, in unix millis.
    pub fn start_time_ms(&self) -> Option<i64> {
        self.start_time_ms
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn contains(&self, seq: SequenceNumber) -> bool {
        self.records.contains_key(&seq)
    }

    pub fn get(&self, seq: SequenceNumber) -> Option<&DataPoint> {
        self.records.get(&seq)
    }

    /// All held records in ascending sequence order.
    pub fn data_points(&self) -> impl Iterator<Item = &DataPoint> {
        self.records.values()
    }

    pub fn next_expected_bulk(&self) -> Option<SequenceNumber> {
        self.next_expected_bulk
    }

    pub fn next_expected_cursor(&self) -> Option<SequenceNumber> {
        self.next_expected_cursor
    }

    pub fn stale_counter(&self) -> u32 {
        self.stale_counter
    }

    /// Progress of the outstanding bulk transfer.
    pub fn progress(&self) -> UploadProgress {
        UploadProgress {
            transferred: self.transfer_count,
            expected: self.total_expected,
            requested: self.total_requested,
        }
    }

    /// Snapshot of the held records.
    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            session_id: self.info.id,
            min_seq: self.records.keys().next().copied(),
            max_seq: self.records.keys().next_back().copied(),
            record_count: self.records.len(),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Timestamps
    // ─────────────────────────────────────────────────────────────────────────

    /// Fix the session start by back-computing from a known position.
    ///
    /// Has no effect once the start time is set, or for the unset sentinel.
    pub fn anchor_start_time(&mut self, seq: SequenceNumber, now_ms: i64) {
        if self.start_time_ms.is_some() || !seq.is_valid() {
            return;
        }
        let elapsed = i64::from(seq.0).saturating_mul(self.sample_period_ms());
        self.start_time_ms = Some(now_ms.saturating_sub(elapsed));
    }

    /// Wall-clock estimate for a sequence number, in unix millis.
    pub fn timestamp_of(&self, seq: SequenceNumber) -> Option<i64> {
        let start = self.start_time_ms?;
        Some(start.saturating_add(i64::from(seq.0).saturating_mul(self.sample_period_ms())))
    }

    fn sample_period_ms(&self) -> i64 {
        i64::try_from(self.info.sample_period.as_millis()).unwrap_or(i64::MAX)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Bulk requests
    // ─────────────────────────────────────────────────────────────────────────

    /// Begin a bulk transfer for `range`.
    ///
    /// Cursor records inside the range are left to the bulk channel. Records
    /// already held in the range are not expected again, so a partially filled
    /// session resumes without re-counting them. Calling this repeatedly for a
    /// retry resets the accounting to the same values.
    pub fn start_bulk_request(&mut self, range: RecordRange) -> UploadProgress {
        self.start_request(range, range.max().next())
    }

    /// Begin a backfill of a gap while cursor broadcasts keep advancing.
    ///
    /// Identical to [`Session::start_bulk_request`] except the cursor
    /// expectation continues from `cursor_at_request`.
    pub fn start_backfill_request(
        &mut self,
        range: RecordRange,
        cursor_at_request: SequenceNumber,
    ) -> UploadProgress {
        self.start_request(range, cursor_at_request.next())
    }

    fn start_request(&mut self, range: RecordRange, next_cursor: SequenceNumber) -> UploadProgress {
        let held = self.records.range(range.min()..=range.max()).count() as u32;

        self.next_expected_bulk = Some(range.min());
        self.next_expected_cursor = Some(next_cursor);
        self.total_requested = range.size();
        self.total_expected = range.size() - held;
        self.transfer_count = 0;
        self.stale_counter = self.config.stale_threshold;

        debug!(
            session = %self.info.id,
            %range,
            expected = self.total_expected,
            "bulk request started"
        );

        self.progress()
    }

    /// Where a bulk request should begin so records already held contiguously
    /// from the start are not requested again.
    pub fn bulk_request_start_sequence(&self, device_min: SequenceNumber) -> SequenceNumber {
        let mut keys = self.records.keys().copied();
        let first = match keys.next() {
            Some(first) if first <= device_min => first,
            _ => return device_min,
        };

        let mut prefix_end = first;
        for key in keys {
            if key.0 != prefix_end.0 + 1 {
                break;
            }
            prefix_end = key;
        }

        prefix_end.next().max(device_min)
    }

    /// Mark the bulk transfer finished. Safe to call at any time, any number
    /// of times; this is also how a caller abandons a transfer.
    pub fn complete(&mut self) -> SessionStatus {
        self.next_expected_bulk = None;
        self.status()
    }

    /// Forget the cursor expectation so the first broadcast after a reconnect
    /// is not read as a gap.
    pub fn expect_future_request(&mut self) {
        self.next_expected_cursor = None;
    }

    /// No bulk record has arrived for a full staleness window.
    pub fn is_stalled(&self) -> bool {
        self.stale_counter == 0
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Ingestion
    // ─────────────────────────────────────────────────────────────────────────

    /// Ingest a record from the bulk channel.
    ///
    /// Records may arrive in any order over a multi-hop link; only the key is
    /// used for deduplication. Any arrival proves the link is alive and
    /// restarts the staleness window.
    pub fn ingest_bulk_record(&mut self, seq: SequenceNumber, payload: Bytes) -> UploadProgress {
        if !seq.is_valid() {
            debug!(session = %self.info.id, "bulk record at unset sequence dropped");
            return self.progress();
        }

        if self.insert(seq, payload) {
            self.transfer_count = self.transfer_count.saturating_add(1);
        } else {
            debug!(session = %self.info.id, %seq, "duplicate bulk record");
        }

        self.stale_counter = self.config.stale_threshold;
        let next = seq.next();
        self.next_expected_bulk = Some(match self.next_expected_bulk {
            Some(current) => current.max(next),
            None => next,
        });

        self.progress()
    }

    /// Ingest a record from the cursor channel.
    ///
    /// Each call consumes one tick of the staleness window. A jump past the
    /// expected position is a gap: the record is stored anyway and the caller
    /// finds the hole with [`Session::missing_range`]. A record behind the
    /// expected position is stale and ignored.
    pub fn ingest_cursor_record(&mut self, seq: SequenceNumber, payload: Bytes) -> SessionStatus {
        self.stale_counter = self.stale_counter.saturating_sub(1);
        if !seq.is_valid() {
            debug!(session = %self.info.id, "cursor record at unset sequence dropped");
            return self.status();
        }

        // No prior expectation: accept whatever arrives first.
        let expected = *self.next_expected_cursor.get_or_insert(seq);

        if seq > expected {
            warn!(
                session = %self.info.id,
                expected = %expected,
                %seq,
                "cursor gap detected"
            );
            self.insert(seq, payload);
            self.next_expected_cursor = Some(seq.next());
        } else if seq < expected {
            debug!(
                session = %self.info.id,
                expected = %expected,
                %seq,
                "stale cursor record"
            );
        } else {
            self.insert(seq, payload);
            self.next_expected_cursor = Some(seq.next());
        }

        self.status()
    }

    /// Store a record. A later arrival replaces the payload at an existing
    /// key. Returns true when the key was new.
    fn insert(&mut self, seq: SequenceNumber, payload: Bytes) -> bool {
        self.records
            .insert(seq, DataPoint::new(seq, payload))
            .is_none()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Gap analysis
    // ─────────────────────────────────────────────────────────────────────────

    /// Find the leading run of missing records in `start..=end`.
    ///
    /// Returns the inclusive range from the first absent key to the last
    /// absent key before a held record reappears (or `end`). Only the first
    /// run is reported; call again after each backfill to find the next.
    pub fn missing_range(
        &self,
        start: SequenceNumber,
        end: SequenceNumber,
    ) -> Option<RecordRange> {
        RecordRange::new(start, end)?;

        let mut cursor = u64::from(start.0);
        let mut lower = None;
        for key in self.records.range(start..=end).map(|(k, _)| u64::from(k.0)) {
            if key != cursor {
                lower = Some(cursor);
                break;
            }
            cursor += 1;
        }

        let lower = match lower {
            Some(lower) => lower,
            None if cursor <= u64::from(end.0) => cursor,
            None => return None,
        };
        let lower = SequenceNumber(lower as u32);

        let upper = self
            .records
            .range(lower..=end)
            .next()
            .map(|(k, _)| k.prev())
            .unwrap_or(end);

        RecordRange::new(lower, upper)
    }
}
