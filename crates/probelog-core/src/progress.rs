//! Value snapshots returned from session mutations.
//!
//! Neither type is stored; each call produces a fresh snapshot.

use serde::{Deserialize, Serialize};

use crate::range::RecordRange;
use crate::types::{SequenceNumber, SessionId};

/// Progress of the outstanding bulk transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct UploadProgress {
    /// New records received since the request started.
    pub transferred: u32,
    /// Records in the requested range that were not already held.
    pub expected: u32,
    /// Size of the requested range.
    pub requested: u32,
}

impl UploadProgress {
    /// Every record the request could deliver has arrived.
    pub fn is_complete(&self) -> bool {
        self.transferred >= self.expected
    }

    /// Completion percentage in `0..=100`.
    pub fn percent(&self) -> u8 {
        if self.expected == 0 {
            return 100;
        }
        let pct = u64::from(self.transferred.min(self.expected)) * 100 / u64::from(self.expected);
        pct as u8
    }
}

/// Snapshot of what a session holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub session_id: SessionId,
    /// Lowest held sequence number.
    pub min_seq: Option<SequenceNumber>,
    /// Highest held sequence number.
    pub max_seq: Option<SequenceNumber>,
    /// Number of distinct records held.
    pub record_count: usize,
}

impl SessionStatus {
    /// Session id rendered for display and export.
    pub fn session_id_string(&self) -> String {
        self.session_id.to_hex()
    }

    /// Span between the lowest and highest held records.
    pub fn span(&self) -> Option<RecordRange> {
        match (self.min_seq, self.max_seq) {
            (Some(min), Some(max)) => RecordRange::new(min, max),
            _ => None,
        }
    }

    /// Positions inside [`SessionStatus::span`] with no record.
    pub fn dropped_count(&self) -> u32 {
        match self.span() {
            Some(span) => span.size().saturating_sub(self.record_count as u32),
            None => 0,
        }
    }

    /// Check whether any record inside the span is missing.
    pub fn has_dropped_records(&self) -> bool {
        self.dropped_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_complete() {
        let progress = UploadProgress {
            transferred: 10,
            expected: 10,
            requested: 12,
        };
        assert!(progress.is_complete());
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_progress_partial() {
        let progress = UploadProgress {
            transferred: 1,
            expected: 4,
            requested: 4,
        };
        assert!(!progress.is_complete());
        assert_eq!(progress.percent(), 25);
    }

    #[test]
    fn test_nothing_expected_is_complete() {
        let progress = UploadProgress {
            transferred: 0,
            expected: 0,
            requested: 5,
        };
        assert!(progress.is_complete());
        assert_eq!(progress.percent(), 100);
    }

    #[test]
    fn test_status_dropped_count() {
        let status = SessionStatus {
            session_id: SessionId(1),
            min_seq: Some(SequenceNumber(5)),
            max_seq: Some(SequenceNumber(10)),
            record_count: 2,
        };
        assert_eq!(status.dropped_count(), 4);
        assert!(status.has_dropped_records());
        assert_eq!(status.session_id_string(), "00000001");
    }

    #[test]
    fn test_empty_status_has_no_drops() {
        let status = SessionStatus {
            session_id: SessionId(1),
            min_seq: None,
            max_seq: None,
            record_count: 0,
        };
        assert_eq!(status.dropped_count(), 0);
        assert!(status.span().is_none());
    }
}
