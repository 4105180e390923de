//! Inclusive ranges of sequence numbers.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::SequenceNumber;

/// An inclusive span of sequence numbers, `min..=max`.
///
/// A `RecordRange` always holds at least one valid position: bounds with
/// `min > max`, or a bound at the unset sentinel, normalize to "no range"
/// (`None`) at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordRange {
    min: SequenceNumber,
    max: SequenceNumber,
}

impl RecordRange {
    /// Build a range, returning `None` when `min > max` or `max` is unset.
    pub fn new(min: SequenceNumber, max: SequenceNumber) -> Option<Self> {
        if min > max || !max.is_valid() {
            None
        } else {
            Some(Self { min, max })
        }
    }

    /// A range holding exactly one position. The sentinel clamps to
    /// [`SequenceNumber::MAX`].
    pub fn single(seq: SequenceNumber) -> Self {
        let seq = seq.min(SequenceNumber::MAX);
        Self { min: seq, max: seq }
    }

    /// First position in the range.
    pub fn min(&self) -> SequenceNumber {
        self.min
    }

    /// Last position in the range.
    pub fn max(&self) -> SequenceNumber {
        self.max
    }

    /// Number of positions covered, `max - min + 1`.
    pub fn size(&self) -> u32 {
        (self.max.0 - self.min.0).saturating_add(1)
    }

    /// Check whether `seq` lies inside the range.
    pub fn contains(&self, seq: SequenceNumber) -> bool {
        self.min <= seq && seq <= self.max
    }

    /// Iterate every position in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = SequenceNumber> {
        (self.min.0..=self.max.0).map(SequenceNumber)
    }
}

impl fmt::Display for RecordRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}]", self.min, self.max)
    }
}
