//! Proptest generators for property-based testing.

use std::time::Duration;

use proptest::prelude::*;

use probelog_core::{DeviceId, SequenceNumber, SessionId, SessionInfo};

/// Every position in `0..len`, in a random arrival order.
pub fn arrival_order(len: u32) -> impl Strategy<Value = Vec<SequenceNumber>> {
    Just((0..len).map(SequenceNumber).collect::<Vec<_>>()).prop_shuffle()
}

/// Every position in `0..len` at least once, some repeated, in random order.
pub fn arrival_order_with_duplicates(len: u32) -> impl Strategy<Value = Vec<SequenceNumber>> {
    let max_dupes = len as usize;
    (
        arrival_order(len),
        prop::collection::vec(0..len.max(1), 0..=max_dupes),
    )
        .prop_flat_map(|(order, dupes)| {
            let mut all = order;
            all.extend(dupes.into_iter().map(SequenceNumber));
            Just(all).prop_shuffle()
        })
}

/// A random session identity.
pub fn session_info() -> impl Strategy<Value = SessionInfo> {
    (any::<u32>(), 1u64..=60_000).prop_map(|(id, period_ms)| {
        SessionInfo::new(SessionId(id), Duration::from_millis(period_ms))
    })
}

/// A random device serial number.
pub fn device_id() -> impl Strategy<Value = DeviceId> {
    any::<u32>().prop_map(DeviceId)
}

/// Increasing cursor positions with random holes between them.
#[derive(Debug, Clone)]
pub struct CursorStream {
    pub start: u32,
    /// Distance from each broadcast to the next; 1 means no record was lost.
    pub steps: Vec<u32>,
}

impl CursorStream {
    /// The broadcast positions in arrival order.
    pub fn sequences(&self) -> Vec<SequenceNumber> {
        let mut current = self.start;
        let mut out = vec![SequenceNumber(current)];
        for step in &self.steps {
            current += step;
            out.push(SequenceNumber(current));
        }
        out
    }

    /// Positions skipped between the first and last broadcast.
    pub fn dropped(&self) -> Vec<SequenceNumber> {
        let seen = self.sequences();
        let mut dropped = Vec::new();
        for pair in seen.windows(2) {
            dropped.extend((pair[0].0 + 1..pair[1].0).map(SequenceNumber));
        }
        dropped
    }
}

/// A cursor stream of up to `len` broadcasts.
pub fn cursor_stream(len: usize) -> impl Strategy<Value = CursorStream> {
    (
        0u32..1000,
        prop::collection::vec(prop_oneof![4 => Just(1u32), 1 => 2u32..6], 0..len),
    )
        .prop_map(|(start, steps)| CursorStream { start, steps })
}
