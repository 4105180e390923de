//! Strong type definitions for probelog.
//!
//! Identifiers and positions are newtypes so a session id can never be passed
//! where a sequence number is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::error::CoreError;

/// Position of one record in a device's session-scoped record stream.
///
/// `u32::MAX` is reserved by devices to mean "unset" and is never a valid
/// record position. Host-side code models "unset" as `Option::None` instead,
/// and arithmetic saturates at [`SequenceNumber::MAX`]. Deserializing the
/// sentinel fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32")]
pub struct SequenceNumber(pub u32);

impl SequenceNumber {
    /// The first record of every session.
    pub const ZERO: Self = Self(0);

    /// The highest valid position. One below the device's unset sentinel.
    pub const MAX: Self = Self(u32::MAX - 1);

    /// Create a sequence number, mapping the unset sentinel to `None`.
    pub const fn new(value: u32) -> Option<Self> {
        if value == u32::MAX {
            None
        } else {
            Some(Self(value))
        }
    }

    /// Raw value.
    pub const fn get(self) -> u32 {
        self.0
    }

    /// False for the device's unset sentinel.
    pub const fn is_valid(self) -> bool {
        self.0 != u32::MAX
    }

    /// The following position, saturating at [`SequenceNumber::MAX`].
    pub fn next(self) -> Self {
        Self(self.0.saturating_add(1).min(Self::MAX.0))
    }

    /// The preceding position, saturating at zero.
    pub fn prev(self) -> Self {
        Self(self.0.saturating_sub(1))
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<u32> for SequenceNumber {
    type Error = CoreError;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        Self::new(value).ok_or(CoreError::UnsetSequence)
    }
}

/// Opaque identifier for one continuous device-session.
///
/// Devices report a fresh id after every power cycle or reset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub u32);

impl SessionId {
    /// Synthesize an id from a creation timestamp, for devices that do not
    /// report one.
    ///
    /// Timestamps before the epoch map to 0 and those past 2106 to
    /// `u32::MAX`.
    pub fn from_timestamp(unix_millis: i64) -> Self {
        let secs = unix_millis.div_euclid(1000);
        Self(u32::try_from(secs.max(0)).unwrap_or(u32::MAX))
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0.to_be_bytes())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        parse_u32_hex(s).map(Self)
    }
}

impl fmt::Debug for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SessionId({})", self.to_hex())
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

/// Serial number of a remote device.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DeviceId(pub u32);

impl DeviceId {
    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0.to_be_bytes())
    }

    /// Parse from hex string.
    pub fn from_hex(s: &str) -> Result<Self, CoreError> {
        parse_u32_hex(s).map(Self)
    }
}

impl fmt::Debug for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DeviceId({})", self.to_hex())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

fn parse_u32_hex(s: &str) -> Result<u32, CoreError> {
    let bytes = hex::decode(s).map_err(|e| CoreError::InvalidId(e.to_string()))?;
    let arr: [u8; 4] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| CoreError::InvalidId(format!("expected 4 bytes, got {}", bytes.len())))?;
    Ok(u32::from_be_bytes(arr))
}

/// Session identity carried alongside every cursor broadcast.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionInfo {
    /// Device-reported session id.
    pub id: SessionId,
    /// Interval between consecutive records.
    pub sample_period: Duration,
}

impl SessionInfo {
    pub fn new(id: SessionId, sample_period: Duration) -> Self {
        Self { id, sample_period }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequence_number_sentinel() {
        assert_eq!(SequenceNumber::new(u32::MAX), None);
        assert_eq!(SequenceNumber::new(7), Some(SequenceNumber(7)));
        assert!(SequenceNumber::try_from(u32::MAX).is_err());
        assert!(!SequenceNumber(u32::MAX).is_valid());
        assert!(SequenceNumber::MAX.is_valid());
    }

    #[test]
    fn test_sentinel_rejected_on_deserialize() {
        let parsed: SequenceNumber = serde_json::from_str("41").unwrap();
        assert_eq!(parsed, SequenceNumber(41));
        assert!(serde_json::from_str::<SequenceNumber>("4294967295").is_err());
    }

    #[test]
    fn test_sequence_number_saturates() {
        assert_eq!(SequenceNumber::MAX.next(), SequenceNumber::MAX);
        assert_eq!(SequenceNumber::ZERO.prev(), SequenceNumber::ZERO);
        assert_eq!(SequenceNumber(41).next(), SequenceNumber(42));
    }

    #[test]
    fn test_session_id_hex_roundtrip() {
        let id = SessionId(0xdead_beef);
        assert_eq!(id.to_hex(), "deadbeef");
        assert_eq!(SessionId::from_hex("deadbeef").unwrap(), id);
        assert!(SessionId::from_hex("beef").is_err());
    }

    #[test]
    fn test_session_id_from_timestamp() {
        let id = SessionId::from_timestamp(1_736_870_400_123);
        assert_eq!(id, SessionId(1_736_870_400));

        assert_eq!(SessionId::from_timestamp(-5_000), SessionId(0));
        assert_eq!(SessionId::from_timestamp(i64::MAX), SessionId(u32::MAX));
    }

    #[test]
    fn test_device_id_display() {
        let id = DeviceId(0x1000_2A3B);
        assert_eq!(format!("{}", id), "10002A3B");
        assert_eq!(format!("{:?}", id), "DeviceId(10002A3B)");
    }
}
