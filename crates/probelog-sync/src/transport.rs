//! Outbound delivery for coordinator events.
//!
//! The transport layer owns the radio link; this crate only hands it
//! [`Outbound`] events. Implementations may forward them to a BLE stack, a
//! UI, or a test harness.

use async_trait::async_trait;

use crate::error::SyncError;
use crate::messages::Outbound;

/// Result type for sink operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Receiver of everything a coordinator produces.
///
/// Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event.
    async fn emit(&self, event: Outbound) -> Result<()>;

    /// Deliver events in order, stopping at the first failure.
    async fn emit_all(&self, events: Vec<Outbound>) -> Result<()> {
        for event in events {
            self.emit(event).await?;
        }
        Ok(())
    }
}

/// Channel-backed sink for hosts and tests.
pub mod memory {
    use super::*;
    use tokio::sync::mpsc;

    /// Sink that forwards every event into a bounded tokio channel.
    #[derive(Debug, Clone)]
    pub struct ChannelSink {
        sender: mpsc::Sender<Outbound>,
    }

    impl ChannelSink {
        /// Create a sink and the receiver that drains it.
        ///
        /// # Panics
        ///
        /// Panics if `capacity` is zero.
        pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Outbound>) {
            let (sender, receiver) = mpsc::channel(capacity);
            (Self { sender }, receiver)
        }

        /// Wrap an existing sender.
        pub fn from_sender(sender: mpsc::Sender<Outbound>) -> Self {
            Self { sender }
        }
    }

    #[async_trait]
    impl EventSink for ChannelSink {
        async fn emit(&self, event: Outbound) -> Result<()> {
            self.sender
                .send(event)
                .await
                .map_err(|_| SyncError::SinkClosed("receiver dropped".into()))
        }
    }
}
