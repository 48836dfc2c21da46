//! Outbound best-effort relay for applied world messages.
//!
//! The game loop hands every applied command to a [`Relay`] from a detached
//! task. Nothing waits on the result and nothing depends on delivery.

use async_trait::async_trait;
use protocol::WorldMessage;
use thiserror::Error;
use tokio::sync::broadcast;

/// Errors a relay can report. They are logged and dropped by the caller.
#[derive(Debug, Error)]
pub enum RelayError {
    #[error("relay is not connected")]
    NotConnected,

    #[error("relay publish failed: {0}")]
    Publish(String),
}

/// Destination for applied world messages outside this process.
#[async_trait]
pub trait Relay: Send + Sync + 'static {
    /// Publish a message. Best effort; no ordering guarantee across calls.
    async fn publish(&self, msg: WorldMessage) -> Result<(), RelayError>;

    /// Channel id advertised in room info, if the relay has one.
    fn channel_id(&self) -> Option<String> {
        None
    }
}

/// Relay used in local-only mode: accepts and discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRelay;

#[async_trait]
impl Relay for NullRelay {
    async fn publish(&self, _msg: WorldMessage) -> Result<(), RelayError> {
        Ok(())
    }
}

/// Relay that fans messages out to in-process subscribers.
#[derive(Debug, Clone)]
pub struct BroadcastRelay {
    channel_id: Option<String>,
    tx: broadcast::Sender<WorldMessage>,
}

impl BroadcastRelay {
    pub fn new(capacity: usize, channel_id: Option<String>) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { channel_id, tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WorldMessage> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Relay for BroadcastRelay {
    async fn publish(&self, msg: WorldMessage) -> Result<(), RelayError> {
        self.tx
            .send(msg)
            .map(|_| ())
            .map_err(|_| RelayError::NotConnected)
    }

    fn channel_id(&self) -> Option<String> {
        self.channel_id.clone()
    }
}
