//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while decoding or encoding protocol messages.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Frame too large: {len} bytes (max {max})")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Invalid JSON message: {0}")]
    Json(#[from] serde_json::Error),
}
