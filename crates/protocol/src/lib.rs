//! Shared protocol crate for the agent world server.
//!
//! This crate contains:
//! - World message definitions (the tagged `WorldMessage` union)
//! - Client/server envelope definitions and their JSON codec
//! - Shared records (profiles, positions, room info)

mod error;
pub mod packets;
mod world;

pub use error::ProtocolError;
pub use packets::{ClientMessage, ServerMessage};
pub use world::{
    Action, AgentPosition, AgentProfile, AgentSkill, AgentState, Emote, MessageKind, RoomInfo,
    WorldMessage,
};

/// Upper bound on an inbound frame, in bytes.
pub const MAX_FRAME_BYTES: usize = 64 * 1024;

/// Milliseconds since the Unix epoch, the timestamp unit used on the wire.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
