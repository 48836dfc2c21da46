//! Server -> Client message building.

use crate::{AgentProfile, AgentState, ProtocolError, RoomInfo, WorldMessage};
use serde::{Deserialize, Serialize};

/// Message pushed to a viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerMessage {
    /// Full dump of (possibly AOI-filtered) agent state.
    Snapshot { agents: Vec<AgentState> },
    /// A single world event from the current tick.
    World { message: WorldMessage },
    Profiles { profiles: Vec<AgentProfile> },
    Profile { profile: AgentProfile },
    RoomInfo { info: RoomInfo },
}

impl ServerMessage {
    /// Encode as a JSON text frame.
    pub fn encode(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
