//! World message definitions and shared agent records.

use serde::{Deserialize, Serialize};

/// Animation an agent can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Walk,
    #[default]
    Idle,
    Wave,
    Pinch,
    Talk,
    Dance,
    Backflip,
    Spin,
}

/// Short-lived expression shown above an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emote {
    Happy,
    Thinking,
    Surprised,
    Laugh,
}

/// A skill an agent declares when joining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSkill {
    pub skill_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// A message that changes or describes the shared world.
///
/// Serialized as a JSON object tagged by `kind`, with camelCase fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum WorldMessage {
    Position {
        agent_id: String,
        x: f64,
        y: f64,
        z: f64,
        rotation: f64,
        timestamp: u64,
    },
    Action {
        agent_id: String,
        action: Action,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_agent_id: Option<String>,
        timestamp: u64,
    },
    Emote {
        agent_id: String,
        emote: Emote,
        timestamp: u64,
    },
    Chat {
        agent_id: String,
        text: String,
        timestamp: u64,
    },
    Whisper {
        agent_id: String,
        target_id: String,
        text: String,
        timestamp: u64,
    },
    Join {
        agent_id: String,
        name: String,
        color: String,
        bio: String,
        #[serde(default)]
        capabilities: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        skills: Option<Vec<AgentSkill>>,
        timestamp: u64,
    },
    Leave {
        agent_id: String,
        timestamp: u64,
    },
    Profile {
        agent_id: String,
        name: String,
        bio: String,
        #[serde(default)]
        capabilities: Vec<String>,
        color: String,
        timestamp: u64,
    },
}

/// Payload-free discriminant of a [`WorldMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Position,
    Action,
    Emote,
    Chat,
    Whisper,
    Join,
    Leave,
    Profile,
}

impl MessageKind {
    /// Global kinds reach every viewer regardless of distance.
    pub fn is_global(self) -> bool {
        match self {
            MessageKind::Join
            | MessageKind::Leave
            | MessageKind::Profile
            | MessageKind::Chat
            | MessageKind::Emote => true,
            MessageKind::Position | MessageKind::Action | MessageKind::Whisper => false,
        }
    }

    /// Position and action updates are too frequent to keep in event history.
    pub fn is_recorded(self) -> bool {
        match self {
            MessageKind::Position | MessageKind::Action => false,
            MessageKind::Emote
            | MessageKind::Chat
            | MessageKind::Whisper
            | MessageKind::Join
            | MessageKind::Leave
            | MessageKind::Profile => true,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Position => "position",
            MessageKind::Action => "action",
            MessageKind::Emote => "emote",
            MessageKind::Chat => "chat",
            MessageKind::Whisper => "whisper",
            MessageKind::Join => "join",
            MessageKind::Leave => "leave",
            MessageKind::Profile => "profile",
        }
    }
}

impl WorldMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            WorldMessage::Position { .. } => MessageKind::Position,
            WorldMessage::Action { .. } => MessageKind::Action,
            WorldMessage::Emote { .. } => MessageKind::Emote,
            WorldMessage::Chat { .. } => MessageKind::Chat,
            WorldMessage::Whisper { .. } => MessageKind::Whisper,
            WorldMessage::Join { .. } => MessageKind::Join,
            WorldMessage::Leave { .. } => MessageKind::Leave,
            WorldMessage::Profile { .. } => MessageKind::Profile,
        }
    }

    /// Id of the agent that originated the message.
    pub fn agent_id(&self) -> &str {
        match self {
            WorldMessage::Position { agent_id, .. }
            | WorldMessage::Action { agent_id, .. }
            | WorldMessage::Emote { agent_id, .. }
            | WorldMessage::Chat { agent_id, .. }
            | WorldMessage::Whisper { agent_id, .. }
            | WorldMessage::Join { agent_id, .. }
            | WorldMessage::Leave { agent_id, .. }
            | WorldMessage::Profile { agent_id, .. } => agent_id,
        }
    }

    pub fn timestamp(&self) -> u64 {
        match self {
            WorldMessage::Position { timestamp, .. }
            | WorldMessage::Action { timestamp, .. }
            | WorldMessage::Emote { timestamp, .. }
            | WorldMessage::Chat { timestamp, .. }
            | WorldMessage::Whisper { timestamp, .. }
            | WorldMessage::Join { timestamp, .. }
            | WorldMessage::Leave { timestamp, .. }
            | WorldMessage::Profile { timestamp, .. } => *timestamp,
        }
    }
}

/// Last known placement of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentPosition {
    pub agent_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rotation: f64,
    pub timestamp: u64,
}

/// Identity record kept by the profile directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub agent_id: String,
    pub name: String,
    #[serde(default)]
    pub pubkey: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skills: Option<Vec<AgentSkill>>,
    pub color: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar: Option<String>,
    pub joined_at: u64,
    pub last_seen: u64,
}

/// Combined per-agent record sent in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentState {
    pub profile: AgentProfile,
    pub position: AgentPosition,
    pub action: Action,
}

/// Public description of the room served by this process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomInfo {
    pub room_id: String,
    pub name: String,
    pub description: String,
    /// Agents currently placed in the world.
    pub agents: usize,
    pub max_agents: usize,
    pub channel_id: Option<String>,
}
