//! Agent profile directory.
//!
//! The world state only needs identity and liveness bookkeeping from the
//! directory; [`ProfileDirectory`] is that seam. [`AgentRegistry`] is the
//! in-memory implementation used by the server.

use parking_lot::RwLock;
use protocol::{AgentProfile, AgentSkill};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

/// Maximum stored bio length, in characters.
pub const MAX_BIO_LEN: usize = 500;

const PALETTE: [&str; 8] = [
    "#e74c3c", "#e67e22", "#f39c12", "#2ecc71", "#1abc9c", "#3498db", "#9b59b6", "#e91e63",
];

/// Fields to merge into a profile. `None` keeps the existing value.
#[derive(Debug, Clone, Default)]
pub struct ProfileUpdate {
    pub agent_id: String,
    pub name: Option<String>,
    pub pubkey: Option<String>,
    pub bio: Option<String>,
    pub capabilities: Option<Vec<String>>,
    pub skills: Option<Vec<AgentSkill>>,
    pub color: Option<String>,
    pub avatar: Option<String>,
}

impl ProfileUpdate {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Default::default()
        }
    }
}

/// Identity and liveness store consumed by the world state.
pub trait ProfileDirectory: Send + Sync {
    /// Create or merge a profile and mark it as seen.
    fn register(&self, update: ProfileUpdate) -> AgentProfile;

    /// Refresh `last_seen`. Unknown agents are ignored.
    fn touch(&self, agent_id: &str);

    fn get(&self, agent_id: &str) -> Option<AgentProfile>;

    fn get_all(&self) -> Vec<AgentProfile>;

    /// Profiles seen within `within` of now.
    fn get_online(&self, within: Duration) -> Vec<AgentProfile>;
}

/// In-memory profile directory.
#[derive(Debug, Default)]
pub struct AgentRegistry {
    profiles: RwLock<HashMap<String, AgentProfile>>,
}

impl AgentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_at(&self, update: ProfileUpdate, now: u64) -> AgentProfile {
        let mut profiles = self.profiles.write();
        let existing = profiles.get(&update.agent_id);

        let merged = AgentProfile {
            name: update
                .name
                .or_else(|| existing.map(|p| p.name.clone()))
                .unwrap_or_else(|| update.agent_id.clone()),
            pubkey: update
                .pubkey
                .or_else(|| existing.map(|p| p.pubkey.clone()))
                .unwrap_or_default(),
            bio: update
                .bio
                .map(|bio| bio.chars().take(MAX_BIO_LEN).collect())
                .or_else(|| existing.map(|p| p.bio.clone()))
                .unwrap_or_default(),
            capabilities: update
                .capabilities
                .or_else(|| existing.map(|p| p.capabilities.clone()))
                .unwrap_or_default(),
            skills: update.skills.or_else(|| existing.and_then(|p| p.skills.clone())),
            color: update
                .color
                .or_else(|| existing.map(|p| p.color.clone()))
                .unwrap_or_else(random_color),
            avatar: update.avatar.or_else(|| existing.and_then(|p| p.avatar.clone())),
            joined_at: existing.map_or(now, |p| p.joined_at),
            last_seen: now,
            agent_id: update.agent_id,
        };

        profiles.insert(merged.agent_id.clone(), merged.clone());
        merged
    }

    pub fn touch_at(&self, agent_id: &str, now: u64) {
        if let Some(profile) = self.profiles.write().get_mut(agent_id) {
            profile.last_seen = now;
        }
    }

    pub fn get_online_at(&self, now: u64, within: Duration) -> Vec<AgentProfile> {
        let cutoff = now.saturating_sub(within.as_millis() as u64);
        self.profiles
            .read()
            .values()
            .filter(|p| p.last_seen >= cutoff)
            .cloned()
            .collect()
    }

    pub fn remove(&self, agent_id: &str) -> Option<AgentProfile> {
        self.profiles.write().remove(agent_id)
    }

    pub fn len(&self) -> usize {
        self.profiles.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.read().is_empty()
    }
}

impl ProfileDirectory for AgentRegistry {
    fn register(&self, update: ProfileUpdate) -> AgentProfile {
        self.register_at(update, protocol::now_millis())
    }

    fn touch(&self, agent_id: &str) {
        self.touch_at(agent_id, protocol::now_millis());
    }

    fn get(&self, agent_id: &str) -> Option<AgentProfile> {
        self.profiles.read().get(agent_id).cloned()
    }

    fn get_all(&self) -> Vec<AgentProfile> {
        self.profiles.read().values().cloned().collect()
    }

    fn get_online(&self, within: Duration) -> Vec<AgentProfile> {
        self.get_online_at(protocol::now_millis(), within)
    }
}

fn random_color() -> String {
    PALETTE[rand::rng().random_range(0..PALETTE.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_defaults() {
        let registry = AgentRegistry::new();
        let profile = registry.register_at(ProfileUpdate::new("a1"), 1_000);

        assert_eq!(profile.name, "a1");
        assert!(PALETTE.contains(&profile.color.as_str()));
        assert_eq!(profile.joined_at, 1_000);
        assert_eq!(profile.last_seen, 1_000);
        assert!(profile.capabilities.is_empty());
    }

    #[test]
    fn test_register_merges_existing() {
        let registry = AgentRegistry::new();
        registry.register_at(
            ProfileUpdate {
                name: Some("Crab".into()),
                color: Some("#3498db".into()),
                capabilities: Some(vec!["code-review".into()]),
                ..ProfileUpdate::new("a1")
            },
            1_000,
        );
        let merged = registry.register_at(
            ProfileUpdate {
                bio: Some("x".repeat(600)),
                ..ProfileUpdate::new("a1")
            },
            5_000,
        );

        assert_eq!(merged.name, "Crab");
        assert_eq!(merged.color, "#3498db");
        assert_eq!(merged.capabilities, vec!["code-review".to_string()]);
        assert_eq!(merged.bio.chars().count(), MAX_BIO_LEN);
        assert_eq!(merged.joined_at, 1_000);
        assert_eq!(merged.last_seen, 5_000);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_touch_unknown_is_ignored() {
        let registry = AgentRegistry::new();
        registry.touch_at("ghost", 10);
        assert!(registry.is_empty());
        assert!(registry.get("ghost").is_none());
    }

    #[test]
    fn test_online_window() {
        let registry = AgentRegistry::new();
        registry.register_at(ProfileUpdate::new("fresh"), 100_000);
        registry.register_at(ProfileUpdate::new("stale"), 1_000);

        let online = registry.get_online_at(100_500, Duration::from_secs(60));
        assert_eq!(online.len(), 1);
        assert_eq!(online[0].agent_id, "fresh");

        registry.touch_at("stale", 100_400);
        assert_eq!(registry.get_online_at(100_500, Duration::from_secs(60)).len(), 2);
    }

    #[test]
    fn test_remove() {
        let registry = AgentRegistry::new();
        registry.register(ProfileUpdate::new("a1"));
        assert!(registry.remove("a1").is_some());
        assert!(registry.get_all().is_empty());
    }
}
