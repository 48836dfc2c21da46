//! World state management.
//!
//! Authoritative agent positions and actions, plus a bounded history of
//! non-positional events.

use crate::config::Config;
use crate::directory::{ProfileDirectory, ProfileUpdate};
use crate::history::EventHistory;
use protocol::{Action, AgentPosition, AgentState, WorldMessage};
use rand::Rng;
use std::collections::{HashMap, HashSet};
use std::f64::consts::TAU;
use std::sync::Arc;
use std::time::Duration;

/// Square world bounds centered on the origin.
#[derive(Debug, Clone, Copy)]
pub struct WorldBorder {
    pub half_size: f64,
    /// Fraction of `half_size` used for spawn placement.
    pub spawn_fraction: f64,
}

impl WorldBorder {
    pub fn new(half_size: f64, spawn_fraction: f64) -> Self {
        Self {
            half_size,
            spawn_fraction,
        }
    }

    #[inline]
    pub fn contains(&self, x: f64, z: f64) -> bool {
        x.abs() <= self.half_size && z.abs() <= self.half_size
    }

    /// Uniform random `(x, z, rotation)` inside the spawn area.
    pub fn random_spawn(&self) -> (f64, f64, f64) {
        let spread = self.half_size * self.spawn_fraction;
        let mut rng = rand::rng();
        if spread <= 0.0 {
            return (0.0, 0.0, rng.random_range(0.0..TAU));
        }
        (
            rng.random_range(-spread..spread),
            rng.random_range(-spread..spread),
            rng.random_range(0.0..TAU),
        )
    }
}

/// Authoritative world state. Mutated only by the game loop.
pub struct WorldState {
    positions: HashMap<String, AgentPosition>,
    actions: HashMap<String, Action>,
    directory: Arc<dyn ProfileDirectory>,
    history: EventHistory,
    border: WorldBorder,
    online_window: Duration,
}

impl WorldState {
    pub fn new(
        directory: Arc<dyn ProfileDirectory>,
        border: WorldBorder,
        history_capacity: usize,
        online_window: Duration,
    ) -> Self {
        Self {
            positions: HashMap::with_capacity(64),
            actions: HashMap::with_capacity(64),
            directory,
            history: EventHistory::new(history_capacity),
            border,
            online_window,
        }
    }

    pub fn from_config(config: &Config, directory: Arc<dyn ProfileDirectory>) -> Self {
        Self::new(
            directory,
            WorldBorder::new(config.world.half_size, config.world.spawn_fraction),
            config.world.event_history,
            Duration::from_secs(config.presence.online_window_secs),
        )
    }

    /// Apply an admitted command.
    pub fn apply(&mut self, msg: &WorldMessage) {
        if msg.kind().is_recorded() {
            self.history.push(msg.clone());
        }

        match msg {
            WorldMessage::Position {
                agent_id,
                x,
                y,
                z,
                rotation,
                timestamp,
            } => {
                self.positions.insert(
                    agent_id.clone(),
                    AgentPosition {
                        agent_id: agent_id.clone(),
                        x: *x,
                        y: *y,
                        z: *z,
                        rotation: *rotation,
                        timestamp: *timestamp,
                    },
                );
                self.directory.touch(agent_id);
            }
            WorldMessage::Action {
                agent_id, action, ..
            } => {
                self.actions.insert(agent_id.clone(), *action);
                self.directory.touch(agent_id);
            }
            WorldMessage::Join {
                agent_id,
                name,
                color,
                bio,
                capabilities,
                skills,
                timestamp,
            } => {
                self.directory.register(ProfileUpdate {
                    name: Some(name.clone()),
                    color: Some(color.clone()),
                    bio: Some(bio.clone()),
                    capabilities: Some(capabilities.clone()),
                    skills: skills.clone(),
                    ..ProfileUpdate::new(agent_id.clone())
                });
                if !self.positions.contains_key(agent_id) {
                    let (x, z, rotation) = self.border.random_spawn();
                    self.positions.insert(
                        agent_id.clone(),
                        AgentPosition {
                            agent_id: agent_id.clone(),
                            x,
                            y: 0.0,
                            z,
                            rotation,
                            timestamp: *timestamp,
                        },
                    );
                }
                self.actions.insert(agent_id.clone(), Action::Idle);
            }
            WorldMessage::Leave { agent_id, .. } => {
                self.positions.remove(agent_id);
                self.actions.remove(agent_id);
            }
            WorldMessage::Profile {
                agent_id,
                name,
                bio,
                capabilities,
                color,
                ..
            } => {
                self.directory.register(ProfileUpdate {
                    name: Some(name.clone()),
                    bio: Some(bio.clone()),
                    capabilities: Some(capabilities.clone()),
                    color: Some(color.clone()),
                    ..ProfileUpdate::new(agent_id.clone())
                });
            }
            WorldMessage::Chat { agent_id, .. } | WorldMessage::Emote { agent_id, .. } => {
                self.directory.touch(agent_id);
            }
            WorldMessage::Whisper { .. } => {}
        }
    }

    /// Every current position, keyed by agent id.
    pub fn all_positions(&self) -> &HashMap<String, AgentPosition> {
        &self.positions
    }

    pub fn get_position(&self, agent_id: &str) -> Option<&AgentPosition> {
        self.positions.get(agent_id)
    }

    /// Current animation; `None` once the agent has left.
    pub fn get_action(&self, agent_id: &str) -> Option<Action> {
        self.actions.get(agent_id).copied()
    }

    /// Whether the agent is placed in the world.
    pub fn has_agent(&self, agent_id: &str) -> bool {
        self.positions.contains_key(agent_id)
    }

    pub fn active_agent_ids(&self) -> HashSet<&str> {
        self.positions.keys().map(String::as_str).collect()
    }

    pub fn agent_count(&self) -> usize {
        self.positions.len()
    }

    /// Online agents that have a position, with profile and action.
    pub fn snapshot(&self) -> Vec<AgentState> {
        self.directory
            .get_online(self.online_window)
            .into_iter()
            .filter_map(|profile| {
                let position = self.positions.get(&profile.agent_id)?.clone();
                let action = self
                    .actions
                    .get(&profile.agent_id)
                    .copied()
                    .unwrap_or_default();
                Some(AgentState {
                    profile,
                    position,
                    action,
                })
            })
            .collect()
    }

    /// Up to `limit` buffered events newer than `since_ts`, oldest first.
    pub fn get_events(&self, since_ts: u64, limit: usize) -> Vec<WorldMessage> {
        self.history.since(since_ts, limit)
    }

    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    pub fn directory(&self) -> &Arc<dyn ProfileDirectory> {
        &self.directory
    }

    pub fn border(&self) -> WorldBorder {
        self.border
    }
}

impl std::fmt::Debug for WorldState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldState")
            .field("agents", &self.positions.len())
            .field("events", &self.history.len())
            .field("border", &self.border)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::AgentRegistry;

    fn make_world() -> (WorldState, Arc<AgentRegistry>) {
        let registry = Arc::new(AgentRegistry::new());
        let world = WorldState::from_config(&Config::default(), registry.clone());
        (world, registry)
    }

    fn join(agent_id: &str, timestamp: u64) -> WorldMessage {
        WorldMessage::Join {
            agent_id: agent_id.into(),
            name: format!("{agent_id}-name"),
            color: "#2ecc71".into(),
            bio: "hello".into(),
            capabilities: vec!["web-research".into()],
            skills: None,
            timestamp,
        }
    }

    fn leave(agent_id: &str, timestamp: u64) -> WorldMessage {
        WorldMessage::Leave {
            agent_id: agent_id.into(),
            timestamp,
        }
    }

    fn position(agent_id: &str, x: f64, z: f64) -> WorldMessage {
        WorldMessage::Position {
            agent_id: agent_id.into(),
            x,
            y: 0.0,
            z,
            rotation: 1.0,
            timestamp: 7,
        }
    }

    #[test]
    fn test_join_spawns_inside_bounds() {
        let (mut world, registry) = make_world();
        world.apply(&join("a1", 1));

        let pos = world.get_position("a1").unwrap();
        assert!(world.border().contains(pos.x, pos.z));
        assert!(pos.x.abs() <= 30.0 && pos.z.abs() <= 30.0);
        assert!((0.0..TAU).contains(&pos.rotation));
        assert_eq!(world.get_action("a1"), Some(Action::Idle));

        let profile = registry.get("a1").unwrap();
        assert_eq!(profile.name, "a1-name");
        assert_eq!(profile.capabilities, vec!["web-research".to_string()]);
    }

    #[test]
    fn test_join_keeps_existing_position() {
        let (mut world, _) = make_world();
        world.apply(&position("a1", 12.0, -4.0));
        world.apply(&join("a1", 2));

        let pos = world.get_position("a1").unwrap();
        assert_eq!((pos.x, pos.z), (12.0, -4.0));
    }

    #[test]
    fn test_leave_removes_agent() {
        let (mut world, _) = make_world();
        world.apply(&join("a1", 1));
        assert!(world.has_agent("a1"));

        world.apply(&leave("a1", 2));
        assert!(!world.has_agent("a1"));
        assert!(world.get_action("a1").is_none());
        assert!(world.snapshot().is_empty());
    }

    #[test]
    fn test_position_and_action_upsert() {
        let (mut world, _) = make_world();
        world.apply(&position("a1", 1.0, 2.0));
        world.apply(&position("a1", 3.0, 4.0));
        world.apply(&WorldMessage::Action {
            agent_id: "a1".into(),
            action: Action::Dance,
            target_agent_id: None,
            timestamp: 8,
        });

        assert_eq!(world.agent_count(), 1);
        let pos = world.get_position("a1").unwrap();
        assert_eq!((pos.x, pos.z, pos.timestamp), (3.0, 4.0, 7));
        assert_eq!(world.get_action("a1"), Some(Action::Dance));
        // neither kind is recorded
        assert!(world.get_events(0, 50).is_empty());
    }

    #[test]
    fn test_profile_does_not_move_agent() {
        let (mut world, registry) = make_world();
        world.apply(&WorldMessage::Profile {
            agent_id: "a1".into(),
            name: "Renamed".into(),
            bio: String::new(),
            capabilities: Vec::new(),
            color: "#000000".into(),
            timestamp: 3,
        });
        assert!(!world.has_agent("a1"));
        assert_eq!(registry.get("a1").unwrap().name, "Renamed");
    }

    #[test]
    fn test_snapshot_requires_position_and_liveness() {
        let (mut world, registry) = make_world();
        world.apply(&join("a1", 1));
        world.apply(&join("a2", 1));
        world.apply(&join("a3", 1));
        world.apply(&leave("a2", 2));
        // a3 was last seen long ago
        registry.touch_at("a3", 0);

        let snapshot = world.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].profile.agent_id, "a1");
        assert_eq!(snapshot[0].action, Action::Idle);
    }

    #[test]
    fn test_event_history_retention() {
        let (mut world, _) = make_world();
        for n in 1..=250u64 {
            world.apply(&WorldMessage::Chat {
                agent_id: "a1".into(),
                text: format!("{n}"),
                timestamp: n,
            });
            world.apply(&position("a1", 0.0, 0.0));
        }

        assert_eq!(world.history().len(), 200);

        // overwritten events are gone; the oldest survivors come first
        let events = world.get_events(0, 50);
        assert_eq!(events.len(), 50);
        assert_eq!(events.first().map(WorldMessage::timestamp), Some(51));
        assert_eq!(events.last().map(WorldMessage::timestamp), Some(100));

        let all = world.get_events(0, 1000);
        assert_eq!(all.len(), 200);
        assert_eq!(all.last().map(WorldMessage::timestamp), Some(250));

        let recent = world.get_events(240, 50);
        assert_eq!(recent.len(), 10);
    }

    #[test]
    fn test_get_events_pages_from_timestamp() {
        let (mut world, _) = make_world();
        for n in 1..=150u64 {
            world.apply(&WorldMessage::Chat {
                agent_id: "a1".into(),
                text: format!("{n}"),
                timestamp: n,
            });
        }

        let first: Vec<u64> = world.get_events(0, 50).iter().map(WorldMessage::timestamp).collect();
        assert_eq!(first, (1..=50).collect::<Vec<u64>>());

        let page: Vec<u64> = world.get_events(10, 5).iter().map(WorldMessage::timestamp).collect();
        assert_eq!(page, vec![11, 12, 13, 14, 15]);
    }
}
