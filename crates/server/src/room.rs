//! Room facade.
//!
//! [`WorldHandle`] wires the queue, world, viewer registry and game loop
//! together and is what command routing and the connection layer talk to.

use crate::collision::Obstacle;
use crate::command_queue::{CommandQueue, QueueLimits, Rejection};
use crate::config::{Config, RoomConfig};
use crate::directory::ProfileDirectory;
use crate::relay::Relay;
use crate::server::client::ClientManager;
use crate::server::game::{GameLoop, LoopSettings};
use crate::world::WorldState;
use parking_lot::{Mutex, RwLock};
use protocol::{AgentPosition, RoomInfo, WorldMessage};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Why [`WorldHandle::submit`] refused a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("room is full ({max} max)")]
    RoomFull { max: usize },

    #[error(transparent)]
    Rejected(#[from] Rejection),
}

/// Shared handle to one room.
#[derive(Clone)]
pub struct WorldHandle {
    room: RoomConfig,
    queue: Arc<CommandQueue>,
    world: Arc<RwLock<WorldState>>,
    clients: Arc<Mutex<ClientManager>>,
    relay: Arc<dyn Relay>,
    game: Arc<GameLoop>,
}

impl WorldHandle {
    pub fn new(
        config: &Config,
        directory: Arc<dyn ProfileDirectory>,
        relay: Arc<dyn Relay>,
    ) -> Self {
        let queue = Arc::new(CommandQueue::new(QueueLimits::from_config(config)));
        queue.set_obstacles(config.world.obstacles.clone());

        let world = Arc::new(RwLock::new(WorldState::from_config(config, directory)));
        let clients = Arc::new(Mutex::new(ClientManager::new()));
        let game = Arc::new(GameLoop::new(
            LoopSettings::from_config(config),
            queue.clone(),
            world.clone(),
            clients.clone(),
            relay.clone(),
        ));

        Self {
            room: config.room.clone(),
            queue,
            world,
            clients,
            relay,
            game,
        }
    }

    pub fn start(&self) {
        info!(
            "Room {} ({}) open, max {} agents",
            self.room.name, self.room.id, self.room.max_agents
        );
        self.game.start();
    }

    pub fn stop(&self) {
        self.game.stop();
    }

    /// Admit a command for the next tick.
    ///
    /// A `join` from an agent not already placed is refused once the room
    /// holds `max_agents` agents.
    pub fn submit(&self, msg: WorldMessage) -> Result<(), SubmitError> {
        if let WorldMessage::Join { agent_id, .. } = &msg {
            let world = self.world.read();
            if !world.has_agent(agent_id) && world.agent_count() >= self.room.max_agents {
                return Err(SubmitError::RoomFull {
                    max: self.room.max_agents,
                });
            }
        }
        self.queue.enqueue(msg)?;
        Ok(())
    }

    pub fn set_obstacles(&self, obstacles: Vec<Obstacle>) {
        self.queue.set_obstacles(obstacles);
    }

    /// Up to `limit` non-positional events newer than `since_ts`, oldest first.
    pub fn get_events(&self, since_ts: u64, limit: usize) -> Vec<WorldMessage> {
        self.world.read().get_events(since_ts, limit)
    }

    pub fn all_positions(&self) -> Vec<AgentPosition> {
        self.world.read().all_positions().values().cloned().collect()
    }

    pub fn has_agent(&self, agent_id: &str) -> bool {
        self.world.read().has_agent(agent_id)
    }

    pub fn current_tick(&self) -> u64 {
        self.game.current_tick()
    }

    pub fn room_info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.room.id.clone(),
            name: self.room.name.clone(),
            description: self.room.description.clone(),
            agents: self.world.read().agent_count(),
            max_agents: self.room.max_agents,
            channel_id: self.relay.channel_id(),
        }
    }

    pub fn queue(&self) -> &Arc<CommandQueue> {
        &self.queue
    }

    pub fn world(&self) -> &Arc<RwLock<WorldState>> {
        &self.world
    }

    pub fn clients(&self) -> &Arc<Mutex<ClientManager>> {
        &self.clients
    }

    pub fn game(&self) -> &Arc<GameLoop> {
        &self.game
    }
}
