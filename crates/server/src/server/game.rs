//! Fixed-rate simulation loop.
//!
//! One tick: drain admitted commands, apply them to the world, rebuild the
//! spatial grid, move followed cameras, then push a snapshot or this tick's
//! AOI-filtered events to every viewer.

use crate::command_queue::CommandQueue;
use crate::config::Config;
use crate::relay::Relay;
use crate::spatial::SpatialGrid;
use crate::world::WorldState;
use parking_lot::{Mutex, RwLock};
use protocol::{AgentState, ServerMessage, WorldMessage};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, error, info, warn};

use super::client::{ClientConnection, ClientManager};

/// Loop timing and AOI settings.
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub tick_interval: Duration,
    pub aoi_radius: f64,
    /// Every this many ticks each viewer gets an AOI-filtered snapshot.
    pub full_snapshot_interval: u64,
    pub cell_size: f64,
}

impl LoopSettings {
    /// Shortest tick period the loop will schedule.
    pub const MIN_TICK_INTERVAL: Duration = Duration::from_millis(1);

    pub fn from_config(config: &Config) -> Self {
        Self {
            tick_interval: Duration::from_millis(config.tick.tick_interval_ms()),
            aoi_radius: config.tick.aoi_radius,
            full_snapshot_interval: config.tick.snapshot_interval(),
            cell_size: config.world.cell_size,
        }
        .sanitized()
    }

    /// Clamp values the loop cannot run with.
    pub fn sanitized(mut self) -> Self {
        if self.tick_interval < Self::MIN_TICK_INTERVAL {
            warn!(
                "Tick interval {:?} too short, using {:?}",
                self.tick_interval,
                Self::MIN_TICK_INTERVAL
            );
            self.tick_interval = Self::MIN_TICK_INTERVAL;
        }
        if self.full_snapshot_interval == 0 {
            warn!("Full snapshot interval of 0 ticks, using 1");
            self.full_snapshot_interval = 1;
        }
        if !(self.cell_size.is_finite() && self.cell_size > 0.0) {
            warn!("Invalid grid cell size {}, using 10", self.cell_size);
            self.cell_size = 10.0;
        }
        self
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// What a single tick did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub tick: u64,
    pub commands: usize,
    pub clients: usize,
    pub snapshots: usize,
    pub events_sent: usize,
}

/// Per-tick scratch state, owned by whoever is running the tick.
struct TickState {
    grid: SpatialGrid,
    events: Vec<WorldMessage>,
}

/// The simulation loop and its collaborators.
pub struct GameLoop {
    settings: LoopSettings,
    queue: Arc<CommandQueue>,
    world: Arc<RwLock<WorldState>>,
    clients: Arc<Mutex<ClientManager>>,
    relay: Arc<dyn Relay>,
    state: Mutex<TickState>,
    tick_count: AtomicU64,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl GameLoop {
    pub fn new(
        settings: LoopSettings,
        queue: Arc<CommandQueue>,
        world: Arc<RwLock<WorldState>>,
        clients: Arc<Mutex<ClientManager>>,
        relay: Arc<dyn Relay>,
    ) -> Self {
        let settings = settings.sanitized();
        let grid = SpatialGrid::new(settings.cell_size);
        Self {
            settings,
            queue,
            world,
            clients,
            relay,
            state: Mutex::new(TickState {
                grid,
                events: Vec::with_capacity(64),
            }),
            tick_count: AtomicU64::new(0),
            task: Mutex::new(None),
        }
    }

    /// Number of ticks started so far; 0 before the first tick.
    pub fn current_tick(&self) -> u64 {
        self.tick_count.load(Ordering::Acquire)
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn is_running(&self) -> bool {
        self.task.lock().is_some()
    }

    /// Schedule ticks on the current tokio runtime.
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.is_some() {
            warn!("Game loop already running");
            return;
        }
        info!(
            "Starting game loop at {:.0}Hz ({}ms/tick)",
            1000.0 / self.settings.tick_interval.as_millis().max(1) as f64,
            self.settings.tick_interval.as_millis()
        );
        let game = Arc::clone(self);
        *task = Some(tokio::spawn(game.run()));
    }

    /// Stop scheduling ticks. A tick that is already running completes.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            // `tick` never yields, so the abort lands between ticks.
            task.abort();
            info!("Game loop stopped at tick {}", self.current_tick());
        }
    }

    async fn run(self: Arc<Self>) {
        let period = self.settings.tick_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        // A slow tick pushes the next one back instead of bunching them up.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let tick_start = std::time::Instant::now();
            match std::panic::catch_unwind(AssertUnwindSafe(|| self.tick())) {
                Ok(report) => {
                    let tick_ms = tick_start.elapsed().as_secs_f64() * 1000.0;
                    let budget = period.as_secs_f64() * 1000.0 * 0.9;
                    if tick_ms > budget {
                        warn!(
                            "Slow tick #{}: {:.3}ms (budget: {:.1}ms) - {} commands, {} clients",
                            report.tick, tick_ms, budget, report.commands, report.clients
                        );
                    }
                }
                Err(_) => {
                    error!("Tick {} panicked; continuing", self.current_tick());
                }
            }
        }
    }

    /// Run one tick synchronously.
    pub fn tick(&self) -> TickReport {
        let tick = self.tick_count.fetch_add(1, Ordering::AcqRel) + 1;
        let mut state = self.state.lock();
        let TickState { grid, events } = &mut *state;
        events.clear();

        // Apply commands and rebuild the index under one write lock.
        let commands = self.queue.drain();
        let command_count = commands.len();
        {
            let mut world = self.world.write();
            for cmd in commands {
                world.apply(&cmd);
                if let WorldMessage::Leave { agent_id, .. } = &cmd {
                    self.queue.prune_agent(agent_id);
                }
                self.publish(cmd.clone());
                events.push(cmd);
            }
            grid.rebuild(world.all_positions());
        }

        let world = self.world.read();
        let mut clients = self.clients.lock();

        for client in clients.iter_mut() {
            if let Some(pos) = client
                .follow_agent_id
                .as_deref()
                .and_then(|id| world.get_position(id))
            {
                client.view_x = pos.x;
                client.view_z = pos.z;
            }
        }

        let is_full_snapshot_tick = tick % self.settings.full_snapshot_interval == 0;
        let envelopes: Vec<ServerMessage> = events
            .iter()
            .map(|message| ServerMessage::World {
                message: message.clone(),
            })
            .collect();
        let mut all_states: Option<Vec<AgentState>> = None;

        let mut report = TickReport {
            tick,
            commands: command_count,
            clients: 0,
            snapshots: 0,
            events_sent: 0,
        };

        let ids = clients.get_all_clients();
        for id in ids.iter() {
            let Some(client) = clients.get_mut(id) else {
                continue;
            };
            if !client.transport.is_open() {
                continue;
            }
            report.clients += 1;

            let first_snapshot = client.needs_full_snapshot();
            if is_full_snapshot_tick || first_snapshot {
                let states = all_states.get_or_insert_with(|| world.snapshot());
                let agents = if first_snapshot {
                    states.clone()
                } else {
                    let nearby =
                        grid.query_radius(client.view_x, client.view_z, self.settings.aoi_radius);
                    states
                        .iter()
                        .filter(|s| nearby.contains(s.profile.agent_id.as_str()))
                        .cloned()
                        .collect()
                };
                safe_send(client, &ServerMessage::Snapshot { agents });
                report.snapshots += 1;
                if first_snapshot {
                    client.last_ack_tick = tick;
                }
            } else if !events.is_empty() {
                let nearby =
                    grid.query_radius(client.view_x, client.view_z, self.settings.aoi_radius);
                for (event, envelope) in events.iter().zip(&envelopes) {
                    if event.kind().is_global() || nearby.contains(event.agent_id()) {
                        safe_send(client, envelope);
                        report.events_sent += 1;
                    }
                }
            }
        }

        if command_count > 0 {
            debug!(
                "Tick #{}: {} commands, {} clients, {} snapshots, {} events sent",
                tick, command_count, report.clients, report.snapshots, report.events_sent
            );
        }
        report
    }

    /// Fire-and-forget relay publish. Never awaited by the tick.
    fn publish(&self, msg: WorldMessage) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No async runtime; skipping relay publish");
            return;
        };
        let relay = Arc::clone(&self.relay);
        runtime.spawn(async move {
            let kind = msg.kind();
            if let Err(e) = relay.publish(msg).await {
                warn!("Relay publish error ({}): {}", kind.as_str(), e);
            }
        });
    }
}

impl Drop for GameLoop {
    fn drop(&mut self) {
        if let Some(task) = self.task.get_mut().take() {
            task.abort();
        }
    }
}

/// Send without letting a broken connection escape the tick.
fn safe_send(client: &ClientConnection, msg: &ServerMessage) {
    if !client.transport.is_open() {
        return;
    }
    if let Err(e) = client.transport.send(msg) {
        warn!("Failed to send to client {}: {}", client.id, e);
    }
}
