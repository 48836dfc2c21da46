//! Server configuration.

use crate::collision::Obstacle;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

/// Root configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub room: RoomConfig,
    #[serde(default)]
    pub world: WorldConfig,
    #[serde(default)]
    pub tick: TickConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
}

impl Config {
    /// Load configuration from `config.toml` or use defaults, then apply
    /// environment overrides.
    pub fn load() -> anyhow::Result<Self> {
        let path = Path::new("config.toml");
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            toml::from_str(&contents)?
        } else {
            info!("No config.toml found, creating default config");
            let default_config = Self::default();
            std::fs::write(path, toml::to_string_pretty(&default_config)?)?;
            default_config
        };
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Apply `ROOM_*` / `WORLD_*` / `MAX_AGENTS` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(id) = lookup("ROOM_ID") {
            self.room.id = id;
        }
        if let Some(name) = lookup("ROOM_NAME") {
            self.room.name = name;
        }
        if let Some(description) = lookup("ROOM_DESCRIPTION") {
            self.room.description = description;
        }
        if let Some(host) = lookup("WORLD_HOST") {
            self.server.bind = host;
        }
        if let Some(port) = lookup("WORLD_PORT") {
            match port.parse() {
                Ok(port) => self.server.port = port,
                Err(_) => warn!("Ignoring invalid WORLD_PORT: {}", port),
            }
        }
        if let Some(max) = lookup("MAX_AGENTS") {
            match max.parse() {
                Ok(max) => self.room.max_agents = max,
                Err(_) => warn!("Ignoring invalid MAX_AGENTS: {}", max),
            }
        }
        if self.room.id.is_empty() {
            self.room.id = generate_room_id();
        }
    }
}

/// Networking settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Bind address.
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum concurrent viewer connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Connections per IP limit.
    #[serde(default = "default_ip_limit")]
    pub ip_limit: usize,
    /// Inbound frames larger than this are dropped.
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            max_connections: default_max_connections(),
            ip_limit: default_ip_limit(),
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn default_port() -> u16 {
    18800
}
fn default_bind() -> String {
    "127.0.0.1".to_string()
}
fn default_max_connections() -> usize {
    500
}
fn default_ip_limit() -> usize {
    100
}
fn default_max_frame_bytes() -> usize {
    protocol::MAX_FRAME_BYTES
}

/// Room identity shown to viewers.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RoomConfig {
    /// Room id; generated at startup when empty.
    #[serde(default)]
    pub id: String,
    #[serde(default = "default_room_name")]
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Maximum agents placed in the world at once.
    #[serde(default = "default_max_agents")]
    pub max_agents: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: default_room_name(),
            description: String::new(),
            max_agents: default_max_agents(),
        }
    }
}

fn default_room_name() -> String {
    "Lobster Room".to_string()
}
fn default_max_agents() -> usize {
    50
}

/// World geometry.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WorldConfig {
    /// Half of the world edge; positions must satisfy |x|, |z| <= half_size.
    #[serde(default = "default_half_size")]
    pub half_size: f64,
    /// Fraction of `half_size` used for random spawn placement.
    #[serde(default = "default_spawn_fraction")]
    pub spawn_fraction: f64,
    /// Spatial grid cell size.
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,
    /// Number of non-positional events kept in history.
    #[serde(default = "default_event_history")]
    pub event_history: usize,
    /// Static circular blockers.
    #[serde(default = "default_obstacles")]
    pub obstacles: Vec<Obstacle>,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            half_size: default_half_size(),
            spawn_fraction: default_spawn_fraction(),
            cell_size: default_cell_size(),
            event_history: default_event_history(),
            obstacles: default_obstacles(),
        }
    }
}

fn default_half_size() -> f64 {
    50.0
}
fn default_spawn_fraction() -> f64 {
    0.6
}
fn default_cell_size() -> f64 {
    10.0
}
fn default_event_history() -> usize {
    200
}
fn default_obstacles() -> Vec<Obstacle> {
    vec![
        Obstacle::new(-20.0, -20.0, 4.0),
        Obstacle::new(22.0, -22.0, 6.0),
        Obstacle::new(0.0, -35.0, 5.0),
    ]
}

/// Simulation loop settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TickConfig {
    /// Ticks per second.
    #[serde(default = "default_tick_rate")]
    pub tick_rate: u32,
    /// Area-of-interest radius around each viewer.
    #[serde(default = "default_aoi_radius")]
    pub aoi_radius: f64,
    /// Ticks between periodic full snapshots; 0 means `tick_rate * 5`.
    #[serde(default)]
    pub full_snapshot_interval: u64,
}

impl TickConfig {
    /// Tick period, never below 1ms.
    pub fn tick_interval_ms(&self) -> u64 {
        (1000 / u64::from(self.tick_rate.max(1))).max(1)
    }

    pub fn snapshot_interval(&self) -> u64 {
        if self.full_snapshot_interval == 0 {
            u64::from(self.tick_rate.max(1)) * 5
        } else {
            self.full_snapshot_interval
        }
    }
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            tick_rate: default_tick_rate(),
            aoi_radius: default_aoi_radius(),
            full_snapshot_interval: 0,
        }
    }
}

fn default_tick_rate() -> u32 {
    20
}
fn default_aoi_radius() -> f64 {
    40.0
}

/// Command admission limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LimitsConfig {
    /// Commands allowed per agent inside the rate window.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: usize,
    #[serde(default = "default_rate_window_ms")]
    pub rate_window_ms: u64,
    /// Clearance added to each obstacle radius.
    #[serde(default = "default_collision_margin")]
    pub collision_margin: f64,
    /// Maximum chat length in characters.
    #[serde(default = "default_chat_max_len")]
    pub chat_max_len: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            rate_limit: default_rate_limit(),
            rate_window_ms: default_rate_window_ms(),
            collision_margin: default_collision_margin(),
            chat_max_len: default_chat_max_len(),
        }
    }
}

fn default_rate_limit() -> usize {
    20
}
fn default_rate_window_ms() -> u64 {
    1000
}
fn default_collision_margin() -> f64 {
    1.0
}
fn default_chat_max_len() -> usize {
    500
}

/// Liveness and inactivity handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PresenceConfig {
    /// Agents seen within this window count as online.
    #[serde(default = "default_online_window_secs")]
    pub online_window_secs: u64,
    /// Inactive agents are set to idle after this long.
    #[serde(default = "default_idle_after_secs")]
    pub idle_after_secs: u64,
    /// Inactive agents are removed from the world after this long.
    #[serde(default = "default_kick_after_secs")]
    pub kick_after_secs: u64,
    /// How often the presence scanner runs.
    #[serde(default = "default_scan_interval_secs")]
    pub scan_interval_secs: u64,
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            online_window_secs: default_online_window_secs(),
            idle_after_secs: default_idle_after_secs(),
            kick_after_secs: default_kick_after_secs(),
            scan_interval_secs: default_scan_interval_secs(),
        }
    }
}

fn default_online_window_secs() -> u64 {
    5 * 60
}
fn default_idle_after_secs() -> u64 {
    30 * 60
}
fn default_kick_after_secs() -> u64 {
    120 * 60
}
fn default_scan_interval_secs() -> u64 {
    60
}

/// URL-safe 12 character id.
fn generate_room_id() -> String {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
    let mut rng = rand::rng();
    (0..12)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect()
}
