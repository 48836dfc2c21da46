//! Agent world synchronization engine.

pub mod collision;
pub mod command_queue;
pub mod config;
pub mod directory;
pub mod history;
pub mod presence;
pub mod relay;
pub mod room;
pub mod server;
pub mod spatial;
pub mod world;

// Re-export commonly used types
pub use command_queue::{Admission, CommandQueue, Rejection};
pub use config::Config;
pub use directory::{AgentRegistry, ProfileDirectory};
pub use relay::{BroadcastRelay, NullRelay, Relay};
pub use room::{SubmitError, WorldHandle};
pub use server::{GameLoop, run};
pub use world::WorldState;
