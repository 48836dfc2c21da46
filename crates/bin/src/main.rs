//! Agent world server binary.

use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Agent World Server v{}", env!("CARGO_PKG_VERSION"));

    let config = server::Config::load()?;
    info!("Loaded configuration");
    info!("  Room: {} ({})", config.room.name, config.room.id);
    info!("  Bind: {}:{}", config.server.bind, config.server.port);
    info!(
        "  World: +/-{} units, {} Hz, max {} agents",
        config.world.half_size, config.tick.tick_rate, config.room.max_agents
    );
    info!("  Frame limit: {} bytes", config.server.max_frame_bytes);

    server::run(config).await?;

    Ok(())
}
