//! Match Room Server
//!
//! Accepts player connections, runs the matchmaking queue, and hosts the
//! per-match tick loops described in the crate's top-level docs.

use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use match_room_server::config::ServerConfig;
use match_room_server::network::{AuthConfig, Gateway};
use match_room_server::VERSION;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("failed to set tracing subscriber");

    info!("Match Room Server v{}", VERSION);

    let config = ServerConfig::from_env();
    let auth_config = AuthConfig::from_env();
    if !auth_config.is_configured() {
        info!("no auth provider configured, trusting client-claimed playerId");
    }

    info!(
        port = config.port,
        tick_rate = config.room.tick_rate,
        game_mode = %config.matchmaker.game_mode,
        "starting gateway"
    );

    let gateway = Gateway::new(config, auth_config);
    gateway.run().await?;

    Ok(())
}
