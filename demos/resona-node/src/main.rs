//! A standalone Resona node.
//!
//! Reads its configuration from the JSON file named by `RESONA_CONFIG`
//! (defaults otherwise) and logs session lifecycle events. `RUST_LOG`
//! controls verbosity.

use std::sync::Arc;

use resona::prelude::*;
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Lifecycle logging
// ---------------------------------------------------------------------------

struct LifecycleLog;

impl SessionEventHandler for LifecycleLog {
    fn on_new_player(&self, ctx: &SessionContext, player: &Arc<Player>) {
        tracing::info!(session_id = %ctx.session_id(), guild_id = %player.guild_id(), "player created");
    }

    fn on_destroy_player(&self, ctx: &SessionContext, player: &Arc<Player>) {
        tracing::info!(session_id = %ctx.session_id(), guild_id = %player.guild_id(), "player destroyed");
    }

    fn on_socket_context_paused(&self, ctx: &SessionContext) {
        tracing::info!(
            session_id = %ctx.session_id(),
            timeout = ?ctx.resume_timeout(),
            "waiting for client to resume"
        );
    }

    fn on_socket_context_destroyed(&self, ctx: &SessionContext) {
        tracing::info!(session_id = %ctx.session_id(), "session gone");
    }
}

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

fn load_config() -> Result<ServerConfig, ResonaError> {
    match std::env::var("RESONA_CONFIG") {
        Ok(path) => ServerConfig::load(path),
        Err(_) => Ok(ServerConfig::default()),
    }
}

fn build(config: ServerConfig) -> ResonaServerBuilder {
    ResonaServer::builder()
        .config(config)
        .event_handler(Arc::new(LifecycleLog))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = load_config()?;
    tracing::info!(addr = %config.bind_addr, "starting resona node");

    let server = build(config).build().await?;
    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
