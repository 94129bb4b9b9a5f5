use anyhow::Context;
use practice_server::{Config, Server, ServerState, print_banner, setup_environment};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Environment (.env) and configuration
    let _ = dotenv::dotenv();
    let config = Config::from_env().context("invalid configuration")?;

    // 2. Logging
    setup_environment(&config);
    print_banner();
    tracing::info!(environment = %config.environment, "Practice server starting...");

    // 3. State (database, migrations, bootstrap admin)
    let state = ServerState::initialize(&config)
        .await
        .context("failed to initialize server state")?;

    // 4. HTTP server
    let server = Server::with_state(config, state);
    if let Err(e) = server.run().await {
        tracing::error!("Server error: {}", e);
        return Err(e.into());
    }

    Ok(())
}
