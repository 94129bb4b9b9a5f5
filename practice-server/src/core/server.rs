//! HTTP server startup and lifecycle

use std::net::SocketAddr;
use std::time::Duration;

use crate::core::{Config, Result, ServerError, ServerState};
use crate::routes::build_app;

/// How often stale login rate-limit windows are purged
const RATE_LIMIT_CLEANUP_INTERVAL: Duration = Duration::from_secs(60);

/// HTTP Server
pub struct Server {
    config: Config,
    state: Option<ServerState>,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            state: None,
        }
    }

    /// Create server with existing state (shared with in-process callers)
    pub fn with_state(config: Config, state: ServerState) -> Self {
        Self {
            config,
            state: Some(state),
        }
    }

    pub async fn run(&self) -> Result<()> {
        let state = match &self.state {
            Some(s) => s.clone(),
            None => ServerState::initialize(&self.config)
                .await
                .map_err(|e| ServerError::Config(e.to_string()))?,
        };

        self.start_background_tasks(&state);

        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        tracing::info!(%addr, "Practice server listening");

        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutting down...");
        };

        axum::serve(
            listener,
            build_app(&state).into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown)
        .await?;

        tracing::info!("Server stopped");
        Ok(())
    }

    fn start_background_tasks(&self, state: &ServerState) {
        let limiter = state.rate_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(RATE_LIMIT_CLEANUP_INTERVAL);
            loop {
                interval.tick().await;
                limiter.cleanup();
            }
        });
    }
}
