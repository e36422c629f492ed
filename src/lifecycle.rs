// ABOUTME: Server lifecycle coordination for startup, background tasks, and shutdown
// ABOUTME: Wires SIGTERM/ctrl-c into axum graceful shutdown and task teardown
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Server lifecycle.
//!
//! Owns the boring but load-bearing parts of running the process: binding
//! the listener, spawning background sweepers, and shutting down gracefully
//! when the platform asks.

use crate::resources::ServerResources;
use crate::routes;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Interval between rate-limit window sweeps
const GOVERNOR_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Runs the server until a shutdown signal arrives
pub struct ServerLifecycle {
    resources: Arc<ServerResources>,
}

impl ServerLifecycle {
    /// Prepare the lifecycle around assembled resources
    #[must_use]
    pub fn new(resources: Arc<ServerResources>) -> Self {
        Self { resources }
    }

    /// Bind, serve, and block until shutdown completes
    ///
    /// # Errors
    ///
    /// Returns an error if the listener cannot bind or the server fails.
    pub async fn run(self) -> Result<()> {
        self.resources.verify()?;

        // Signaling fan-out and heartbeat run for the process lifetime
        self.resources.websocket_manager.start_background_tasks();

        // Idle rate-limit windows are reset lazily on access; the sweep just
        // bounds memory for tenants that went quiet
        {
            let governor = self.resources.governor.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(GOVERNOR_SWEEP_INTERVAL);
                loop {
                    ticker.tick().await;
                    governor.rate().sweep_expired();
                }
            });
        }

        let addr = SocketAddr::from(([0, 0, 0, 0], self.resources.config.http_port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        info!(addr = %addr, "Switchboard call server listening");

        let app = routes::router(self.resources);
        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .context("server error")?;

        info!("Server shut down cleanly");
        Ok(())
    }
}

/// Resolve when the process is asked to stop (ctrl-c or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received ctrl-c, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
