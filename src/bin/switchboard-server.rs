// ABOUTME: Server binary for the Switchboard call orchestration platform
// ABOUTME: Loads environment configuration, assembles resources, and serves until shutdown
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! # Switchboard Call Server Binary
//!
//! Starts the call orchestration core: REST command surface, provider
//! webhooks, and the WebSocket signaling channel.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use switchboard_call_server::{
    config::ServerConfig, lifecycle::ServerLifecycle, logging, resources::ServerResources,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "switchboard-server")]
#[command(about = "Switchboard - call orchestration core for AI voice agents")]
struct Args {
    /// Override HTTP port
    #[arg(long)]
    http_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    logging::init_from_env()?;

    let mut config = ServerConfig::from_env()?;
    if let Some(http_port) = args.http_port {
        config.http_port = http_port;
    }

    info!("Starting Switchboard call server");
    info!("{}", config.summary());

    let resources = Arc::new(ServerResources::from_config(Arc::new(config)).await?);
    ServerLifecycle::new(resources).run().await
}
