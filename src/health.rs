// ABOUTME: Component health reporting for the health endpoint
// ABOUTME: Aggregates cache, governor, signaling, and transcription state
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

use crate::cache::CacheProvider;
use crate::constants::service;
use crate::resources::ServerResources;
use serde::Serialize;

/// Overall service status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// All components operational
    Healthy,
    /// Serving, but a non-critical component is impaired
    Degraded,
}

/// Health report returned by `GET /health`
#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub service: &'static str,
    pub version: &'static str,
    pub environment: String,
    pub cache_backend: &'static str,
    pub cache_healthy: bool,
    pub active_calls: u32,
    pub active_connections: usize,
    pub active_transcriptions: usize,
    pub rate_limit_windows: usize,
}

/// Build the current health report
pub async fn check(resources: &ServerResources) -> HealthReport {
    let cache_healthy = resources.cache.health_check().await.is_ok();

    let status = if cache_healthy {
        HealthStatus::Healthy
    } else {
        // The cache is best-effort: a dead backend degrades cost, not service
        HealthStatus::Degraded
    };

    HealthReport {
        status,
        service: service::NAME,
        version: env!("CARGO_PKG_VERSION"),
        environment: resources.config.environment.to_string(),
        cache_backend: resources.cache.backend_name(),
        cache_healthy,
        active_calls: resources.governor.concurrency().total_active(),
        active_connections: resources.websocket_manager.connection_count().await,
        active_transcriptions: resources.transcription.active_count(),
        rate_limit_windows: resources.governor.rate().window_count(),
    }
}
