// ABOUTME: Application constants organized by domain
// ABOUTME: Default limits, timeouts, and environment helpers shared across modules
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Constants module
//!
//! Constants are grouped into logical domains rather than scattered across
//! call sites. Values here are compiled defaults; most can be overridden
//! through [`crate::config::environment::ServerConfig`].

/// Service identity used in logs and health reports
pub mod service {
    /// Canonical service name
    pub const NAME: &str = "switchboard-call-server";
}

/// Admission-control limits
pub mod limits {
    /// Default maximum concurrent outbound calls per tenant
    pub const DEFAULT_MAX_CONCURRENT_CALLS: u32 = 10;

    /// Default rate-limit window length in seconds
    pub const DEFAULT_RATE_WINDOW_SECS: u64 = 60;

    /// Default permitted actions per rate-limit window
    pub const DEFAULT_RATE_WINDOW_LIMIT: u32 = 30;

    /// Default JWT expiry in hours
    pub const DEFAULT_JWT_EXPIRY_HOURS: u64 = 24;

    /// Upper bound on inbound WebSocket message size in bytes
    pub const MAX_WS_MESSAGE_BYTES: usize = 64 * 1024;

    /// Upper bound on a request body accepted by the HTTP surface
    pub const MAX_HTTP_BODY_BYTES: usize = 256 * 1024;
}

/// Retry and timeout defaults for outbound provider calls
pub mod retries {
    use std::time::Duration;

    /// Default maximum attempts per provider operation
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Default base delay before the first retry
    pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(500);

    /// Default cap on a single backoff delay
    pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

    /// Default exponential backoff multiplier
    pub const DEFAULT_MULTIPLIER: f64 = 2.0;

    /// Default per-request timeout for provider HTTP calls
    pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);
}

/// Response cache defaults
pub mod cache {
    use std::time::Duration;

    /// Default maximum entries held by the in-memory backend
    pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

    /// Default interval between expired-entry sweeps
    pub const DEFAULT_CLEANUP_INTERVAL: Duration = Duration::from_secs(300);

    /// Default TTL for cached LLM completions
    pub const TTL_COMPLETION: Duration = Duration::from_secs(3600);

    /// Default TTL for cached call summaries
    pub const TTL_SUMMARY: Duration = Duration::from_secs(24 * 3600);
}

/// Signaling channel defaults
pub mod signaling {
    use std::time::Duration;

    /// Broadcast channel capacity for fan-out to connections
    pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

    /// Interval between server pings
    pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

    /// A connection missing a pong this long is forcibly disconnected
    pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(90);

    /// How long an unauthenticated connection may hold a socket open
    pub const AUTH_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);
}

/// Streaming transcription defaults
pub mod transcription {
    /// Bounded queue depth for provider speech events per call
    pub const EVENT_QUEUE_DEPTH: usize = 256;
}

/// Environment-variable helpers with compiled fallbacks
pub mod env_config {
    use std::env;

    /// HTTP server port from environment or default
    #[must_use]
    pub fn http_port() -> u16 {
        env::var("HTTP_PORT")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(8080)
    }

    /// Externally reachable base URL, used to build webhook callback URLs
    #[must_use]
    pub fn base_url() -> String {
        env::var("BASE_URL").unwrap_or_else(|_| "http://localhost:8080".to_string())
    }
}
