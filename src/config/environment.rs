// ABOUTME: Environment configuration management for deployment-specific settings
// ABOUTME: Parses environment variables into typed sub-configs with compiled defaults
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Environment-based configuration management for production deployment

use crate::constants::{cache, env_config, limits, retries, signaling};
use crate::executor::RetryPolicy;
use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use tracing::warn;

/// Deployment environment
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Production,
    Testing,
}

impl Environment {
    /// Parse from string with fallback
    #[must_use]
    pub fn from_str_or_default(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "testing" | "test" => Self::Testing,
            _ => Self::Development,
        }
    }

    /// Check if this is a production environment
    #[must_use]
    pub const fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Development => write!(f, "development"),
            Self::Production => write!(f, "production"),
            Self::Testing => write!(f, "testing"),
        }
    }
}

/// Which provider clients to construct at bootstrap
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProviderMode {
    /// Real HTTP providers
    #[default]
    Http,
    /// In-process synthetic providers for local development
    Synthetic,
}

/// JWT validation settings
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for HS256 validation
    pub jwt_secret: String,
    /// Token lifetime accepted at issuance time
    pub jwt_expiry_hours: u64,
}

/// Fixed-window rate limiting settings
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Permitted actions per window
    pub window_limit: u32,
    /// Window length
    pub window: Duration,
}

/// Concurrent-call admission settings
#[derive(Debug, Clone)]
pub struct ConcurrencyConfig {
    /// Maximum concurrent outbound calls per tenant
    pub max_concurrent_calls: u32,
}

/// Signaling channel liveness settings
#[derive(Debug, Clone)]
pub struct WebSocketConfig {
    /// Interval between server pings
    pub heartbeat_interval: Duration,
    /// Missing a pong this long forces a disconnect
    pub heartbeat_timeout: Duration,
}

/// Telephony provider connection settings
#[derive(Debug, Clone)]
pub struct TelephonyConfig {
    /// Provider API base URL
    pub base_url: String,
    /// Provider API key
    pub api_key: String,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// Speech-to-text provider connection settings
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Provider API base URL
    pub base_url: String,
    /// Provider API key
    pub api_key: String,
    /// Connect timeout for streaming sessions
    pub connect_timeout: Duration,
}

/// Language-model provider settings
#[derive(Debug, Clone)]
pub struct LlmConfig {
    /// Provider API base URL (OpenAI-compatible)
    pub base_url: String,
    /// API key; absent for local servers
    pub api_key: Option<String>,
    /// Default completion model
    pub model: String,
    /// Per-request timeout
    pub request_timeout: Duration,
    /// TTL for cached completions
    pub completion_ttl: Duration,
}

/// Complete server configuration loaded from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP listen port
    pub http_port: u16,
    /// Externally reachable base URL for webhook callbacks
    pub base_url: String,
    /// Deployment environment
    pub environment: Environment,
    /// Provider client selection
    pub provider_mode: ProviderMode,
    /// JWT validation
    pub auth: AuthConfig,
    /// Rate limiting
    pub rate_limit: RateLimitConfig,
    /// Concurrency admission
    pub concurrency: ConcurrencyConfig,
    /// Response cache backend
    pub cache: crate::cache::CacheConfig,
    /// Signaling channel liveness
    pub websocket: WebSocketConfig,
    /// Telephony provider
    pub telephony: TelephonyConfig,
    /// Speech provider
    pub speech: SpeechConfig,
    /// Language-model provider
    pub llm: LlmConfig,
    /// Retry policy applied by the resilient executor
    pub retry: RetryPolicy,
}

fn env_parsed<T: std::str::FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

fn env_duration_secs(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map_or(default, Duration::from_secs)
}

fn env_duration_millis(name: &str, default: Duration) -> Duration {
    env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map_or(default, Duration::from_millis)
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Returns an error when a production deployment is missing required
    /// secrets (JWT secret, provider API keys).
    pub fn from_env() -> Result<Self> {
        let environment = Environment::from_str_or_default(
            &env::var("ENVIRONMENT").unwrap_or_default(),
        );

        let provider_mode = match env::var("PROVIDER_MODE").as_deref() {
            Ok("synthetic") => ProviderMode::Synthetic,
            _ => ProviderMode::Http,
        };

        let jwt_secret = match env::var("JWT_SECRET") {
            Ok(secret) if !secret.is_empty() => secret,
            _ if environment.is_production() => {
                bail!("JWT_SECRET must be set in production");
            }
            _ => {
                warn!("JWT_SECRET not set, using development default");
                "switchboard-dev-secret".to_owned()
            }
        };

        let telephony_api_key = env::var("TELEPHONY_API_KEY").unwrap_or_default();
        let speech_api_key = env::var("SPEECH_API_KEY").unwrap_or_default();
        if environment.is_production() && provider_mode == ProviderMode::Http {
            if telephony_api_key.is_empty() {
                bail!("TELEPHONY_API_KEY must be set in production");
            }
            if speech_api_key.is_empty() {
                bail!("SPEECH_API_KEY must be set in production");
            }
        }

        let provider_timeout =
            env_duration_secs("PROVIDER_TIMEOUT_SECS", retries::DEFAULT_PROVIDER_TIMEOUT);

        let base_url = env_config::base_url();
        if url::Url::parse(&base_url).is_err() {
            bail!("BASE_URL is not a valid URL: {base_url}");
        }

        Ok(Self {
            http_port: env_config::http_port(),
            base_url,
            environment,
            provider_mode,
            auth: AuthConfig {
                jwt_secret,
                jwt_expiry_hours: env_parsed(
                    "JWT_EXPIRY_HOURS",
                    limits::DEFAULT_JWT_EXPIRY_HOURS,
                ),
            },
            rate_limit: RateLimitConfig {
                window_limit: env_parsed(
                    "RATE_LIMIT_WINDOW_MAX",
                    limits::DEFAULT_RATE_WINDOW_LIMIT,
                ),
                window: env_duration_secs(
                    "RATE_LIMIT_WINDOW_SECS",
                    Duration::from_secs(limits::DEFAULT_RATE_WINDOW_SECS),
                ),
            },
            concurrency: ConcurrencyConfig {
                max_concurrent_calls: env_parsed(
                    "MAX_CONCURRENT_CALLS",
                    limits::DEFAULT_MAX_CONCURRENT_CALLS,
                ),
            },
            cache: crate::cache::CacheConfig {
                max_entries: env_parsed("CACHE_MAX_ENTRIES", cache::DEFAULT_MAX_ENTRIES),
                redis_url: env::var("REDIS_URL").ok().filter(|s| !s.is_empty()),
                cleanup_interval: env_duration_secs(
                    "CACHE_CLEANUP_INTERVAL_SECS",
                    cache::DEFAULT_CLEANUP_INTERVAL,
                ),
                enable_background_cleanup: true,
            },
            websocket: WebSocketConfig {
                heartbeat_interval: env_duration_secs(
                    "WS_HEARTBEAT_INTERVAL_SECS",
                    signaling::DEFAULT_HEARTBEAT_INTERVAL,
                ),
                heartbeat_timeout: env_duration_secs(
                    "WS_HEARTBEAT_TIMEOUT_SECS",
                    signaling::DEFAULT_HEARTBEAT_TIMEOUT,
                ),
            },
            telephony: TelephonyConfig {
                base_url: env::var("TELEPHONY_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:9200".to_owned()),
                api_key: telephony_api_key,
                request_timeout: provider_timeout,
            },
            speech: SpeechConfig {
                base_url: env::var("SPEECH_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:9300".to_owned()),
                api_key: speech_api_key,
                connect_timeout: provider_timeout,
            },
            llm: LlmConfig {
                base_url: env::var("LLM_BASE_URL")
                    .unwrap_or_else(|_| "http://localhost:11434/v1".to_owned()),
                api_key: env::var("LLM_API_KEY").ok().filter(|s| !s.is_empty()),
                model: env::var("LLM_MODEL")
                    .unwrap_or_else(|_| "qwen2.5:14b-instruct".to_owned()),
                request_timeout: provider_timeout,
                completion_ttl: env_duration_secs("LLM_CACHE_TTL_SECS", cache::TTL_COMPLETION),
            },
            retry: RetryPolicy {
                max_attempts: env_parsed("RETRY_MAX_ATTEMPTS", retries::DEFAULT_MAX_ATTEMPTS),
                base_delay: env_duration_millis("RETRY_BASE_DELAY_MS", retries::DEFAULT_BASE_DELAY),
                max_delay: env_duration_millis("RETRY_MAX_DELAY_MS", retries::DEFAULT_MAX_DELAY),
                multiplier: retries::DEFAULT_MULTIPLIER,
                jitter: true,
            },
        })
    }

    /// One-line boot summary for the startup log
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "environment={} port={} providers={:?} rate_limit={}/{}s max_concurrent_calls={} cache={}",
            self.environment,
            self.http_port,
            self.provider_mode,
            self.rate_limit.window_limit,
            self.rate_limit.window.as_secs(),
            self.concurrency.max_concurrent_calls,
            self.cache
                .redis_url
                .as_deref()
                .map_or("memory", |_| "redis"),
        )
    }
}
