// ABOUTME: Shared test utilities and setup functions for integration tests
// ABOUTME: Builds server resources around synthetic providers and in-memory storage
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice
#![allow(dead_code)]

//! Shared test utilities for `switchboard_call_server`
//!
//! Every integration test assembles the same resource graph: in-memory
//! storage, synthetic providers (with handles kept for scripting failures),
//! and a generous default configuration that individual tests tighten.

use std::sync::{Arc, Once};
use std::time::Duration;
use switchboard_call_server::{
    cache::CacheConfig,
    config::environment::{
        AuthConfig, ConcurrencyConfig, Environment, LlmConfig, ProviderMode, RateLimitConfig,
        ServerConfig, SpeechConfig, TelephonyConfig, WebSocketConfig,
    },
    context::RequestContext,
    executor::RetryPolicy,
    llm::{ChatProvider, SyntheticLlmProvider},
    providers::synthetic::{SyntheticSpeechProvider, SyntheticTelephonyProvider},
    resources::ServerResources,
    storage::InMemoryCallStorage,
};
use uuid::Uuid;

static INIT_LOGGER: Once = Once::new();

/// Initialize quiet logging for tests (call once per test process)
pub fn init_test_logging() {
    INIT_LOGGER.call_once(|| {
        let log_level = match std::env::var("TEST_LOG").as_deref() {
            Ok("TRACE") => tracing::Level::TRACE,
            Ok("DEBUG") => tracing::Level::DEBUG,
            Ok("INFO") => tracing::Level::INFO,
            _ => tracing::Level::WARN,
        };

        tracing_subscriber::fmt()
            .with_max_level(log_level)
            .with_test_writer()
            .init();
    });
}

/// Configuration with generous limits and fast retries for tests
#[must_use]
pub fn test_config() -> ServerConfig {
    ServerConfig {
        http_port: 0,
        base_url: "http://localhost:8080".into(),
        environment: Environment::Testing,
        provider_mode: ProviderMode::Synthetic,
        auth: AuthConfig {
            jwt_secret: "test-secret".into(),
            jwt_expiry_hours: 1,
        },
        rate_limit: RateLimitConfig {
            window_limit: 1000,
            window: Duration::from_secs(60),
        },
        concurrency: ConcurrencyConfig {
            max_concurrent_calls: 10,
        },
        cache: CacheConfig {
            max_entries: 1000,
            redis_url: None,
            cleanup_interval: Duration::from_secs(300),
            // Avoid background tasks in tests
            enable_background_cleanup: false,
        },
        websocket: WebSocketConfig {
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(90),
        },
        telephony: TelephonyConfig {
            base_url: "http://localhost:9200".into(),
            api_key: String::new(),
            request_timeout: Duration::from_secs(5),
        },
        speech: SpeechConfig {
            base_url: "http://localhost:9300".into(),
            api_key: String::new(),
            connect_timeout: Duration::from_secs(5),
        },
        llm: LlmConfig {
            base_url: "http://localhost:11434/v1".into(),
            api_key: None,
            model: "synthetic-1".into(),
            request_timeout: Duration::from_secs(5),
            completion_ttl: Duration::from_secs(3600),
        },
        retry: RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            multiplier: 2.0,
            jitter: false,
        },
    }
}

/// Assembled test resources with handles to the synthetic providers
pub struct TestHarness {
    pub resources: Arc<ServerResources>,
    pub telephony: Arc<SyntheticTelephonyProvider>,
    pub speech: Arc<SyntheticSpeechProvider>,
    pub llm: Arc<SyntheticLlmProvider>,
    pub storage: Arc<InMemoryCallStorage>,
}

/// Build a harness with the given configuration
#[must_use]
pub fn build_harness(config: ServerConfig) -> TestHarness {
    init_test_logging();

    let telephony = Arc::new(SyntheticTelephonyProvider::new());
    let speech = Arc::new(SyntheticSpeechProvider::new());
    let llm = Arc::new(SyntheticLlmProvider::new());
    let storage = Arc::new(InMemoryCallStorage::new());

    let resources = Arc::new(
        ServerResources::builder(Arc::new(config))
            .with_storage(storage.clone())
            .with_telephony(telephony.clone())
            .with_speech(speech.clone())
            .with_llm(ChatProvider::Synthetic(llm.clone()))
            .build(),
    );

    TestHarness {
        resources,
        telephony,
        speech,
        llm,
        storage,
    }
}

/// Build a harness with the default test configuration
#[must_use]
pub fn default_harness() -> TestHarness {
    build_harness(test_config())
}

/// Request context for an arbitrary authenticated caller
#[must_use]
pub fn test_context() -> RequestContext {
    RequestContext::new(Uuid::new_v4(), Uuid::new_v4())
}
