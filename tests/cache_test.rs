// ABOUTME: Tests for the in-memory cache backend and the cached chat client
// ABOUTME: Covers TTL expiry, invalidation, eviction, and completion reuse
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

mod common;

use common::{default_harness, init_test_logging};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use switchboard_call_server::cache::{
    factory::Cache, memory::InMemoryCache, CacheConfig, CacheKey, CacheProvider,
};
use switchboard_call_server::llm::{ChatMessage, ChatRequest};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
struct TestData {
    value: String,
    count: u32,
}

fn test_cache(max_entries: usize) -> Cache {
    init_test_logging();
    Cache::Memory(InMemoryCache::new(&CacheConfig {
        max_entries,
        redis_url: None,
        cleanup_interval: Duration::from_secs(300),
        enable_background_cleanup: false,
    }))
}

fn key(fingerprint_seed: &str) -> CacheKey {
    CacheKey::for_payload("llm", "synthetic-1", &serde_json::json!({ "q": fingerprint_seed }))
}

#[tokio::test]
async fn test_cache_set_and_get() {
    let cache = test_cache(100);
    let key = key("round-trip");
    let data = TestData {
        value: "test".into(),
        count: 42,
    };

    cache.set(&key, &data, Duration::from_secs(10)).await.unwrap();

    let retrieved: Option<TestData> = cache.get(&key).await.unwrap();
    assert_eq!(retrieved, Some(data));
}

#[tokio::test]
async fn test_cache_expiration() {
    let cache = test_cache(100);
    let key = key("expires");
    let data = TestData {
        value: "expires".into(),
        count: 1,
    };

    cache.set(&key, &data, Duration::from_millis(50)).await.unwrap();
    assert!(cache.exists(&key).await.unwrap());

    tokio::time::sleep(Duration::from_millis(80)).await;

    let retrieved: Option<TestData> = cache.get(&key).await.unwrap();
    assert_eq!(retrieved, None);
    assert!(!cache.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_cache_ttl_reporting() {
    let cache = test_cache(100);
    let key = key("ttl");
    let data = TestData {
        value: "ttl".into(),
        count: 5,
    };

    cache.set(&key, &data, Duration::from_secs(10)).await.unwrap();

    let ttl = cache.ttl(&key).await.unwrap().unwrap();
    assert!(ttl <= Duration::from_secs(10));
    assert!(ttl >= Duration::from_secs(9));
}

#[tokio::test]
async fn test_cache_invalidate() {
    let cache = test_cache(100);
    let key = key("delete-me");
    let data = TestData {
        value: "delete".into(),
        count: 99,
    };

    cache.set(&key, &data, Duration::from_secs(60)).await.unwrap();
    assert!(cache.exists(&key).await.unwrap());

    cache.invalidate(&key).await.unwrap();
    assert!(!cache.exists(&key).await.unwrap());
}

#[tokio::test]
async fn test_cache_pattern_invalidation() {
    let cache = test_cache(100);
    let data = TestData {
        value: "x".into(),
        count: 1,
    };

    let llm_key = key("one");
    let other_key = CacheKey::for_payload("speech", "batch", &serde_json::json!({ "q": "one" }));
    cache.set(&llm_key, &data, Duration::from_secs(60)).await.unwrap();
    cache.set(&other_key, &data, Duration::from_secs(60)).await.unwrap();

    let removed = cache.invalidate_pattern("llm:*").await.unwrap();
    assert_eq!(removed, 1);
    assert!(!cache.exists(&llm_key).await.unwrap());
    assert!(cache.exists(&other_key).await.unwrap());
}

#[tokio::test]
async fn test_lru_eviction_at_capacity() {
    let cache = test_cache(2);
    let data = TestData {
        value: "x".into(),
        count: 1,
    };

    let first = key("first");
    let second = key("second");
    let third = key("third");
    cache.set(&first, &data, Duration::from_secs(60)).await.unwrap();
    cache.set(&second, &data, Duration::from_secs(60)).await.unwrap();
    cache.set(&third, &data, Duration::from_secs(60)).await.unwrap();

    // Least-recently-used entry was evicted to stay within capacity
    assert!(!cache.exists(&first).await.unwrap());
    assert!(cache.exists(&second).await.unwrap());
    assert!(cache.exists(&third).await.unwrap());
}

#[tokio::test]
async fn test_identical_completions_hit_the_cache() {
    let harness = default_harness();

    let request = ChatRequest::new(vec![
        ChatMessage::system("You are a test assistant."),
        ChatMessage::user("Summarize this call."),
    ]);

    let first = harness.resources.chat.complete(&request).await.unwrap();
    let second = harness.resources.chat.complete(&request).await.unwrap();

    assert_eq!(first.content, second.content);
    // Only the first request reached the provider
    assert_eq!(harness.llm.completion_count(), 1);

    // A different payload is a different fingerprint
    let other = ChatRequest::new(vec![ChatMessage::user("Different question.")]);
    harness.resources.chat.complete(&other).await.unwrap();
    assert_eq!(harness.llm.completion_count(), 2);
}

#[tokio::test]
async fn test_explicit_invalidation_forces_fresh_completion() {
    let harness = default_harness();

    let request = ChatRequest::new(vec![ChatMessage::user("cache me")]);
    harness.resources.chat.complete(&request).await.unwrap();
    assert_eq!(harness.llm.completion_count(), 1);

    harness.resources.chat.invalidate(&request).await;
    harness.resources.chat.complete(&request).await.unwrap();
    assert_eq!(harness.llm.completion_count(), 2);
}
