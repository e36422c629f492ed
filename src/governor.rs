// ABOUTME: Rate limiting and concurrent-call admission control per tenant
// ABOUTME: Fixed-window counters plus an atomic active-call token gate
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! # Rate & Concurrency Governor
//!
//! Two independent mechanisms composed behind [`Governor::admit_call`]:
//!
//! - **Rate limiting**: fixed-window counters keyed by `(tenant, resource)`.
//!   The first increment in a window starts the window's expiry; an action is
//!   rejected once the counter reaches the configured threshold.
//! - **Concurrency admission**: a bounded count of active-call tokens per
//!   tenant. `admit` atomically checks and increments; the returned
//!   [`CallToken`] releases on drop and releases are idempotent.
//!
//! All bookkeeping is synchronous; nothing here is held across a provider
//! await. An [`ErrorCode::RateLimitExceeded`] or
//! [`ErrorCode::ConcurrencyLimitExceeded`] rejection is returned to the
//! caller directly and never retried internally.
//!
//! [`ErrorCode::RateLimitExceeded`]: crate::errors::ErrorCode::RateLimitExceeded
//! [`ErrorCode::ConcurrencyLimitExceeded`]: crate::errors::ErrorCode::ConcurrencyLimitExceeded

use crate::config::environment::{ConcurrencyConfig, RateLimitConfig};
use crate::errors::{AppError, AppResult};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// Well-known governed resource names
pub mod resources {
    /// Outbound call initiation
    pub const CALL_INITIATE: &str = "calls.initiate";
    /// Chat messages over the signaling channel
    pub const CHAT_MESSAGE: &str = "chat.message";
}

/// Result of a permitted rate-limit check
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStatus {
    /// Maximum actions allowed in the current window
    pub limit: u32,
    /// Actions remaining in the current window
    pub remaining: u32,
    /// When the current window resets
    pub reset_at: DateTime<Utc>,
}

#[derive(Debug)]
struct WindowState {
    count: u32,
    started: Instant,
}

/// Fixed-window rate limiter keyed by `(tenant, resource)`
#[derive(Debug)]
pub struct RateLimiter {
    limit: u32,
    window: Duration,
    windows: DashMap<(Uuid, String), WindowState>,
}

impl RateLimiter {
    /// Create a limiter permitting `limit` actions per `window`
    #[must_use]
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            windows: DashMap::new(),
        }
    }

    /// Record one action for `(tenant, resource)`, rejecting once the window is full
    ///
    /// The check-and-increment runs under the map entry's shard lock, so
    /// concurrent callers cannot both observe the last free slot.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::rate_limit_exceeded`] when the window's counter
    /// has reached the limit.
    pub fn check(&self, tenant_id: Uuid, resource: &str) -> AppResult<RateLimitStatus> {
        let mut entry = self
            .windows
            .entry((tenant_id, resource.to_owned()))
            .or_insert_with(|| WindowState {
                count: 0,
                started: Instant::now(),
            });

        // Expired window: the next action starts a fresh one
        if entry.started.elapsed() >= self.window {
            entry.count = 0;
            entry.started = Instant::now();
        }

        let reset_in = self.window.saturating_sub(entry.started.elapsed());
        let reset_at = Utc::now()
            + chrono::Duration::from_std(reset_in).unwrap_or_else(|_| chrono::Duration::zero());

        if entry.count >= self.limit {
            drop(entry);
            warn!(
                tenant_id = %tenant_id,
                resource = %resource,
                limit = self.limit,
                "Rate limit window exhausted"
            );
            return Err(AppError::rate_limit_exceeded(resource, self.limit, reset_at)
                .with_tenant_id(tenant_id));
        }

        entry.count += 1;
        let remaining = self.limit - entry.count;
        drop(entry);

        Ok(RateLimitStatus {
            limit: self.limit,
            remaining,
            reset_at,
        })
    }

    /// Drop windows that have been idle past their expiry
    ///
    /// Windows are also reset lazily on access; this sweep only bounds memory
    /// for tenants that went quiet.
    pub fn sweep_expired(&self) {
        let window = self.window;
        self.windows
            .retain(|_, state| state.started.elapsed() < window);
    }

    /// Number of live windows (for health reporting)
    #[must_use]
    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

/// A held active-call slot for one admitted call
///
/// Released explicitly when the call reaches a terminal state, or on drop as
/// a backstop. Double releases are no-ops.
#[derive(Debug)]
pub struct CallToken {
    tenant_id: Uuid,
    counter: Arc<AtomicU32>,
    released: AtomicBool,
}

impl CallToken {
    /// The tenant this token was admitted for
    #[must_use]
    pub const fn tenant_id(&self) -> Uuid {
        self.tenant_id
    }

    /// Release the held slot; idempotent
    pub fn release(&self) {
        if !self.released.swap(true, Ordering::SeqCst) {
            self.counter.fetch_sub(1, Ordering::SeqCst);
            debug!(tenant_id = %self.tenant_id, "Released active-call token");
        }
    }
}

impl Drop for CallToken {
    fn drop(&mut self) {
        self.release();
    }
}

/// Bounded active-call admission gate per tenant
#[derive(Debug)]
pub struct ConcurrencyLimiter {
    max_concurrent: u32,
    active: DashMap<Uuid, Arc<AtomicU32>>,
}

impl ConcurrencyLimiter {
    /// Create a limiter admitting at most `max_concurrent` calls per tenant
    #[must_use]
    pub fn new(max_concurrent: u32) -> Self {
        Self {
            max_concurrent,
            active: DashMap::new(),
        }
    }

    /// Atomically reserve an active-call slot for `tenant_id`
    ///
    /// # Errors
    ///
    /// Returns [`AppError::concurrency_limit_exceeded`] when the tenant is
    /// already at the bound.
    pub fn admit(&self, tenant_id: Uuid) -> AppResult<CallToken> {
        let counter = self
            .active
            .entry(tenant_id)
            .or_insert_with(|| Arc::new(AtomicU32::new(0)))
            .clone();

        let max = self.max_concurrent;
        match counter.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
            if current < max {
                Some(current + 1)
            } else {
                None
            }
        }) {
            Ok(_) => Ok(CallToken {
                tenant_id,
                counter,
                released: AtomicBool::new(false),
            }),
            Err(current) => {
                warn!(
                    tenant_id = %tenant_id,
                    active = current,
                    limit = max,
                    "Concurrent call admission rejected"
                );
                Err(AppError::concurrency_limit_exceeded(current, max).with_tenant_id(tenant_id))
            }
        }
    }

    /// Current active-call count for a tenant
    #[must_use]
    pub fn active_count(&self, tenant_id: Uuid) -> u32 {
        self.active
            .get(&tenant_id)
            .map_or(0, |c| c.load(Ordering::SeqCst))
    }

    /// Total active calls across all tenants (for health reporting)
    #[must_use]
    pub fn total_active(&self) -> u32 {
        self.active
            .iter()
            .map(|entry| entry.value().load(Ordering::SeqCst))
            .sum()
    }
}

/// Rate limiting and concurrency admission composed for call initiation
#[derive(Debug)]
pub struct Governor {
    rate: RateLimiter,
    concurrency: ConcurrencyLimiter,
}

impl Governor {
    /// Build a governor from configuration
    #[must_use]
    pub fn new(rate_config: &RateLimitConfig, concurrency_config: &ConcurrencyConfig) -> Self {
        Self {
            rate: RateLimiter::new(rate_config.window_limit, rate_config.window),
            concurrency: ConcurrencyLimiter::new(concurrency_config.max_concurrent_calls),
        }
    }

    /// Admit one outbound call: rate window first, then an active-call slot
    ///
    /// # Errors
    ///
    /// Returns the rate-limit rejection before consuming a concurrency slot,
    /// so a rate-limited caller never holds a token.
    pub fn admit_call(&self, tenant_id: Uuid) -> AppResult<CallToken> {
        self.rate.check(tenant_id, resources::CALL_INITIATE)?;
        self.concurrency.admit(tenant_id)
    }

    /// Record one action against a non-call resource window
    ///
    /// # Errors
    ///
    /// Returns [`AppError::rate_limit_exceeded`] when the window is full.
    pub fn check_rate(&self, tenant_id: Uuid, resource: &str) -> AppResult<RateLimitStatus> {
        self.rate.check(tenant_id, resource)
    }

    /// Access the underlying rate limiter (sweeps, health)
    #[must_use]
    pub const fn rate(&self) -> &RateLimiter {
        &self.rate
    }

    /// Access the underlying concurrency limiter (counts, health)
    #[must_use]
    pub const fn concurrency(&self) -> &ConcurrencyLimiter {
        &self.concurrency
    }
}
