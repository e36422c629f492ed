// ABOUTME: Explicit per-request context threaded through the orchestration core
// ABOUTME: Carries request id and caller identity instead of ambient global state
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Request context passed explicitly into every core operation.
//!
//! The core never reads caller identity from ambient state; handlers build a
//! [`RequestContext`] from the authenticated request and pass it down. This
//! keeps the core testable without a simulated request pipeline.

use uuid::Uuid;

/// Identity and tracing context for one inbound command
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Correlation id for tracing; generated if the client did not send one
    pub request_id: String,
    /// Tenant on whose behalf the command executes
    pub tenant_id: Uuid,
    /// Authenticated user issuing the command
    pub user_id: Uuid,
}

impl RequestContext {
    /// Build a context from authenticated identity, generating a request id
    #[must_use]
    pub fn new(tenant_id: Uuid, user_id: Uuid) -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            tenant_id,
            user_id,
        }
    }

    /// Build a context preserving a client-supplied request id
    #[must_use]
    pub fn with_request_id(tenant_id: Uuid, user_id: Uuid, request_id: String) -> Self {
        Self {
            request_id,
            tenant_id,
            user_id,
        }
    }
}
