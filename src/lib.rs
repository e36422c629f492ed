// ABOUTME: Main library entry point for the Switchboard call orchestration platform
// ABOUTME: Wires call lifecycle, provider resilience, and real-time signaling modules
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

#![deny(unsafe_code)]

//! # Switchboard Call Server
//!
//! The call orchestration and resilience core of the Switchboard voice-agent
//! platform. Agents place and receive phone calls; speech is transcribed in
//! real time and summarized through a language model. This crate owns the
//! hard part of that pipeline: keeping call state consistent across
//! asynchronous provider events while bounding concurrency, rate limiting
//! tenants, and surviving partial failures of three independent external
//! dependencies (telephony, speech-to-text, language model).
//!
//! ## Architecture
//!
//! - **Executor**: retry-with-backoff wrapper around every outbound provider call
//! - **Governor**: per-tenant rate windows plus an active-call admission gate
//! - **Cache**: cache-aside layer in front of idempotent LLM completions
//! - **Calls**: the authoritative call lifecycle state machine
//! - **WebSocket**: authenticated real-time signaling channel to browser clients
//! - **Transcription**: one streaming speech-to-text coordinator per active call
//!
//! Provider clients are constructed explicitly at bootstrap and injected via
//! [`resources::ServerResources`]; nothing in this crate reaches for ambient
//! global state.

/// JWT validation for REST requests and the WebSocket handshake
pub mod auth;

/// Response cache abstraction with in-memory and Redis backends
pub mod cache;

/// Call lifecycle state machine and orchestration manager
pub mod calls;

/// Environment-based server configuration
pub mod config;

/// Application-wide default values and limits
pub mod constants;

/// Explicit per-request context threaded through the core
pub mod context;

/// Unified application error types and HTTP mapping
pub mod errors;

/// Signaling event bus connecting the core to connected clients
pub mod events;

/// Resilient executor wrapping outbound provider calls with retry/backoff
pub mod executor;

/// Rate limiting and concurrent-call admission control
pub mod governor;

/// Component health reporting
pub mod health;

/// Graceful startup and shutdown coordination
pub mod lifecycle;

/// Language-model provider abstraction and cached completion client
pub mod llm;

/// Structured logging configuration
pub mod logging;

/// Core domain models (calls, transcript fragments)
pub mod models;

/// Telephony and speech-to-text provider interfaces and implementations
pub mod providers;

/// Centralized dependency-injection container for shared resources
pub mod resources;

/// HTTP routes: command surface, provider webhooks, WebSocket upgrade
pub mod routes;

/// Durable storage collaborator interface
pub mod storage;

/// Streaming transcription coordinator
pub mod transcription;

/// Real-time signaling channel over WebSocket
pub mod websocket;
