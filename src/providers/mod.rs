// ABOUTME: Provider traits and shared types for telephony and speech-to-text access
// ABOUTME: Defines the seams behind which external provider SDKs are isolated
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! # Pluggable Provider Architecture
//!
//! External dependencies are reached only through the traits in this module.
//! Concrete clients are constructed once at bootstrap and injected via
//! [`crate::resources::ServerResources`]; no module-level singletons.
//!
//! Provider SDK callbacks never reach the core: a streaming speech session is
//! exposed as a bounded event queue ([`SpeechStream`]) consumed by the
//! transcription coordinator task, decoupling provider threading from the
//! core's concurrency model.

pub mod errors;
pub mod speech;
pub mod synthetic;
pub mod telephony;

pub use errors::ProviderError;

use crate::models::SpeakerChannel;
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Result alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;

/// Telephony provider: places and terminates calls, reports status via webhook
#[async_trait]
pub trait TelephonyProvider: Send + Sync {
    /// Short provider name for logging
    fn name(&self) -> &'static str;

    /// Place an outbound call and return the provider's call reference
    ///
    /// Status updates for the placed call are delivered asynchronously to
    /// `callback_url`.
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] classified as transient or fatal; the
    /// caller is expected to wrap this in the resilient executor.
    async fn place_call(&self, from: &str, to: &str, callback_url: &str) -> ProviderResult<String>;

    /// Terminate an active call on the provider side
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the provider rejects the termination.
    async fn terminate_call(&self, provider_ref: &str) -> ProviderResult<()>;
}

/// One event from a streaming speech session
#[derive(Debug)]
pub enum SpeechEvent {
    /// A transcript fragment, interim or final
    Fragment {
        /// Offset from media start in seconds
        start_offset_secs: f64,
        /// Which side of the call spoke
        channel: SpeakerChannel,
        /// Transcribed text
        text: String,
        /// Provider confidence in `[0.0, 1.0]`
        confidence: f32,
        /// Interim fragments may be superseded at the same offset
        is_final: bool,
    },
    /// The provider closed the session normally
    Closed,
    /// The provider session failed mid-stream
    Error(ProviderError),
}

/// A live streaming speech session exposed as a bounded event queue
///
/// Dropping the stream (or calling [`SpeechStream::close`]) signals the
/// provider task to tear the session down.
#[derive(Debug)]
pub struct SpeechStream {
    /// Provider session identifier
    pub session_id: String,
    /// Bounded queue of provider events, consumed by the coordinator
    pub events: mpsc::Receiver<SpeechEvent>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl SpeechStream {
    /// Assemble a stream from its parts; used by provider implementations
    #[must_use]
    pub fn new(
        session_id: String,
        events: mpsc::Receiver<SpeechEvent>,
        shutdown: oneshot::Sender<()>,
    ) -> Self {
        Self {
            session_id,
            events,
            shutdown: Some(shutdown),
        }
    }

    /// Explicitly close the provider session
    pub fn close(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            // Receiver may already be gone if the provider task exited first
            let _ = tx.send(());
        }
    }
}

impl Drop for SpeechStream {
    fn drop(&mut self) {
        self.close();
    }
}

/// One segment of a batch (post-call) transcription result
#[derive(Debug, Clone)]
pub struct BatchTranscriptSegment {
    /// Offset from recording start in seconds
    pub start_offset_secs: f64,
    /// Which side of the call spoke
    pub channel: SpeakerChannel,
    /// Transcribed text
    pub text: String,
    /// Provider confidence in `[0.0, 1.0]`
    pub confidence: f32,
}

/// Speech-to-text provider: streaming sessions plus batch transcription
#[async_trait]
pub trait SpeechProvider: Send + Sync {
    /// Short provider name for logging
    fn name(&self) -> &'static str;

    /// Open a streaming transcription session for a call's media
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the session cannot be established.
    async fn open_stream(&self, call_id: Uuid) -> ProviderResult<SpeechStream>;

    /// Transcribe a finished recording in one batch request
    ///
    /// # Errors
    ///
    /// Returns a [`ProviderError`] if the recording cannot be transcribed.
    async fn transcribe_recording(
        &self,
        recording_url: &str,
    ) -> ProviderResult<Vec<BatchTranscriptSegment>>;
}
