// ABOUTME: In-process synthetic telephony and speech providers
// ABOUTME: Deterministic provider doubles for tests and local development
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Synthetic providers.
//!
//! These implementations satisfy the provider traits without any network
//! access. Failures can be scripted per call site, which is how the
//! integration tests drive retry, admission-release, and degraded-stream
//! paths deterministically.

use super::errors::ProviderError;
use super::{
    BatchTranscriptSegment, ProviderResult, SpeechEvent, SpeechProvider, SpeechStream,
    TelephonyProvider,
};
use crate::constants::transcription::EVENT_QUEUE_DEPTH;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

/// Synthetic telephony provider that accepts every call by default
///
/// Queue errors with [`SyntheticTelephonyProvider::fail_next`] to script
/// placement failures; each queued error is consumed by one `place_call`.
#[derive(Debug, Default)]
pub struct SyntheticTelephonyProvider {
    scripted_failures: Mutex<VecDeque<ProviderError>>,
    placed: Mutex<Vec<String>>,
    terminated: Mutex<Vec<String>>,
}

impl SyntheticTelephonyProvider {
    /// Create a provider that accepts every request
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an error to be returned by the next `place_call`
    pub fn fail_next(&self, error: ProviderError) {
        self.scripted_failures.lock().unwrap().push_back(error);
    }

    /// Provider references of calls placed so far
    #[must_use]
    pub fn placed_calls(&self) -> Vec<String> {
        self.placed.lock().unwrap().clone()
    }

    /// Provider references terminated so far
    #[must_use]
    pub fn terminated_calls(&self) -> Vec<String> {
        self.terminated.lock().unwrap().clone()
    }
}

#[async_trait]
impl TelephonyProvider for SyntheticTelephonyProvider {
    fn name(&self) -> &'static str {
        "synthetic-telephony"
    }

    async fn place_call(
        &self,
        _from: &str,
        _to: &str,
        _callback_url: &str,
    ) -> ProviderResult<String> {
        if let Some(error) = self.scripted_failures.lock().unwrap().pop_front() {
            return Err(error);
        }
        let provider_ref = format!("SYN-{}", Uuid::new_v4());
        self.placed.lock().unwrap().push(provider_ref.clone());
        Ok(provider_ref)
    }

    async fn terminate_call(&self, provider_ref: &str) -> ProviderResult<()> {
        self.terminated.lock().unwrap().push(provider_ref.to_owned());
        Ok(())
    }
}

/// One scripted streaming session for the synthetic speech provider
#[derive(Debug)]
pub enum SyntheticSession {
    /// Play these events, then close the session
    Script(Vec<SpeechEvent>),
    /// Play these events, then hold the session open until shutdown
    Open(Vec<SpeechEvent>),
    /// Refuse to open the session
    Fail(ProviderError),
}

/// Synthetic speech provider playing scripted sessions
///
/// Sessions are consumed in the order queued by
/// [`SyntheticSpeechProvider::push_session`]; with no queued session,
/// `open_stream` yields an immediately closed stream.
#[derive(Debug, Default)]
pub struct SyntheticSpeechProvider {
    sessions: Mutex<VecDeque<SyntheticSession>>,
    batch_segments: Mutex<Vec<BatchTranscriptSegment>>,
}

impl SyntheticSpeechProvider {
    /// Create a provider with no scripted sessions
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a session to be returned by the next `open_stream`
    pub fn push_session(&self, session: SyntheticSession) {
        self.sessions.lock().unwrap().push_back(session);
    }

    /// Set the segments returned by `transcribe_recording`
    pub fn set_batch_segments(&self, segments: Vec<BatchTranscriptSegment>) {
        *self.batch_segments.lock().unwrap() = segments;
    }
}

#[async_trait]
impl SpeechProvider for SyntheticSpeechProvider {
    fn name(&self) -> &'static str {
        "synthetic-speech"
    }

    async fn open_stream(&self, _call_id: Uuid) -> ProviderResult<SpeechStream> {
        let session = self
            .sessions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SyntheticSession::Script(Vec::new()));

        let (script, stay_open) = match session {
            SyntheticSession::Fail(error) => return Err(error),
            SyntheticSession::Script(script) => (script, false),
            SyntheticSession::Open(script) => (script, true),
        };

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();
        let session_id = format!("syn-stream-{}", Uuid::new_v4());

        tokio::spawn(async move {
            for event in script {
                let explicit_end = matches!(event, SpeechEvent::Closed | SpeechEvent::Error(_));
                tokio::select! {
                    _ = &mut shutdown_rx => return,
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
                if explicit_end {
                    return;
                }
            }
            if stay_open {
                // Hold the session until the consumer closes it
                let _ = shutdown_rx.await;
            } else {
                let _ = tx.send(SpeechEvent::Closed).await;
            }
        });

        Ok(SpeechStream::new(session_id, rx, shutdown_tx))
    }

    async fn transcribe_recording(
        &self,
        _recording_url: &str,
    ) -> ProviderResult<Vec<BatchTranscriptSegment>> {
        Ok(self.batch_segments.lock().unwrap().clone())
    }
}
