// ABOUTME: Streaming transcription coordinator managing one speech session per active call
// ABOUTME: Persists fragments, republishes them, and survives one provider reconnect
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! # Streaming Transcription Coordinator
//!
//! One coordinator task per call with a live media stream. The task consumes
//! the provider's bounded event queue, persists each fragment through
//! storage (interim fragments overwrite-by-offset, final fragments are
//! immutable), and republishes it on the signaling channel tagged with the
//! call id. A provider-side stream error triggers at most one reconnect
//! attempt through the resilient executor before a `transcript.degraded`
//! event is published - the call itself is never ended by a transcription
//! failure.

use crate::errors::{AppError, AppResult};
use crate::events::EventBus;
use crate::executor::CallExecutor;
use crate::models::{Call, TranscriptFragment};
use crate::providers::{SpeechEvent, SpeechProvider, SpeechStream};
use crate::storage::CallStorage;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

struct CoordinatorHandle {
    session_id: String,
    shutdown: mpsc::Sender<()>,
}

/// Manages streaming transcription coordinators, one per active call
pub struct TranscriptionService {
    speech: Arc<dyn SpeechProvider>,
    storage: Arc<dyn CallStorage>,
    events: EventBus,
    executor: Arc<CallExecutor>,
    active: Arc<DashMap<Uuid, CoordinatorHandle>>,
}

impl TranscriptionService {
    /// Assemble the service from injected collaborators
    #[must_use]
    pub fn new(
        speech: Arc<dyn SpeechProvider>,
        storage: Arc<dyn CallStorage>,
        events: EventBus,
        executor: Arc<CallExecutor>,
    ) -> Self {
        Self {
            speech,
            storage,
            events,
            executor,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Open a streaming session for a call and spawn its coordinator
    ///
    /// Idempotent per call: a second start while a coordinator is live
    /// returns the existing session id.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider session cannot be opened within the
    /// executor's retry budget.
    pub async fn start(&self, call: &Call) -> AppResult<String> {
        if let Some(handle) = self.active.get(&call.id) {
            debug!(call_id = %call.id, "Transcription coordinator already running");
            return Ok(handle.session_id.clone());
        }

        let speech = self.speech.clone();
        let call_id = call.id;
        let stream = self
            .executor
            .execute("speech.open_stream", || {
                let speech = speech.clone();
                async move { speech.open_stream(call_id).await }
            })
            .await
            .map_err(AppError::from)?;

        let session_id = stream.session_id.clone();
        let (shutdown_tx, shutdown_rx) = mpsc::channel(1);

        // Register the handle before spawning: a fast-draining stream must
        // find its own entry to remove on exit.
        self.active.insert(
            call.id,
            CoordinatorHandle {
                session_id: session_id.clone(),
                shutdown: shutdown_tx,
            },
        );

        tokio::spawn(run_coordinator(
            call.clone(),
            stream,
            shutdown_rx,
            self.speech.clone(),
            self.storage.clone(),
            self.events.clone(),
            self.executor.clone(),
            self.active.clone(),
        ));

        info!(call_id = %call.id, session_id = %session_id, "Transcription coordinator started");
        Ok(session_id)
    }

    /// Stop the coordinator for a call, closing its provider session
    ///
    /// A stop for a call without a live coordinator is a no-op.
    pub fn stop(&self, call_id: Uuid) {
        if let Some((_, handle)) = self.active.remove(&call_id) {
            // Coordinator may have exited on its own; a closed channel is fine
            let _ = handle.shutdown.try_send(());
            debug!(call_id = %call_id, "Transcription coordinator stop requested");
        }
    }

    /// Number of live coordinators (for health reporting)
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Transcribe a finished recording and persist its segments as final fragments
    ///
    /// Used when the live stream produced no transcript (e.g. degraded
    /// mid-call) and the provider delivered a recording afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the call has no recording or the batch request
    /// fails within the executor's retry budget.
    pub async fn backfill_from_recording(&self, call: &Call) -> AppResult<usize> {
        let recording_url = call
            .recording_url
            .clone()
            .ok_or_else(|| AppError::invalid_state("call has no recording to transcribe"))?;

        let speech = self.speech.clone();
        let segments = self
            .executor
            .execute("speech.transcribe_recording", || {
                let speech = speech.clone();
                let url = recording_url.clone();
                async move { speech.transcribe_recording(&url).await }
            })
            .await
            .map_err(AppError::from)?;

        let count = segments.len();
        for segment in segments {
            let fragment = TranscriptFragment {
                call_id: call.id,
                start_offset_secs: segment.start_offset_secs,
                channel: segment.channel,
                text: segment.text,
                confidence: segment.confidence,
                is_final: true,
            };
            self.storage.append_transcript_fragment(&fragment).await?;
            self.events.publish_fragment(call, fragment);
        }

        info!(call_id = %call.id, segments = count, "Backfilled transcript from recording");
        Ok(count)
    }
}

/// Per-call coordinator loop: consume provider events until the stream ends
#[allow(clippy::too_many_arguments)]
async fn run_coordinator(
    call: Call,
    mut stream: SpeechStream,
    mut shutdown_rx: mpsc::Receiver<()>,
    speech: Arc<dyn SpeechProvider>,
    storage: Arc<dyn CallStorage>,
    events: EventBus,
    executor: Arc<CallExecutor>,
    active: Arc<DashMap<Uuid, CoordinatorHandle>>,
) {
    let mut reconnected = false;

    loop {
        tokio::select! {
            _ = shutdown_rx.recv() => {
                debug!(call_id = %call.id, "Transcription coordinator shutting down");
                break;
            }
            event = stream.events.recv() => match event {
                Some(SpeechEvent::Fragment {
                    start_offset_secs,
                    channel,
                    text,
                    confidence,
                    is_final,
                }) => {
                    let fragment = TranscriptFragment {
                        call_id: call.id,
                        start_offset_secs,
                        channel,
                        text,
                        confidence,
                        is_final,
                    };
                    if let Err(e) = storage.append_transcript_fragment(&fragment).await {
                        error!(call_id = %call.id, error = %e, "Failed to persist transcript fragment");
                    }
                    events.publish_fragment(&call, fragment);
                }
                Some(SpeechEvent::Closed) | None => {
                    debug!(call_id = %call.id, "Speech stream closed");
                    break;
                }
                Some(SpeechEvent::Error(e)) => {
                    warn!(call_id = %call.id, error = %e, "Speech stream error");
                    if reconnected {
                        events.publish_degraded(&call, "live transcription lost after reconnect");
                        break;
                    }
                    reconnected = true;

                    let call_id = call.id;
                    let speech_for_retry = speech.clone();
                    match executor
                        .execute("speech.reopen_stream", || {
                            let speech = speech_for_retry.clone();
                            async move { speech.open_stream(call_id).await }
                        })
                        .await
                    {
                        Ok(new_stream) => {
                            info!(
                                call_id = %call.id,
                                session_id = %new_stream.session_id,
                                "Speech stream reconnected"
                            );
                            stream.close();
                            stream = new_stream;
                        }
                        Err(reopen_error) => {
                            warn!(
                                call_id = %call.id,
                                error = %reopen_error,
                                "Speech stream reconnect failed"
                            );
                            events.publish_degraded(&call, "live transcription unavailable");
                            break;
                        }
                    }
                }
            }
        }
    }

    stream.close();
    active.remove(&call.id);
}
