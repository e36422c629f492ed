// ABOUTME: Call orchestration manager driving admission, placement, webhooks, and teardown
// ABOUTME: The only writer of call state; enforces transition legality and token release
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! # Call Manager
//!
//! Owns every mutation of call state. Initiation runs synchronously:
//! admission (governor) -> storage create -> provider placement through the
//! resilient executor. Webhooks and end commands mutate state only through
//! [`CallManager::apply_transition`], which persists the accepted status,
//! releases the concurrency token on terminal states, and emits a
//! `call.update` signaling event.
//!
//! Webhooks for one call are serialized through a per-call async lock so a
//! read-modify-write never races a concurrent delivery; initiation finalizes
//! its bookkeeping (token, reference index, persisted snapshot) under the
//! same lock. Provider awaits (placement, termination) happen outside any
//! lock.

use super::transitions::is_valid_transition;
use crate::context::RequestContext;
use crate::errors::{AppError, AppResult};
use crate::events::EventBus;
use crate::executor::CallExecutor;
use crate::governor::{CallToken, Governor};
use crate::llm::CallSummarizer;
use crate::models::{Call, CallStatus};
use crate::providers::TelephonyProvider;
use crate::storage::CallStorage;
use crate::transcription::TranscriptionService;
use chrono::Utc;
use dashmap::DashMap;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Command payload for initiating an outbound call
#[derive(Debug, Clone, Deserialize)]
pub struct InitiateCallRequest {
    /// Agent that will handle the call
    pub agent_id: Uuid,
    /// Caller id presented to the destination (E.164)
    pub from_number: String,
    /// Destination number (E.164)
    pub to_number: String,
}

/// Orchestrates the lifecycle of every call
pub struct CallManager {
    storage: Arc<dyn CallStorage>,
    governor: Arc<Governor>,
    executor: Arc<CallExecutor>,
    telephony: Arc<dyn TelephonyProvider>,
    transcription: Arc<TranscriptionService>,
    summarizer: Arc<CallSummarizer>,
    events: EventBus,
    /// Concurrency tokens held by non-terminal calls
    tokens: DashMap<Uuid, CallToken>,
    /// Provider call reference -> internal call id, for webhook resolution
    provider_refs: DashMap<String, Uuid>,
    /// Per-call locks serializing webhook/end-command processing
    call_locks: DashMap<Uuid, Arc<Mutex<()>>>,
    /// Calls whose summary has been produced or is in flight
    summarized: Arc<DashMap<Uuid, ()>>,
    callback_base_url: String,
}

impl CallManager {
    /// Assemble the manager from injected collaborators
    #[allow(clippy::too_many_arguments)]
    #[must_use]
    pub fn new(
        storage: Arc<dyn CallStorage>,
        governor: Arc<Governor>,
        executor: Arc<CallExecutor>,
        telephony: Arc<dyn TelephonyProvider>,
        transcription: Arc<TranscriptionService>,
        summarizer: Arc<CallSummarizer>,
        events: EventBus,
        callback_base_url: String,
    ) -> Self {
        Self {
            storage,
            governor,
            executor,
            telephony,
            transcription,
            summarizer,
            events,
            tokens: DashMap::new(),
            provider_refs: DashMap::new(),
            call_locks: DashMap::new(),
            summarized: Arc::new(DashMap::new()),
            callback_base_url: callback_base_url.trim_end_matches('/').to_owned(),
        }
    }

    /// Initiate an outbound call: admit, persist, place with the provider
    ///
    /// # Errors
    ///
    /// Returns a specific rejection reason: rate-limited or over the
    /// concurrency cap (admission), invalid destination (validation), or the
    /// provider's classified failure after the retry budget. A placement
    /// failure leaves the call persisted as `failed` with its token released.
    pub async fn initiate_call(
        &self,
        ctx: &RequestContext,
        request: &InitiateCallRequest,
    ) -> AppResult<Call> {
        validate_number("from_number", &request.from_number)?;
        validate_number("to_number", &request.to_number)?;

        // Admission: rate window first, then an active-call token. Bookkeeping
        // is synchronous; the token is held for the life of the call.
        let token = self.governor.admit_call(ctx.tenant_id)?;

        let mut call = Call::new_outbound(
            ctx.tenant_id,
            ctx.user_id,
            request.agent_id,
            request.from_number.clone(),
            request.to_number.clone(),
        );
        self.storage.create_call(&call).await?;

        info!(
            call_id = %call.id,
            tenant_id = %ctx.tenant_id,
            request_id = %ctx.request_id,
            to = %call.to_number,
            "Call admitted, placing with provider"
        );

        let callback_url = format!("{}/webhooks/telephony/status", self.callback_base_url);
        let telephony = self.telephony.clone();
        let placement = self
            .executor
            .execute("telephony.place_call", || {
                let telephony = telephony.clone();
                let from = call.from_number.clone();
                let to = call.to_number.clone();
                let callback = callback_url.clone();
                async move { telephony.place_call(&from, &to, &callback).await }
            })
            .await;

        match placement {
            Ok(provider_ref) => {
                // Finalize admission under the call lock. The token and the
                // reference index go in together before the call becomes
                // resolvable, so a terminal webhook racing this branch blocks
                // on the lock and then finds the token it must release -
                // admission can never leak a slot to a fast webhook.
                let lock = self.lock_for(call.id);
                let _guard = lock.lock().await;

                self.tokens.insert(call.id, token);
                self.provider_refs.insert(provider_ref.clone(), call.id);
                call.provider_ref = Some(provider_ref);
                self.storage.update_call_status(&call).await?;
                self.events.publish_call_update(&call);
                Ok(call)
            }
            Err(provider_error) => {
                // No webhook will arrive for a failed placement: terminalize
                // immediately and let the token drop release the slot.
                call.status = CallStatus::Failed;
                call.ended_at = Some(Utc::now());
                self.storage.update_call_status(&call).await?;
                self.events.publish_call_update(&call);
                drop(token);
                warn!(
                    call_id = %call.id,
                    error = %provider_error,
                    "Provider rejected call placement"
                );
                Err(AppError::from(provider_error).with_resource_id(call.id.to_string()))
            }
        }
    }

    /// Fetch the current snapshot of a call owned by the caller's tenant
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for unknown calls and for calls belonging
    /// to other tenants.
    pub async fn get_call(&self, ctx: &RequestContext, call_id: Uuid) -> AppResult<Call> {
        let call = self
            .storage
            .find_call(call_id)
            .await?
            .filter(|c| c.tenant_id == ctx.tenant_id)
            .ok_or_else(|| AppError::not_found(format!("call {call_id}")))?;
        Ok(call)
    }

    /// End a call on user command
    ///
    /// Permitted only from `ringing` or `in_progress`; drives the call to
    /// `completed` and terminates it provider-side through the executor. A
    /// duplicate end on an already-terminal call is a no-op returning the
    /// current snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ResourceNotFound` for unknown calls and `InvalidState` when
    /// the call has not left `initiated` yet.
    pub async fn end_call(&self, ctx: &RequestContext, call_id: Uuid) -> AppResult<Call> {
        let call = self.get_call(ctx, call_id).await?;

        if call.status.is_terminal() {
            debug!(call_id = %call_id, "End command on terminal call is a no-op");
            return Ok(call);
        }
        if !matches!(call.status, CallStatus::Ringing | CallStatus::InProgress) {
            return Err(AppError::invalid_state(format!(
                "call {call_id} cannot be ended from status {}",
                call.status
            )));
        }

        // Terminate provider-side before taking the per-call lock: the
        // provider await must not serialize webhook processing.
        if let Some(provider_ref) = call.provider_ref.clone() {
            let telephony = self.telephony.clone();
            let termination = self
                .executor
                .execute("telephony.terminate_call", || {
                    let telephony = telephony.clone();
                    let provider_ref = provider_ref.clone();
                    async move { telephony.terminate_call(&provider_ref).await }
                })
                .await;
            if let Err(e) = termination {
                // The call still completes locally; the provider's own
                // terminal webhook would be a no-op against our state.
                warn!(call_id = %call_id, error = %e, "Provider-side termination failed");
            }
        }

        let lock = self.lock_for(call_id);
        let _guard = lock.lock().await;

        let current = self
            .storage
            .find_call(call_id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("call {call_id}")))?;
        if current.status.is_terminal() {
            return Ok(current);
        }

        info!(call_id = %call_id, request_id = %ctx.request_id, "Ending call on user command");
        self.apply_transition(current, CallStatus::Completed, None)
            .await
    }

    /// Process a provider status webhook
    ///
    /// Idempotent: unknown references, duplicates, and out-of-order statuses
    /// are logged no-ops, never errors - the provider cannot act on an error
    /// response.
    ///
    /// # Errors
    ///
    /// Returns an error only when persisting an accepted transition fails.
    pub async fn handle_status_webhook(
        &self,
        provider_ref: &str,
        reported: CallStatus,
        duration_secs: Option<u32>,
    ) -> AppResult<()> {
        let Some(call_id) = self.provider_refs.get(provider_ref).map(|e| *e.value()) else {
            warn!(provider_ref = %provider_ref, "Status webhook for unknown call reference");
            return Ok(());
        };

        let lock = self.lock_for(call_id);
        let _guard = lock.lock().await;

        let Some(call) = self.storage.find_call(call_id).await? else {
            warn!(call_id = %call_id, "Status webhook for missing call record");
            return Ok(());
        };

        if !is_valid_transition(call.status, reported) {
            debug!(
                call_id = %call_id,
                current = %call.status,
                reported = %reported,
                "Ignoring duplicate or out-of-order status webhook"
            );
            return Ok(());
        }

        self.apply_transition(call, reported, duration_secs).await?;
        Ok(())
    }

    /// Process a recording-ready webhook
    ///
    /// Stores the recording URL and, when the live stream produced no final
    /// transcript, backfills the transcript from the recording in the
    /// background (followed by summarization for completed calls).
    ///
    /// # Errors
    ///
    /// Returns an error only when persisting the recording reference fails.
    pub async fn handle_recording_webhook(
        &self,
        provider_ref: &str,
        recording_url: &str,
    ) -> AppResult<()> {
        let Some(call_id) = self.provider_refs.get(provider_ref).map(|e| *e.value()) else {
            warn!(provider_ref = %provider_ref, "Recording webhook for unknown call reference");
            return Ok(());
        };

        let lock = self.lock_for(call_id);
        let _guard = lock.lock().await;

        let Some(mut call) = self.storage.find_call(call_id).await? else {
            warn!(call_id = %call_id, "Recording webhook for missing call record");
            return Ok(());
        };

        if call.recording_url.as_deref() == Some(recording_url) {
            debug!(call_id = %call_id, "Duplicate recording webhook");
            return Ok(());
        }

        call.recording_url = Some(recording_url.to_owned());
        self.storage.update_call_status(&call).await?;
        self.events.publish_call_update(&call);

        let finals = self
            .storage
            .list_transcript_fragments(call_id)
            .await?
            .iter()
            .filter(|f| f.is_final)
            .count();
        if finals == 0 {
            let transcription = self.transcription.clone();
            let summarizer = self.summarizer.clone();
            let summarized = self.summarized.clone();
            let call_for_task = call.clone();
            tokio::spawn(async move {
                match transcription.backfill_from_recording(&call_for_task).await {
                    Ok(count) if count > 0 && call_for_task.status == CallStatus::Completed => {
                        summarize_once(&summarizer, &summarized, &call_for_task).await;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(call_id = %call_for_task.id, error = %e, "Recording backfill failed");
                    }
                }
            });
        }
        Ok(())
    }

    /// Process a transcription-complete webhook for an async batch job
    ///
    /// Segments are appended as final fragments; replace-by-offset makes a
    /// redelivered webhook converge on the same transcript.
    ///
    /// # Errors
    ///
    /// Returns an error only when persisting fragments fails.
    pub async fn handle_transcription_complete(
        &self,
        provider_ref: &str,
        segments: Vec<crate::providers::BatchTranscriptSegment>,
    ) -> AppResult<()> {
        let Some(call_id) = self.provider_refs.get(provider_ref).map(|e| *e.value()) else {
            warn!(provider_ref = %provider_ref, "Transcription webhook for unknown call reference");
            return Ok(());
        };

        let Some(call) = self.storage.find_call(call_id).await? else {
            warn!(call_id = %call_id, "Transcription webhook for missing call record");
            return Ok(());
        };

        for segment in segments {
            let fragment = crate::models::TranscriptFragment {
                call_id,
                start_offset_secs: segment.start_offset_secs,
                channel: segment.channel,
                text: segment.text,
                confidence: segment.confidence,
                is_final: true,
            };
            self.storage.append_transcript_fragment(&fragment).await?;
            self.events.publish_fragment(&call, fragment);
        }

        if call.status == CallStatus::Completed {
            summarize_once(&self.summarizer, &self.summarized, &call).await;
        }
        Ok(())
    }

    /// Number of concurrency tokens currently held (for health reporting)
    #[must_use]
    pub fn held_tokens(&self) -> usize {
        self.tokens.len()
    }

    fn lock_for(&self, call_id: Uuid) -> Arc<Mutex<()>> {
        self.call_locks.entry(call_id).or_default().clone()
    }

    /// Apply an accepted transition: timestamps, persistence, side effects
    ///
    /// Callers must hold the call's lock (or be the only reachable writer,
    /// as during initiation).
    async fn apply_transition(
        &self,
        mut call: Call,
        new_status: CallStatus,
        duration_secs: Option<u32>,
    ) -> AppResult<Call> {
        let now = Utc::now();
        let previous = call.status;
        call.status = new_status;

        if new_status == CallStatus::InProgress && call.answered_at.is_none() {
            call.answered_at = Some(now);
        }
        if new_status.is_terminal() {
            call.ended_at = Some(now);
            call.duration_secs = duration_secs.or_else(|| {
                call.answered_at.and_then(|answered| {
                    u32::try_from((now - answered).num_seconds().max(0)).ok()
                })
            });
        }

        // Media starts when the call is answered: attach the transcription
        // coordinator under the call lock so a racing terminal webhook
        // cannot observe a half-started stream.
        if new_status == CallStatus::InProgress {
            match self.transcription.start(&call).await {
                Ok(session_id) => call.stream_session_id = Some(session_id),
                Err(e) => {
                    warn!(call_id = %call.id, error = %e, "Transcription start failed");
                    self.events.publish_degraded(&call, "live transcription unavailable");
                }
            }
        }

        self.storage.update_call_status(&call).await?;

        if new_status.is_terminal() {
            self.transcription.stop(call.id);
            if let Some((_, token)) = self.tokens.remove(&call.id) {
                token.release();
            }
            if new_status == CallStatus::Completed {
                let summarizer = self.summarizer.clone();
                let summarized = self.summarized.clone();
                let call_for_task = call.clone();
                tokio::spawn(async move {
                    summarize_once(&summarizer, &summarized, &call_for_task).await;
                });
            }
        }

        info!(
            call_id = %call.id,
            from = %previous,
            to = %new_status,
            "Call transitioned"
        );
        self.events.publish_call_update(&call);
        Ok(call)
    }
}

/// Run the summarizer at most once per call
///
/// The guard entry is dropped again when there was nothing to summarize, so
/// a later transcript backfill can retry.
async fn summarize_once(
    summarizer: &CallSummarizer,
    summarized: &DashMap<Uuid, ()>,
    call: &Call,
) {
    if summarized.insert(call.id, ()).is_some() {
        return;
    }
    match summarizer.summarize_call(call).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            summarized.remove(&call.id);
        }
        Err(e) => {
            warn!(call_id = %call.id, error = %e, "Call summarization failed");
            summarized.remove(&call.id);
        }
    }
}

fn validate_number(field: &str, number: &str) -> AppResult<()> {
    let valid = number.starts_with('+')
        && number.len() >= 8
        && number.len() <= 16
        && number[1..].chars().all(|c| c.is_ascii_digit());
    if valid {
        Ok(())
    } else {
        Err(AppError::invalid_input(format!(
            "{field} must be an E.164 number like +15550100"
        )))
    }
}
