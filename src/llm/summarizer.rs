// ABOUTME: Post-call summarization through the cached LLM client
// ABOUTME: Builds a transcript prompt and publishes the summary over the signaling channel
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Post-call summarization.
//!
//! Runs as a background task when a call completes. The transcript's final
//! fragments become the prompt; the completion goes through the cached chat
//! client, so a redelivered terminal webhook re-uses the cached summary
//! instead of paying for a second completion.

use super::{CachedChatClient, ChatMessage, ChatRequest};
use crate::errors::AppResult;
use crate::events::EventBus;
use crate::models::Call;
use crate::storage::CallStorage;
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info};

const SUMMARY_SYSTEM_PROMPT: &str = "You summarize phone call transcripts between an AI agent \
and a caller. Produce a short factual summary: purpose of the call, key points discussed, \
and the outcome. Do not invent details absent from the transcript.";

/// Summarizes completed calls and publishes the result
#[derive(Clone)]
pub struct CallSummarizer {
    chat: Arc<CachedChatClient>,
    storage: Arc<dyn CallStorage>,
    events: EventBus,
}

impl CallSummarizer {
    /// Assemble a summarizer from injected collaborators
    #[must_use]
    pub fn new(chat: Arc<CachedChatClient>, storage: Arc<dyn CallStorage>, events: EventBus) -> Self {
        Self {
            chat,
            storage,
            events,
        }
    }

    /// Summarize a call's transcript and publish a `call.summary` event
    ///
    /// Returns `None` without invoking the LLM when the call has no final
    /// transcript fragments yet (the recording webhook may backfill later).
    ///
    /// # Errors
    ///
    /// Returns an error if the transcript cannot be read or the completion
    /// fails after retries.
    pub async fn summarize_call(&self, call: &Call) -> AppResult<Option<String>> {
        let fragments = self.storage.list_transcript_fragments(call.id).await?;
        let mut transcript = String::new();
        for fragment in fragments.iter().filter(|f| f.is_final) {
            let _ = writeln!(transcript, "[{}] {}", fragment.channel, fragment.text);
        }

        if transcript.is_empty() {
            debug!(call_id = %call.id, "Skipping summary: no final transcript fragments");
            return Ok(None);
        }

        let request = ChatRequest::new(vec![
            ChatMessage::system(SUMMARY_SYSTEM_PROMPT),
            ChatMessage::user(transcript),
        ]);
        let response = self.chat.complete(&request).await?;

        info!(call_id = %call.id, "Call summary ready");
        self.events.publish_summary(call, response.content.clone());
        Ok(Some(response.content))
    }
}
