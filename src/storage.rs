// ABOUTME: Durable storage collaborator interface for calls and transcripts
// ABOUTME: Trait seam over the relational store plus an in-memory implementation
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Storage collaborator interface.
//!
//! The relational store lives outside this core; the state machine and the
//! transcription coordinator reach it only through [`CallStorage`]. No schema
//! is assumed. The in-memory implementation backs tests and single-process
//! deployments.

use crate::errors::{AppError, AppResult};
use crate::models::{Call, TranscriptFragment};
use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;
use uuid::Uuid;

/// Persistence operations this core requires from the storage collaborator
#[async_trait]
pub trait CallStorage: Send + Sync {
    /// Persist a newly admitted call record
    ///
    /// # Errors
    ///
    /// Returns an error if a call with the same id already exists or the
    /// write fails.
    async fn create_call(&self, call: &Call) -> AppResult<()>;

    /// Persist an accepted state transition (status, timestamps, references)
    ///
    /// # Errors
    ///
    /// Returns an error if the call is unknown or the write fails.
    async fn update_call_status(&self, call: &Call) -> AppResult<()>;

    /// Append one transcript fragment, replacing an interim fragment at the
    /// same offset and channel
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    async fn append_transcript_fragment(&self, fragment: &TranscriptFragment) -> AppResult<()>;

    /// Fetch a call by id
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn find_call(&self, id: Uuid) -> AppResult<Option<Call>>;

    /// Fetch the transcript of a call in offset order
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    async fn list_transcript_fragments(&self, call_id: Uuid) -> AppResult<Vec<TranscriptFragment>>;
}

/// In-memory storage for tests and single-process deployments
#[derive(Debug, Default)]
pub struct InMemoryCallStorage {
    calls: DashMap<Uuid, Call>,
    transcripts: DashMap<Uuid, Vec<TranscriptFragment>>,
}

impl InMemoryCallStorage {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored calls (for health reporting)
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.len()
    }
}

#[async_trait]
impl CallStorage for InMemoryCallStorage {
    async fn create_call(&self, call: &Call) -> AppResult<()> {
        if self.calls.contains_key(&call.id) {
            return Err(AppError::invalid_state(format!(
                "call {} already exists",
                call.id
            )));
        }
        self.calls.insert(call.id, call.clone());
        Ok(())
    }

    async fn update_call_status(&self, call: &Call) -> AppResult<()> {
        match self.calls.get_mut(&call.id) {
            Some(mut stored) => {
                *stored = call.clone();
                Ok(())
            }
            None => Err(AppError::not_found(format!("call {}", call.id))),
        }
    }

    async fn append_transcript_fragment(&self, fragment: &TranscriptFragment) -> AppResult<()> {
        let mut fragments = self.transcripts.entry(fragment.call_id).or_default();

        // Replace-by-offset: an interim fragment at the same offset and
        // channel is superseded; a final fragment never changes.
        let existing = fragments.iter().position(|f| {
            (f.start_offset_secs - fragment.start_offset_secs).abs() < f64::EPSILON
                && f.channel == fragment.channel
        });

        match existing {
            Some(index) => {
                if fragments[index].is_final {
                    warn!(
                        call_id = %fragment.call_id,
                        offset = fragment.start_offset_secs,
                        "Ignoring fragment targeting an already-final offset"
                    );
                } else {
                    fragments[index] = fragment.clone();
                }
            }
            None => {
                // Keep fragments ordered by start offset
                let position = fragments
                    .iter()
                    .position(|f| f.start_offset_secs > fragment.start_offset_secs)
                    .unwrap_or(fragments.len());
                fragments.insert(position, fragment.clone());
            }
        }
        Ok(())
    }

    async fn find_call(&self, id: Uuid) -> AppResult<Option<Call>> {
        Ok(self.calls.get(&id).map(|c| c.clone()))
    }

    async fn list_transcript_fragments(&self, call_id: Uuid) -> AppResult<Vec<TranscriptFragment>> {
        Ok(self
            .transcripts
            .get(&call_id)
            .map(|f| f.clone())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SpeakerChannel;

    fn fragment(call_id: Uuid, offset: f64, text: &str, is_final: bool) -> TranscriptFragment {
        TranscriptFragment {
            call_id,
            start_offset_secs: offset,
            channel: SpeakerChannel::Caller,
            text: text.into(),
            confidence: 0.9,
            is_final,
        }
    }

    #[tokio::test]
    async fn test_interim_fragment_replaced_by_final() {
        let storage = InMemoryCallStorage::new();
        let call_id = Uuid::new_v4();

        storage
            .append_transcript_fragment(&fragment(call_id, 1.0, "hel", false))
            .await
            .unwrap();
        storage
            .append_transcript_fragment(&fragment(call_id, 1.0, "hello", true))
            .await
            .unwrap();

        let fragments = storage.list_transcript_fragments(call_id).await.unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "hello");
        assert!(fragments[0].is_final);
    }

    #[tokio::test]
    async fn test_final_fragment_is_immutable() {
        let storage = InMemoryCallStorage::new();
        let call_id = Uuid::new_v4();

        storage
            .append_transcript_fragment(&fragment(call_id, 2.0, "done", true))
            .await
            .unwrap();
        storage
            .append_transcript_fragment(&fragment(call_id, 2.0, "overwrite", false))
            .await
            .unwrap();

        let fragments = storage.list_transcript_fragments(call_id).await.unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "done");
    }

    #[tokio::test]
    async fn test_fragments_kept_in_offset_order() {
        let storage = InMemoryCallStorage::new();
        let call_id = Uuid::new_v4();

        storage
            .append_transcript_fragment(&fragment(call_id, 3.0, "c", true))
            .await
            .unwrap();
        storage
            .append_transcript_fragment(&fragment(call_id, 1.0, "a", true))
            .await
            .unwrap();
        storage
            .append_transcript_fragment(&fragment(call_id, 2.0, "b", true))
            .await
            .unwrap();

        let texts: Vec<_> = storage
            .list_transcript_fragments(call_id)
            .await
            .unwrap()
            .into_iter()
            .map(|f| f.text)
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }
}
