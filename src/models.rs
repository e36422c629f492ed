// ABOUTME: Core domain models for calls and transcript fragments
// ABOUTME: Shared data structures mutated only through the call lifecycle state machine
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Domain models shared across the orchestration core.
//!
//! `Call` and `TranscriptFragment` are durable records owned by the storage
//! collaborator; everything else here is wire shape. Call state is mutated
//! exclusively by [`crate::calls::CallManager`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Direction of a telephony call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallDirection {
    /// Call placed by an agent to an external number
    Outbound,
    /// Call received from an external number
    Inbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Outbound => write!(f, "outbound"),
            Self::Inbound => write!(f, "inbound"),
        }
    }
}

/// Lifecycle status of a call
///
/// The happy path is `Initiated -> Ringing -> InProgress -> Completed`.
/// `Failed`, `NoAnswer`, `Busy`, and `Canceled` are alternative terminal
/// states reachable before the call is answered. Transition legality is
/// enforced by [`crate::calls::transitions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallStatus {
    /// Call record created; provider request in flight or accepted
    Initiated,
    /// Provider reports the destination is ringing
    Ringing,
    /// Call answered; media flowing
    InProgress,
    /// Call ended normally
    Completed,
    /// Provider rejected or dropped the call
    Failed,
    /// Destination did not answer
    NoAnswer,
    /// Destination was busy
    Busy,
    /// Call canceled before being answered
    Canceled,
}

impl CallStatus {
    /// Whether this status admits no further transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Completed | Self::Failed | Self::NoAnswer | Self::Busy | Self::Canceled
        )
    }
}

impl fmt::Display for CallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Initiated => "initiated",
            Self::Ringing => "ringing",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::NoAnswer => "no_answer",
            Self::Busy => "busy",
            Self::Canceled => "canceled",
        };
        write!(f, "{s}")
    }
}

/// One telephony session managed end-to-end by this core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Call {
    /// Internally generated identifier
    pub id: Uuid,
    /// Provider-assigned call reference; set at most once, never changed
    pub provider_ref: Option<String>,
    /// Call direction
    pub direction: CallDirection,
    /// Originating number (E.164)
    pub from_number: String,
    /// Destination number (E.164)
    pub to_number: String,
    /// Owning tenant
    pub tenant_id: Uuid,
    /// Initiating user
    pub user_id: Uuid,
    /// Agent assigned to handle the call
    pub agent_id: Uuid,
    /// Current lifecycle status
    pub status: CallStatus,
    /// Creation timestamp (admission approval)
    pub created_at: DateTime<Utc>,
    /// When the call was answered, if it was
    pub answered_at: Option<DateTime<Utc>>,
    /// When the call reached a terminal state; set iff status is terminal
    pub ended_at: Option<DateTime<Utc>>,
    /// Total call duration in seconds, reported by the provider
    pub duration_secs: Option<u32>,
    /// Recording URL once the provider delivers it
    pub recording_url: Option<String>,
    /// Streaming media session identifier, while a stream is attached
    pub stream_session_id: Option<String>,
}

impl Call {
    /// Create a new outbound call record in the `Initiated` state
    #[must_use]
    pub fn new_outbound(
        tenant_id: Uuid,
        user_id: Uuid,
        agent_id: Uuid,
        from_number: String,
        to_number: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            provider_ref: None,
            direction: CallDirection::Outbound,
            from_number,
            to_number,
            tenant_id,
            user_id,
            agent_id,
            status: CallStatus::Initiated,
            created_at: Utc::now(),
            answered_at: None,
            ended_at: None,
            duration_secs: None,
            recording_url: None,
            stream_session_id: None,
        }
    }
}

/// Speaker channel of a transcript fragment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpeakerChannel {
    /// The AI agent side of the call
    Agent,
    /// The human caller side of the call
    Caller,
}

impl fmt::Display for SpeakerChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Agent => write!(f, "agent"),
            Self::Caller => write!(f, "caller"),
        }
    }
}

/// One unit of speech-to-text output
///
/// Fragments for a call are append-only with monotonically non-decreasing
/// start offsets. An interim fragment at a given offset may be superseded by
/// a final fragment at the same offset; final fragments are immutable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptFragment {
    /// Owning call
    pub call_id: Uuid,
    /// Offset of this fragment from media start, in seconds
    pub start_offset_secs: f64,
    /// Which side of the call spoke
    pub channel: SpeakerChannel,
    /// Transcribed text
    pub text: String,
    /// Provider confidence score in `[0.0, 1.0]`
    pub confidence: f32,
    /// Interim fragments may be replaced; final fragments never change
    pub is_final: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!CallStatus::Initiated.is_terminal());
        assert!(!CallStatus::Ringing.is_terminal());
        assert!(!CallStatus::InProgress.is_terminal());
        assert!(CallStatus::Completed.is_terminal());
        assert!(CallStatus::Failed.is_terminal());
        assert!(CallStatus::NoAnswer.is_terminal());
        assert!(CallStatus::Busy.is_terminal());
        assert!(CallStatus::Canceled.is_terminal());
    }

    #[test]
    fn test_status_serde_names() {
        assert_eq!(
            serde_json::to_string(&CallStatus::InProgress).unwrap(),
            "\"in_progress\""
        );
        assert_eq!(
            serde_json::to_string(&CallStatus::NoAnswer).unwrap(),
            "\"no_answer\""
        );
    }

    #[test]
    fn test_new_outbound_call() {
        let call = Call::new_outbound(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "+15550100".into(),
            "+15550199".into(),
        );
        assert_eq!(call.status, CallStatus::Initiated);
        assert!(call.provider_ref.is_none());
        assert!(call.ended_at.is_none());
    }
}
