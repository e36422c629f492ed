// ABOUTME: Signaling event bus carrying call and transcript events to connected clients
// ABOUTME: Broadcast channel decoupling the orchestration core from the WebSocket layer
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Event bus between the orchestration core and the signaling channel.
//!
//! The state machine, transcription coordinator, and summarizer publish here;
//! the WebSocket manager subscribes and fans events out to the right
//! connections. Publishing never blocks and never fails: with no connected
//! clients the event is simply dropped.

use crate::constants::signaling::EVENT_CHANNEL_CAPACITY;
use crate::models::{Call, TranscriptFragment};
use tokio::sync::broadcast;
use tracing::trace;
use uuid::Uuid;

/// Payload of one signaling event
///
/// Wire encoding lives in [`crate::websocket::ServerMessage`]; this is the
/// in-process shape.
#[derive(Debug, Clone)]
pub enum EventPayload {
    /// A call changed state; carries the full snapshot
    CallUpdate { call: Call },
    /// A transcript fragment was produced for a call
    TranscriptFragment { fragment: TranscriptFragment },
    /// Live transcription degraded for a call; the call itself continues
    TranscriptDegraded { call_id: Uuid, reason: String },
    /// Post-call summary is ready
    CallSummary { call_id: Uuid, summary: String },
}

/// One event addressed to a call's owner
#[derive(Debug, Clone)]
pub struct SignalingEvent {
    /// Tenant the event belongs to
    pub tenant_id: Uuid,
    /// User who owns the underlying call
    pub user_id: Uuid,
    /// Event payload delivered to the client
    pub payload: EventPayload,
}

/// Broadcast bus for signaling events
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<SignalingEvent>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Create a bus with the default channel capacity
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Subscribe to all events; the subscriber filters by tenant/user
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SignalingEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; a bus with no subscribers drops it silently
    pub fn publish(&self, event: SignalingEvent) {
        if self.tx.send(event).is_err() {
            trace!("Signaling event dropped: no connected subscribers");
        }
    }

    /// Publish a `call.update` event from a call snapshot
    pub fn publish_call_update(&self, call: &Call) {
        self.publish(SignalingEvent {
            tenant_id: call.tenant_id,
            user_id: call.user_id,
            payload: EventPayload::CallUpdate { call: call.clone() },
        });
    }

    /// Publish a `transcript.fragment` event for a call
    pub fn publish_fragment(&self, call: &Call, fragment: TranscriptFragment) {
        self.publish(SignalingEvent {
            tenant_id: call.tenant_id,
            user_id: call.user_id,
            payload: EventPayload::TranscriptFragment { fragment },
        });
    }

    /// Publish a `transcript.degraded` notice for a call
    pub fn publish_degraded(&self, call: &Call, reason: impl Into<String>) {
        self.publish(SignalingEvent {
            tenant_id: call.tenant_id,
            user_id: call.user_id,
            payload: EventPayload::TranscriptDegraded {
                call_id: call.id,
                reason: reason.into(),
            },
        });
    }

    /// Publish a `call.summary` event for a call
    pub fn publish_summary(&self, call: &Call, summary: impl Into<String>) {
        self.publish(SignalingEvent {
            tenant_id: call.tenant_id,
            user_id: call.user_id,
            payload: EventPayload::CallSummary {
                call_id: call.id,
                summary: summary.into(),
            },
        });
    }

    /// Number of live subscribers (for health reporting)
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
