// ABOUTME: WebSocket signaling channel for real-time call and transcript events
// ABOUTME: Authenticated connections, schema-validated messages, heartbeat liveness
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! # Real-Time Signaling Channel
//!
//! One persistent WebSocket per authenticated client. The first message must
//! be an `auth` envelope; anything else drops the connection - credentials
//! are never queued. After the handshake, inbound `{type, payload}` envelopes
//! are validated per type: malformed payloads produce a structured `error`
//! event back to the sender, not a disconnect.
//!
//! Outbound, the manager subscribes to the [`EventBus`] and fans
//! `call.update` / `transcript.*` / `call.summary` events out to the call
//! owner's connections (and tenant-wide subscribers). Liveness is enforced
//! with application-level pings; a connection missing the pong deadline is
//! forcibly disconnected and its session discarded, releasing every resource
//! tied to it.

use crate::auth::AuthManager;
use crate::calls::CallManager;
use crate::config::environment::WebSocketConfig;
use crate::context::RequestContext;
use crate::events::{EventBus, EventPayload, SignalingEvent};
use crate::governor::{resources as governed, Governor};
use crate::llm::{CachedChatClient, ChatMessage, ChatRequest};
use crate::models::{Call, TranscriptFragment};
use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Subscription topic granting a session tenant-wide event delivery
const TOPIC_TENANT: &str = "tenant";

/// Inbound client messages, validated per type
#[derive(Debug, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Handshake credential; must be the first message
    Auth { token: String },
    /// Adjust delivery topics for this session
    Subscribe { topics: Vec<String> },
    /// Chat with the agent, optionally in the context of a call
    Chat {
        #[serde(default)]
        call_id: Option<Uuid>,
        text: String,
    },
    /// Call-control: end an active call
    EndCall { call_id: Uuid },
    /// Liveness response to a server ping
    Pong,
}

/// Outbound server messages
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ServerMessage {
    /// A call changed state
    #[serde(rename = "call.update")]
    CallUpdate(Call),
    /// A transcript fragment was produced
    #[serde(rename = "transcript.fragment")]
    TranscriptFragment(TranscriptFragment),
    /// Live transcription degraded; the call continues
    #[serde(rename = "transcript.degraded")]
    TranscriptDegraded { call_id: Uuid, reason: String },
    /// Post-call summary is ready
    #[serde(rename = "call.summary")]
    CallSummary { call_id: Uuid, summary: String },
    /// Agent reply to a chat message
    #[serde(rename = "chat.response")]
    ChatResponse {
        #[serde(skip_serializing_if = "Option::is_none")]
        call_id: Option<Uuid>,
        text: String,
    },
    /// Command acknowledged
    Success { message: String },
    /// Structured error event (message validation, command failure)
    Error { message: String },
    /// Liveness probe; clients answer with `pong`
    Ping,
}

impl From<EventPayload> for ServerMessage {
    fn from(payload: EventPayload) -> Self {
        match payload {
            EventPayload::CallUpdate { call } => Self::CallUpdate(call),
            EventPayload::TranscriptFragment { fragment } => Self::TranscriptFragment(fragment),
            EventPayload::TranscriptDegraded { call_id, reason } => {
                Self::TranscriptDegraded { call_id, reason }
            }
            EventPayload::CallSummary { call_id, summary } => {
                Self::CallSummary { call_id, summary }
            }
        }
    }
}

/// One authenticated client connection
#[derive(Debug)]
struct ConnectionSession {
    user_id: Uuid,
    tenant_id: Uuid,
    subscriptions: Vec<String>,
    tx: mpsc::UnboundedSender<Message>,
    last_pong: Instant,
}

impl ConnectionSession {
    fn should_receive(&self, event: &SignalingEvent) -> bool {
        self.tenant_id == event.tenant_id
            && (self.user_id == event.user_id
                || self.subscriptions.iter().any(|t| t == TOPIC_TENANT))
    }
}

/// Manages signaling connections and event fan-out
#[derive(Clone)]
pub struct WebSocketManager {
    auth_manager: Arc<AuthManager>,
    call_manager: Arc<CallManager>,
    chat: Arc<CachedChatClient>,
    governor: Arc<Governor>,
    events: EventBus,
    config: WebSocketConfig,
    sessions: Arc<RwLock<HashMap<Uuid, ConnectionSession>>>,
}

impl WebSocketManager {
    /// Assemble the manager from injected collaborators
    #[must_use]
    pub fn new(
        auth_manager: Arc<AuthManager>,
        call_manager: Arc<CallManager>,
        chat: Arc<CachedChatClient>,
        governor: Arc<Governor>,
        events: EventBus,
        config: WebSocketConfig,
    ) -> Self {
        Self {
            auth_manager,
            call_manager,
            chat,
            governor,
            events,
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Number of connected sessions (for health reporting)
    pub async fn connection_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Spawn the event fan-out and heartbeat background tasks
    pub fn start_background_tasks(&self) {
        self.start_event_forwarding();
        self.start_heartbeat();
    }

    fn start_event_forwarding(&self) {
        let manager = self.clone();
        tokio::spawn(async move {
            let mut rx = manager.events.subscribe();
            loop {
                match rx.recv().await {
                    Ok(event) => manager.deliver_event(&event).await,
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                        warn!(missed, "Signaling fan-out lagged, events dropped");
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }

    fn start_heartbeat(&self) {
        let manager = self.clone();
        let interval = self.config.heartbeat_interval;
        let timeout = self.config.heartbeat_timeout;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;

                let mut dead = Vec::new();
                {
                    let sessions = manager.sessions.read().await;
                    for (connection_id, session) in sessions.iter() {
                        if session.last_pong.elapsed() > timeout {
                            dead.push(*connection_id);
                        } else {
                            send_message(&session.tx, &ServerMessage::Ping);
                        }
                    }
                }

                if !dead.is_empty() {
                    let mut sessions = manager.sessions.write().await;
                    for connection_id in dead {
                        if let Some(session) = sessions.remove(&connection_id) {
                            info!(
                                connection_id = %connection_id,
                                user_id = %session.user_id,
                                "Disconnecting unresponsive signaling connection"
                            );
                            // Closing the channel ends the socket forward task
                            let _ = session.tx.send(Message::Close(None));
                        }
                    }
                }
            }
        });
    }

    async fn deliver_event(&self, event: &SignalingEvent) {
        let message = ServerMessage::from(event.payload.clone());
        let sessions = self.sessions.read().await;
        for session in sessions.values() {
            if session.should_receive(event) {
                send_message(&session.tx, &message);
            }
        }
    }

    /// Handle one WebSocket connection for its whole lifetime
    pub async fn handle_connection(&self, ws: WebSocket) {
        let (mut ws_tx, mut ws_rx) = ws.split();
        let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

        // Forward queued messages onto the socket until either side closes
        let send_task = tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                let closing = matches!(message, Message::Close(_));
                if ws_tx.send(message).await.is_err() || closing {
                    break;
                }
            }
        });

        let connection_id = Uuid::new_v4();

        // Handshake: the first message must authenticate within the deadline.
        // Unauthenticated connections are dropped, never queued.
        let auth = tokio::time::timeout(
            crate::constants::signaling::AUTH_HANDSHAKE_TIMEOUT,
            ws_rx.next(),
        )
        .await;

        let identity = match auth {
            Ok(Some(Ok(Message::Text(text)))) => {
                match serde_json::from_str::<ClientMessage>(&text) {
                    Ok(ClientMessage::Auth { token }) => {
                        match self.auth_manager.validate_token(&token) {
                            Ok(identity) => Some(identity),
                            Err(e) => {
                                send_message(
                                    &tx,
                                    &ServerMessage::Error {
                                        message: format!("authentication failed: {e}"),
                                    },
                                );
                                None
                            }
                        }
                    }
                    _ => None,
                }
            }
            _ => None,
        };

        let Some(identity) = identity else {
            debug!(connection_id = %connection_id, "Dropping unauthenticated signaling connection");
            let _ = tx.send(Message::Close(None));
            send_task.abort();
            return;
        };

        {
            let mut sessions = self.sessions.write().await;
            sessions.insert(
                connection_id,
                ConnectionSession {
                    user_id: identity.user_id,
                    tenant_id: identity.tenant_id,
                    subscriptions: Vec::new(),
                    tx: tx.clone(),
                    last_pong: Instant::now(),
                },
            );
        }
        send_message(
            &tx,
            &ServerMessage::Success {
                message: "authenticated".into(),
            },
        );
        info!(
            connection_id = %connection_id,
            user_id = %identity.user_id,
            tenant_id = %identity.tenant_id,
            "Signaling connection established"
        );

        while let Some(message) = ws_rx.next().await {
            match message {
                Ok(Message::Text(text)) => {
                    self.handle_client_text(connection_id, identity.user_id, identity.tenant_id, &text, &tx)
                        .await;
                }
                Ok(Message::Close(_)) | Err(_) => break,
                _ => {}
            }
        }

        // Disconnect of any kind releases the session
        self.sessions.write().await.remove(&connection_id);
        send_task.abort();
        info!(connection_id = %connection_id, "Signaling connection closed");
    }

    async fn handle_client_text(
        &self,
        connection_id: Uuid,
        user_id: Uuid,
        tenant_id: Uuid,
        text: &str,
        tx: &mpsc::UnboundedSender<Message>,
    ) {
        let parsed = match serde_json::from_str::<ClientMessage>(text) {
            Ok(parsed) => parsed,
            Err(e) => {
                // Malformed messages get a structured error, not a drop
                send_message(
                    tx,
                    &ServerMessage::Error {
                        message: format!("invalid message: {e}"),
                    },
                );
                return;
            }
        };

        match parsed {
            ClientMessage::Auth { .. } => {
                send_message(
                    tx,
                    &ServerMessage::Error {
                        message: "connection is already authenticated".into(),
                    },
                );
            }
            ClientMessage::Subscribe { topics } => {
                let count = topics.len();
                if let Some(session) = self.sessions.write().await.get_mut(&connection_id) {
                    session.subscriptions = topics;
                }
                send_message(
                    tx,
                    &ServerMessage::Success {
                        message: format!("subscribed to {count} topics"),
                    },
                );
            }
            ClientMessage::Pong => {
                if let Some(session) = self.sessions.write().await.get_mut(&connection_id) {
                    session.last_pong = Instant::now();
                }
            }
            ClientMessage::EndCall { call_id } => {
                let call_manager = self.call_manager.clone();
                let tx = tx.clone();
                let ctx = RequestContext::new(tenant_id, user_id);
                tokio::spawn(async move {
                    match call_manager.end_call(&ctx, call_id).await {
                        Ok(_) => send_message(
                            &tx,
                            &ServerMessage::Success {
                                message: format!("call {call_id} ended"),
                            },
                        ),
                        Err(e) => send_message(
                            &tx,
                            &ServerMessage::Error {
                                message: e.to_string(),
                            },
                        ),
                    }
                });
            }
            ClientMessage::Chat { call_id, text } => {
                if let Err(e) = self.governor.check_rate(tenant_id, governed::CHAT_MESSAGE) {
                    send_message(
                        tx,
                        &ServerMessage::Error {
                            message: e.to_string(),
                        },
                    );
                    return;
                }
                let chat = self.chat.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let request = ChatRequest::new(vec![
                        ChatMessage::system(
                            "You are a helpful voice-agent assistant for the Switchboard platform.",
                        ),
                        ChatMessage::user(text),
                    ]);
                    match chat.complete(&request).await {
                        Ok(response) => send_message(
                            &tx,
                            &ServerMessage::ChatResponse {
                                call_id,
                                text: response.content,
                            },
                        ),
                        Err(e) => send_message(
                            &tx,
                            &ServerMessage::Error {
                                message: format!("chat failed: {e}"),
                            },
                        ),
                    }
                });
            }
        }
    }
}

fn send_message(tx: &mpsc::UnboundedSender<Message>, message: &ServerMessage) {
    if let Ok(json) = serde_json::to_string(message) {
        if tx.send(Message::Text(json)).is_err() {
            debug!("Dropping message for closed signaling connection");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_message_envelope_parsing() {
        let auth: ClientMessage =
            serde_json::from_str(r#"{"type":"auth","payload":{"token":"abc"}}"#).unwrap();
        assert!(matches!(auth, ClientMessage::Auth { token } if token == "abc"));

        let end: ClientMessage = serde_json::from_str(
            r#"{"type":"end_call","payload":{"call_id":"4f9c1f6e-8c7a-4f64-9a31-2d0c1a1a2b3c"}}"#,
        )
        .unwrap();
        assert!(matches!(end, ClientMessage::EndCall { .. }));

        let pong: ClientMessage = serde_json::from_str(r#"{"type":"pong"}"#).unwrap();
        assert!(matches!(pong, ClientMessage::Pong));
    }

    #[test]
    fn test_malformed_payload_is_an_error_not_a_panic() {
        let result = serde_json::from_str::<ClientMessage>(
            r#"{"type":"end_call","payload":{"call_id":"not-a-uuid"}}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_server_message_wire_shape() {
        let message = ServerMessage::TranscriptDegraded {
            call_id: Uuid::nil(),
            reason: "provider lost".into(),
        };
        let json = serde_json::to_string(&message).unwrap();
        assert!(json.contains(r#""type":"transcript.degraded""#));
        assert!(json.contains(r#""payload""#));
    }
}
