// ABOUTME: HTTP routes for the call command surface, provider webhooks, and WebSocket upgrade
// ABOUTME: Bearer-authenticated REST handlers returning Call snapshots and error codes
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! HTTP surface of the call server.
//!
//! Commands (`/api/*`) require a bearer token and return the current Call
//! snapshot. Webhooks (`/webhooks/*`) are idempotent: redelivered or
//! out-of-order provider events resolve to logged no-ops with a `200`, since
//! the provider cannot meaningfully act on an error response.

use crate::calls::InitiateCallRequest;
use crate::context::RequestContext;
use crate::errors::{AppError, AppResult};
use crate::health;
use crate::models::{Call, CallStatus, SpeakerChannel};
use crate::providers::BatchTranscriptSegment;
use crate::resources::ServerResources;
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

/// Provider status webhook payload
#[derive(Debug, Deserialize)]
pub struct TelephonyStatusWebhook {
    /// Provider-assigned call reference
    pub call_ref: String,
    /// Reported status
    pub status: CallStatus,
    /// Total duration, present on terminal statuses
    #[serde(default)]
    pub duration_secs: Option<u32>,
}

/// Provider recording-ready webhook payload
#[derive(Debug, Deserialize)]
pub struct RecordingWebhook {
    /// Provider-assigned call reference
    pub call_ref: String,
    /// Where the finished recording can be fetched
    pub recording_url: String,
}

/// One segment in a transcription-complete webhook
#[derive(Debug, Deserialize)]
pub struct TranscriptSegmentPayload {
    pub start_offset_secs: f64,
    pub channel: SpeakerChannel,
    pub text: String,
    pub confidence: f32,
}

/// Async batch transcription completion payload
#[derive(Debug, Deserialize)]
pub struct TranscriptionCompleteWebhook {
    /// Provider-assigned call reference
    pub call_ref: String,
    /// Final transcript segments
    pub segments: Vec<TranscriptSegmentPayload>,
}

/// Build the server router
pub fn router(resources: Arc<ServerResources>) -> Router {
    Router::new()
        .route("/health", get(health_report))
        .route("/api/calls", post(initiate_call))
        .route("/api/calls/:id", get(get_call))
        .route("/api/calls/:id/end", post(end_call))
        .route("/webhooks/telephony/status", post(telephony_status))
        .route("/webhooks/telephony/recording", post(telephony_recording))
        .route("/webhooks/transcription", post(transcription_complete))
        .route("/ws", get(ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(RequestBodyLimitLayer::new(
            crate::constants::limits::MAX_HTTP_BODY_BYTES,
        ))
        .with_state(resources)
}

/// Authenticate a REST request and build its explicit context
fn authenticate(resources: &ServerResources, headers: &HeaderMap) -> AppResult<RequestContext> {
    let token = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(AppError::auth_required)?;
    let auth = resources.auth_manager.validate_token(token)?;

    let context = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map_or_else(
            || RequestContext::new(auth.tenant_id, auth.user_id),
            |request_id| {
                RequestContext::with_request_id(auth.tenant_id, auth.user_id, request_id.to_owned())
            },
        );
    Ok(context)
}

async fn health_report(State(resources): State<Arc<ServerResources>>) -> impl IntoResponse {
    Json(health::check(&resources).await)
}

async fn initiate_call(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Json(request): Json<InitiateCallRequest>,
) -> AppResult<Json<Call>> {
    let ctx = authenticate(&resources, &headers)?;
    let call = resources.call_manager.initiate_call(&ctx, &request).await?;
    Ok(Json(call))
}

async fn get_call(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(call_id): Path<Uuid>,
) -> AppResult<Json<Call>> {
    let ctx = authenticate(&resources, &headers)?;
    let call = resources.call_manager.get_call(&ctx, call_id).await?;
    Ok(Json(call))
}

async fn end_call(
    State(resources): State<Arc<ServerResources>>,
    headers: HeaderMap,
    Path(call_id): Path<Uuid>,
) -> AppResult<Json<Call>> {
    let ctx = authenticate(&resources, &headers)?;
    let call = resources.call_manager.end_call(&ctx, call_id).await?;
    Ok(Json(call))
}

async fn telephony_status(
    State(resources): State<Arc<ServerResources>>,
    Json(webhook): Json<TelephonyStatusWebhook>,
) -> AppResult<Json<serde_json::Value>> {
    resources
        .call_manager
        .handle_status_webhook(&webhook.call_ref, webhook.status, webhook.duration_secs)
        .await?;
    Ok(Json(serde_json::json!({ "accepted": true })))
}

async fn telephony_recording(
    State(resources): State<Arc<ServerResources>>,
    Json(webhook): Json<RecordingWebhook>,
) -> AppResult<Json<serde_json::Value>> {
    resources
        .call_manager
        .handle_recording_webhook(&webhook.call_ref, &webhook.recording_url)
        .await?;
    Ok(Json(serde_json::json!({ "accepted": true })))
}

async fn transcription_complete(
    State(resources): State<Arc<ServerResources>>,
    Json(webhook): Json<TranscriptionCompleteWebhook>,
) -> AppResult<Json<serde_json::Value>> {
    let segments: Vec<BatchTranscriptSegment> = webhook
        .segments
        .into_iter()
        .map(|s| BatchTranscriptSegment {
            start_offset_secs: s.start_offset_secs,
            channel: s.channel,
            text: s.text,
            confidence: s.confidence,
        })
        .collect();
    resources
        .call_manager
        .handle_transcription_complete(&webhook.call_ref, segments)
        .await?;
    Ok(Json(serde_json::json!({ "accepted": true })))
}

async fn ws_upgrade(
    State(resources): State<Arc<ServerResources>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.max_message_size(crate::constants::limits::MAX_WS_MESSAGE_BYTES)
        .on_upgrade(move |socket| async move {
            resources.websocket_manager.handle_connection(socket).await;
        })
}
