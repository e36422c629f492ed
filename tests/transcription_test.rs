// ABOUTME: Integration tests for the streaming transcription coordinator
// ABOUTME: Covers fragment persistence, reconnects, degraded events, and backfill
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

mod common;

use common::{default_harness, TestHarness};
use std::time::Duration;
use switchboard_call_server::{
    events::EventPayload,
    models::{Call, SpeakerChannel},
    providers::synthetic::SyntheticSession,
    providers::{BatchTranscriptSegment, ProviderError, SpeechEvent},
    storage::CallStorage,
};
use tokio::sync::broadcast;
use uuid::Uuid;

fn fragment_event(offset: f64, text: &str, is_final: bool) -> SpeechEvent {
    SpeechEvent::Fragment {
        start_offset_secs: offset,
        channel: SpeakerChannel::Caller,
        text: text.into(),
        confidence: 0.9,
        is_final,
    }
}

async fn stored_call(harness: &TestHarness) -> Call {
    let call = Call::new_outbound(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        "+15550100".into(),
        "+15550199".into(),
    );
    harness.storage.create_call(&call).await.unwrap();
    call
}

/// Wait until the coordinator for `call_id` has exited
async fn wait_for_coordinator_exit(harness: &TestHarness) {
    for _ in 0..100 {
        if harness.resources.transcription.active_count() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("transcription coordinator did not exit");
}

fn collect_payloads(rx: &mut broadcast::Receiver<switchboard_call_server::events::SignalingEvent>) -> Vec<EventPayload> {
    let mut payloads = Vec::new();
    while let Ok(event) = rx.try_recv() {
        payloads.push(event.payload);
    }
    payloads
}

#[tokio::test]
async fn test_fragments_are_persisted_and_published() {
    let harness = default_harness();
    let call = stored_call(&harness).await;
    let mut rx = harness.resources.events.subscribe();

    harness.speech.push_session(SyntheticSession::Script(vec![
        fragment_event(0.0, "hel", false),
        fragment_event(0.0, "hello there", true),
        fragment_event(2.5, "how can I help", true),
    ]));

    let session_id = harness.resources.transcription.start(&call).await.unwrap();
    assert!(!session_id.is_empty());
    wait_for_coordinator_exit(&harness).await;

    // Interim replaced by final at the same offset; both offsets present
    let fragments = harness
        .storage
        .list_transcript_fragments(call.id)
        .await
        .unwrap();
    assert_eq!(fragments.len(), 2);
    assert_eq!(fragments[0].text, "hello there");
    assert!(fragments[0].is_final);
    assert_eq!(fragments[1].text, "how can I help");

    // All three provider events were republished on the signaling channel
    let published = collect_payloads(&mut rx);
    let fragment_count = published
        .iter()
        .filter(|p| matches!(p, EventPayload::TranscriptFragment { .. }))
        .count();
    assert_eq!(fragment_count, 3);
}

#[tokio::test]
async fn test_stream_error_reconnects_once() {
    let harness = default_harness();
    let call = stored_call(&harness).await;
    let mut rx = harness.resources.events.subscribe();

    harness.speech.push_session(SyntheticSession::Script(vec![
        fragment_event(0.0, "first", true),
        SpeechEvent::Error(ProviderError::ConnectionFailed {
            provider: "speech".into(),
            message: "reset".into(),
        }),
    ]));
    harness.speech.push_session(SyntheticSession::Script(vec![
        fragment_event(1.0, "second", true),
    ]));

    harness.resources.transcription.start(&call).await.unwrap();
    wait_for_coordinator_exit(&harness).await;

    let fragments = harness
        .storage
        .list_transcript_fragments(call.id)
        .await
        .unwrap();
    let texts: Vec<_> = fragments.iter().map(|f| f.text.as_str()).collect();
    assert_eq!(texts, vec!["first", "second"]);

    // A successful reconnect is not a degradation
    let published = collect_payloads(&mut rx);
    assert!(!published
        .iter()
        .any(|p| matches!(p, EventPayload::TranscriptDegraded { .. })));
}

#[tokio::test]
async fn test_failed_reconnect_publishes_degraded() {
    let harness = default_harness();
    let call = stored_call(&harness).await;
    let mut rx = harness.resources.events.subscribe();

    harness.speech.push_session(SyntheticSession::Script(vec![
        SpeechEvent::Error(ProviderError::ConnectionFailed {
            provider: "speech".into(),
            message: "reset".into(),
        }),
    ]));
    // The single reconnect attempt fails fatally
    harness
        .speech
        .push_session(SyntheticSession::Fail(ProviderError::AuthFailed {
            provider: "speech".into(),
            message: "key revoked".into(),
        }));

    harness.resources.transcription.start(&call).await.unwrap();
    wait_for_coordinator_exit(&harness).await;

    let published = collect_payloads(&mut rx);
    assert!(published
        .iter()
        .any(|p| matches!(p, EventPayload::TranscriptDegraded { .. })));
}

#[tokio::test]
async fn test_start_is_idempotent_and_stop_closes_the_session() {
    let harness = default_harness();
    let call = stored_call(&harness).await;

    harness
        .speech
        .push_session(SyntheticSession::Open(vec![fragment_event(
            0.0, "hello", true,
        )]));

    let first = harness.resources.transcription.start(&call).await.unwrap();
    // Second start while the coordinator is live reuses the session
    let second = harness.resources.transcription.start(&call).await.unwrap();
    assert_eq!(first, second);
    assert_eq!(harness.resources.transcription.active_count(), 1);

    harness.resources.transcription.stop(call.id);
    wait_for_coordinator_exit(&harness).await;
}

#[tokio::test]
async fn test_backfill_from_recording() {
    let harness = default_harness();
    let mut call = stored_call(&harness).await;
    call.recording_url = Some("https://recordings.example/call.wav".into());
    harness.storage.update_call_status(&call).await.unwrap();
    let mut rx = harness.resources.events.subscribe();

    harness.speech.set_batch_segments(vec![
        BatchTranscriptSegment {
            start_offset_secs: 0.0,
            channel: SpeakerChannel::Agent,
            text: "hello, this is the agent".into(),
            confidence: 0.95,
        },
        BatchTranscriptSegment {
            start_offset_secs: 3.0,
            channel: SpeakerChannel::Caller,
            text: "hi, I need help".into(),
            confidence: 0.91,
        },
    ]);

    let count = harness
        .resources
        .transcription
        .backfill_from_recording(&call)
        .await
        .unwrap();
    assert_eq!(count, 2);

    let fragments = harness
        .storage
        .list_transcript_fragments(call.id)
        .await
        .unwrap();
    assert_eq!(fragments.len(), 2);
    assert!(fragments.iter().all(|f| f.is_final));

    let published = collect_payloads(&mut rx);
    assert_eq!(
        published
            .iter()
            .filter(|p| matches!(p, EventPayload::TranscriptFragment { .. }))
            .count(),
        2
    );
}
