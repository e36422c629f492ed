// ABOUTME: Tests for post-call summarization through the cached LLM client
// ABOUTME: Verifies transcript prompting, cache reuse, and signaling events
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

mod common;

use common::{default_harness, test_context, TestHarness};
use std::time::Duration;
use switchboard_call_server::{
    calls::InitiateCallRequest,
    events::EventPayload,
    llm::CallSummarizer,
    models::{Call, CallStatus, SpeakerChannel, TranscriptFragment},
    providers::synthetic::SyntheticSession,
    providers::SpeechEvent,
    storage::CallStorage,
};
use uuid::Uuid;

fn final_fragment(call_id: Uuid, offset: f64, text: &str) -> TranscriptFragment {
    TranscriptFragment {
        call_id,
        start_offset_secs: offset,
        channel: SpeakerChannel::Caller,
        text: text.into(),
        confidence: 0.9,
        is_final: true,
    }
}

fn summarizer(harness: &TestHarness) -> CallSummarizer {
    CallSummarizer::new(
        harness.resources.chat.clone(),
        harness.resources.storage.clone(),
        harness.resources.events.clone(),
    )
}

#[tokio::test]
async fn test_summarize_call_publishes_and_reuses_cache() {
    let harness = default_harness();
    let mut rx = harness.resources.events.subscribe();

    let call = Call::new_outbound(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        "+15550100".into(),
        "+15550199".into(),
    );
    harness.storage.create_call(&call).await.unwrap();
    harness
        .storage
        .append_transcript_fragment(&final_fragment(call.id, 0.0, "I want to reschedule"))
        .await
        .unwrap();
    harness
        .storage
        .append_transcript_fragment(&final_fragment(call.id, 4.0, "to next Tuesday"))
        .await
        .unwrap();

    let summarizer = summarizer(&harness);
    let summary = summarizer.summarize_call(&call).await.unwrap();
    assert!(summary.is_some());
    assert_eq!(harness.llm.completion_count(), 1);

    let event = rx.try_recv().unwrap();
    assert!(matches!(event.payload, EventPayload::CallSummary { call_id, .. } if call_id == call.id));

    // Same transcript -> same fingerprint -> served from cache
    let again = summarizer.summarize_call(&call).await.unwrap();
    assert_eq!(summary, again);
    assert_eq!(harness.llm.completion_count(), 1);
}

#[tokio::test]
async fn test_summarize_skips_calls_without_final_fragments() {
    let harness = default_harness();

    let call = Call::new_outbound(
        Uuid::new_v4(),
        Uuid::new_v4(),
        Uuid::new_v4(),
        "+15550100".into(),
        "+15550199".into(),
    );
    harness.storage.create_call(&call).await.unwrap();

    let summary = summarizer(&harness).summarize_call(&call).await.unwrap();
    assert!(summary.is_none());
    assert_eq!(harness.llm.completion_count(), 0);
}

#[tokio::test]
async fn test_completed_call_is_summarized_end_to_end() {
    let harness = default_harness();
    let ctx = test_context();
    let manager = &harness.resources.call_manager;
    let mut rx = harness.resources.events.subscribe();

    // Live transcript produced while the call is in progress
    harness.speech.push_session(SyntheticSession::Script(vec![
        SpeechEvent::Fragment {
            start_offset_secs: 0.0,
            channel: SpeakerChannel::Caller,
            text: "please cancel my order".into(),
            confidence: 0.92,
            is_final: true,
        },
    ]));

    let call = manager
        .initiate_call(
            &ctx,
            &InitiateCallRequest {
                agent_id: Uuid::new_v4(),
                from_number: "+15550100".into(),
                to_number: "+15550199".into(),
            },
        )
        .await
        .unwrap();
    let provider_ref = call.provider_ref.clone().unwrap();

    manager
        .handle_status_webhook(&provider_ref, CallStatus::InProgress, None)
        .await
        .unwrap();

    // Let the coordinator drain the scripted session
    for _ in 0..100 {
        if harness.resources.transcription.active_count() == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    manager
        .handle_status_webhook(&provider_ref, CallStatus::Completed, Some(30))
        .await
        .unwrap();

    // The summary task runs in the background; wait for its event
    let mut saw_summary = false;
    for _ in 0..100 {
        while let Ok(event) = rx.try_recv() {
            if matches!(event.payload, EventPayload::CallSummary { call_id, .. } if call_id == call.id)
            {
                saw_summary = true;
            }
        }
        if saw_summary {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(saw_summary, "completed call should be summarized");
    assert_eq!(harness.llm.completion_count(), 1);
}
