// ABOUTME: HTTP speech-to-text provider with SSE streaming sessions and batch transcription
// ABOUTME: Converts provider event callbacks into a bounded queue consumed by the coordinator
//
// Licensed under either of Apache License, Version 2.0 or MIT License at your option.
// Copyright ©2025 Switchboard Voice

//! Speech-to-text provider client.
//!
//! Streaming sessions arrive as Server-Sent Events over a long-lived HTTP
//! response. A reader task parses the event stream and pushes
//! [`SpeechEvent`]s onto a bounded queue; the session is torn down when the
//! stream's shutdown signal fires or the provider closes the response.

use super::errors::ProviderError;
use super::{BatchTranscriptSegment, ProviderResult, SpeechEvent, SpeechProvider, SpeechStream};
use crate::config::environment::SpeechConfig;
use crate::constants::transcription::EVENT_QUEUE_DEPTH;
use crate::models::SpeakerChannel;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};
use uuid::Uuid;

const PROVIDER_NAME: &str = "speech";

#[derive(Debug, Serialize)]
struct OpenStreamRequest {
    call_id: Uuid,
}

/// Wire shape of one SSE `data:` payload from the streaming session
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum StreamEventWire {
    Fragment {
        start_offset_secs: f64,
        channel: SpeakerChannel,
        text: String,
        confidence: f32,
        #[serde(default)]
        is_final: bool,
    },
    Closed,
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    recording_url: &'a str,
}

#[derive(Debug, Deserialize)]
struct BatchResponse {
    segments: Vec<BatchSegmentWire>,
}

#[derive(Debug, Deserialize)]
struct BatchSegmentWire {
    start_offset_secs: f64,
    channel: SpeakerChannel,
    text: String,
    confidence: f32,
}

/// Speech provider client over its streaming (SSE) and batch REST APIs
#[derive(Debug, Clone)]
pub struct HttpSpeechProvider {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpSpeechProvider {
    /// Build a client from configuration
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(config: &SpeechConfig) -> anyhow::Result<Self> {
        // No overall timeout on the client: streaming sessions are long-lived.
        // The batch endpoint sets a per-request timeout instead.
        let client = Client::builder()
            .connect_timeout(config.connect_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_owned(),
            api_key: config.api_key.clone(),
        })
    }

    /// Consume the SSE body, forwarding parsed events until shutdown or EOF
    async fn run_stream_reader(
        response: reqwest::Response,
        tx: mpsc::Sender<SpeechEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        let mut events = response.bytes_stream().eventsource();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    debug!("Speech stream reader received shutdown signal");
                    break;
                }
                next = events.next() => {
                    let Some(item) = next else {
                        // Provider closed the response without a closed event
                        let _ = tx.send(SpeechEvent::Closed).await;
                        break;
                    };
                    match item {
                        Ok(event) => match serde_json::from_str::<StreamEventWire>(&event.data) {
                            Ok(StreamEventWire::Fragment {
                                start_offset_secs,
                                channel,
                                text,
                                confidence,
                                is_final,
                            }) => {
                                if tx
                                    .send(SpeechEvent::Fragment {
                                        start_offset_secs,
                                        channel,
                                        text,
                                        confidence,
                                        is_final,
                                    })
                                    .await
                                    .is_err()
                                {
                                    break;
                                }
                            }
                            Ok(StreamEventWire::Closed) => {
                                let _ = tx.send(SpeechEvent::Closed).await;
                                break;
                            }
                            Err(e) => {
                                warn!(error = %e, "Skipping unparseable speech stream event");
                            }
                        },
                        Err(e) => {
                            let _ = tx
                                .send(SpeechEvent::Error(ProviderError::ConnectionFailed {
                                    provider: PROVIDER_NAME.to_owned(),
                                    message: e.to_string(),
                                }))
                                .await;
                            break;
                        }
                    }
                }
            }
        }
    }
}

#[async_trait]
impl SpeechProvider for HttpSpeechProvider {
    fn name(&self) -> &'static str {
        PROVIDER_NAME
    }

    async fn open_stream(&self, call_id: Uuid) -> ProviderResult<SpeechStream> {
        debug!(call_id = %call_id, "Opening streaming transcription session");

        let response = self
            .client
            .post(format!("{}/v1/streams", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&OpenStreamRequest { call_id })
            .send()
            .await
            .map_err(|e| ProviderError::from_request_error(PROVIDER_NAME, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                PROVIDER_NAME,
                status.as_u16(),
                &body,
            ));
        }

        let session_id = response
            .headers()
            .get("x-session-id")
            .and_then(|v| v.to_str().ok())
            .map_or_else(|| Uuid::new_v4().to_string(), str::to_owned);

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(Self::run_stream_reader(response, tx, shutdown_rx));

        info!(call_id = %call_id, session_id = %session_id, "Streaming transcription session open");
        Ok(SpeechStream::new(session_id, rx, shutdown_tx))
    }

    async fn transcribe_recording(
        &self,
        recording_url: &str,
    ) -> ProviderResult<Vec<BatchTranscriptSegment>> {
        debug!(recording_url = %recording_url, "Requesting batch transcription");

        let response = self
            .client
            .post(format!("{}/v1/transcriptions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(std::time::Duration::from_secs(120))
            .json(&BatchRequest { recording_url })
            .send()
            .await
            .map_err(|e| ProviderError::from_request_error(PROVIDER_NAME, &e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(
                PROVIDER_NAME,
                status.as_u16(),
                &body,
            ));
        }

        let batch: BatchResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    provider: PROVIDER_NAME.to_owned(),
                    message: e.to_string(),
                })?;

        Ok(batch
            .segments
            .into_iter()
            .map(|s| BatchTranscriptSegment {
                start_offset_secs: s.start_offset_secs,
                channel: s.channel,
                text: s.text,
                confidence: s.confidence,
            })
            .collect())
    }
}
