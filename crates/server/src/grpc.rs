//! The audio stream driver: reads frames from the client-streaming RPC,
//! feeds the session handler and terminates the stream with an ack.
//!
//! Input faults never surface as RPC errors once a segment exists; the
//! segment is dropped with a classified reason and the ack is still written.
//! The published transcript stream, not the RPC return code, is the output
//! that matters, and surfacing a transport error as well would double-report
//! downstream.

use std::sync::Arc;
use std::time::Duration;

use tokio_stream::{Stream, StreamExt};
use tonic::{Request, Response, Status, Streaming};
use tracing::{info, warn};

use speechgate_events::TranscriptSink;
use speechgate_transcription::stt::mock::MockSttAdapter;
use speechgate_transcription::{
    SegmentIdGenerator, SegmentLimits, SessionError, SessionHandler, State, SttAdapter, SttConfig,
};

use crate::error::classify_stream_error;
use crate::proto::audio_stream_service_server::AudioStreamService;
use crate::proto::{AudioFrame, StreamAck};

/// Per-stream behaviour of the gateway.
#[derive(Debug, Clone)]
pub struct GatewaySettings {
    pub provider: String,
    pub stt: SttConfig,
    pub limits: SegmentLimits,
    pub continuous_mode: bool,
    /// Callback-idle gap after which end-of-input draining gives up.
    pub drain_idle: Duration,
    /// Upper bound on end-of-input draining.
    pub drain_max: Duration,
}

impl Default for GatewaySettings {
    fn default() -> Self {
        Self {
            provider: "mock".to_string(),
            stt: SttConfig::default(),
            limits: SegmentLimits::default(),
            continuous_mode: false,
            drain_idle: Duration::from_millis(250),
            drain_max: Duration::from_secs(3),
        }
    }
}

/// gRPC service implementation for `AudioStreamService`.
pub struct AudioGateway {
    settings: GatewaySettings,
    segments: Arc<SegmentIdGenerator>,
    sink: Arc<dyn TranscriptSink>,
}

impl AudioGateway {
    pub fn new(settings: GatewaySettings, sink: Arc<dyn TranscriptSink>) -> Self {
        Self {
            settings,
            segments: Arc::new(SegmentIdGenerator::new()),
            sink,
        }
    }

    async fn make_adapter(&self) -> Result<Arc<dyn SttAdapter>, Status> {
        match self.settings.provider.as_str() {
            "mock" => Ok(Arc::new(MockSttAdapter::new())),
            #[cfg(feature = "google-stt")]
            "google" => {
                let adapter =
                    speechgate_transcription::stt::google::GoogleSttAdapter::connect(
                        self.settings.stt.clone(),
                    )
                    .await
                    .map_err(|e| {
                        Status::unavailable(format!("failed to create stt adapter: {e}"))
                    })?;
                Ok(Arc::new(adapter))
            }
            other => {
                warn!(provider = %other, "unknown stt provider, using mock");
                Ok(Arc::new(MockSttAdapter::new()))
            }
        }
    }

    /// Drives one client stream to completion.
    ///
    /// Generic over the frame source so scenario tests can feed plain
    /// streams; the RPC entry point passes the tonic stream through.
    pub async fn drive_stream<S>(
        &self,
        adapter: Arc<dyn SttAdapter>,
        mut frames: S,
    ) -> Result<StreamAck, Status>
    where
        S: Stream<Item = Result<AudioFrame, Status>> + Unpin + Send,
    {
        // The first frame carries the authoritative ids.
        let Some(first) = frames.next().await else {
            return Err(Status::invalid_argument("empty audio stream"));
        };
        let first = first?;

        let interaction_id = first.interaction_id.clone();
        let tenant_id = first.tenant_id.clone();
        let segment_id = self.segments.next(&interaction_id);

        info!(
            %interaction_id,
            %tenant_id,
            %segment_id,
            provider = adapter.name(),
            "stream started"
        );

        let handler = Arc::new(SessionHandler::new(
            adapter,
            Arc::clone(&self.sink),
            Arc::clone(&self.segments),
            interaction_id.clone(),
            tenant_id,
            segment_id,
            self.settings.limits.clone(),
            self.settings.continuous_mode,
        ));

        // No segment output exists yet, so a session setup failure is the one
        // fault that surfaces to the RPC layer.
        handler
            .start()
            .await
            .map_err(|e| Status::internal(format!("failed to start stt session: {e}")))?;

        let mut input_done = first.end_of_utterance;
        if let Err(err) = handler.send_audio(&first.audio, first.audio_offset_ms).await {
            note_send_failure(&handler, err);
            input_done = true;
        }

        while !input_done {
            if handler.is_dropped() {
                break;
            }

            match frames.next().await {
                None => break,
                Some(Err(status)) => {
                    handler.drop_segment(&classify_stream_error(&status));
                    break;
                }
                Some(Ok(frame)) => {
                    // Empty frames are forwarded too: they still update the
                    // audio offset.
                    if let Err(err) = handler.send_audio(&frame.audio, frame.audio_offset_ms).await
                    {
                        note_send_failure(&handler, err);
                        break;
                    }
                    if frame.end_of_utterance {
                        break;
                    }
                }
            }
        }

        if !handler.is_dropped() {
            // The provider may still owe results for audio already forwarded
            // (a final routinely lands after end of input).
            handler
                .await_quiescent(self.settings.drain_idle, self.settings.drain_max)
                .await;

            if handler.state() == State::Open {
                let metrics = handler.metrics();
                if metrics.audio_bytes > 0 || metrics.partial_count > 0 {
                    handler.drop_segment("stream ended before final");
                }
            }
        }

        if handler.is_dropped() {
            info!(
                %interaction_id,
                segment_id = %handler.segment_id(),
                state = %handler.state(),
                "stream ended with dropped segment"
            );
        } else {
            info!(
                %interaction_id,
                segment_id = %handler.segment_id(),
                state = %handler.state(),
                utterances = handler.utterance_count(),
                "stream completed"
            );
        }

        handler.close().await;
        Ok(StreamAck { interaction_id })
    }
}

fn note_send_failure(handler: &SessionHandler, err: SessionError) {
    match err {
        // The handler already dropped the segment on a limit breach.
        SessionError::LimitExceeded(_) => {}
        SessionError::Stt(err) => {
            handler.drop_segment(&format!("send audio failed: {err}"));
        }
    }
}

#[tonic::async_trait]
impl AudioStreamService for AudioGateway {
    async fn stream_audio(
        &self,
        request: Request<Streaming<AudioFrame>>,
    ) -> Result<Response<StreamAck>, Status> {
        let adapter = self.make_adapter().await?;
        let ack = self.drive_stream(adapter, request.into_inner()).await?;
        Ok(Response::new(ack))
    }
}
