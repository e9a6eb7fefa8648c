//! Google Cloud Speech-to-Text streaming backend via gRPC.
//!
//! Credential management is handled outside the process (ambient gRPC
//! credentials or a fronting proxy); this client takes an endpoint and
//! drives the `StreamingRecognize` bidirectional RPC.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Streaming;
use tonic::transport::Channel;
use tracing::debug;

use super::{SttAdapter, SttCallback, SttError};
use crate::config::{AudioEncoding, SttConfig};

/// Generated Google Cloud Speech gRPC client.
pub mod speech_proto {
    tonic::include_proto!("google.cloud.speech.v1");
}

use speech_proto::recognition_config::AudioEncoding as ProtoEncoding;
use speech_proto::speech_client::SpeechClient;
use speech_proto::streaming_recognize_request::StreamingRequest;
use speech_proto::streaming_recognize_response::SpeechEventType;
use speech_proto::{
    RecognitionConfig, StreamingRecognitionConfig, StreamingRecognizeRequest,
    StreamingRecognizeResponse,
};

pub const DEFAULT_ENDPOINT: &str = "https://speech.googleapis.com";

/// One provider session: the send side of the request stream. Receive loops
/// hold the `Arc` they were started with and compare it against the current
/// one, so a loop bound to a superseded session can exit silently.
struct ProviderSession {
    audio_tx: mpsc::Sender<StreamingRecognizeRequest>,
}

struct GoogleState {
    cb: Option<Arc<dyn SttCallback>>,
    session: Option<Arc<ProviderSession>>,
}

/// Google STT implementation of [`SttAdapter`].
pub struct GoogleSttAdapter {
    client: SpeechClient<Channel>,
    config: SttConfig,
    state: Arc<Mutex<GoogleState>>,
}

impl GoogleSttAdapter {
    /// Connects to the speech endpoint and prepares a client. No session is
    /// opened until [`SttAdapter::start`].
    pub async fn connect(config: SttConfig) -> Result<Self, SttError> {
        let endpoint = config
            .endpoint
            .clone()
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());
        let channel = Channel::from_shared(endpoint.clone())
            .map_err(|e| SttError::ProviderStart(format!("invalid endpoint '{endpoint}': {e}")))?
            .connect()
            .await
            .map_err(|e| {
                SttError::ProviderStart(format!("failed to connect to '{endpoint}': {e}"))
            })?;

        Ok(Self {
            client: SpeechClient::new(channel),
            config,
            state: Arc::new(Mutex::new(GoogleState {
                cb: None,
                session: None,
            })),
        })
    }

    fn locked(state: &Mutex<GoogleState>) -> MutexGuard<'_, GoogleState> {
        state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn recognition_config(&self) -> RecognitionConfig {
        RecognitionConfig {
            encoding: proto_encoding(self.config.encoding) as i32,
            sample_rate_hertz: self.config.sample_rate_hz as i32,
            language_code: self.config.language_code.clone(),
        }
    }

    /// Opens a new provider session: queues the session configuration as the
    /// first message and starts the streaming RPC.
    async fn open_session(
        &self,
    ) -> Result<(Arc<ProviderSession>, Streaming<StreamingRecognizeResponse>), SttError> {
        let (audio_tx, audio_rx) = mpsc::channel::<StreamingRecognizeRequest>(64);

        let config_msg = StreamingRecognizeRequest {
            streaming_request: Some(StreamingRequest::StreamingConfig(
                StreamingRecognitionConfig {
                    config: Some(self.recognition_config()),
                    single_utterance: self.config.single_utterance,
                    interim_results: self.config.interim_results,
                },
            )),
        };
        audio_tx
            .send(config_msg)
            .await
            .map_err(|_| SttError::ProviderStart("failed to queue session config".to_string()))?;

        let mut client = self.client.clone();
        let responses = client
            .streaming_recognize(ReceiverStream::new(audio_rx))
            .await
            .map_err(|e| SttError::ProviderStart(format!("StreamingRecognize failed: {e}")))?
            .into_inner();

        Ok((Arc::new(ProviderSession { audio_tx }), responses))
    }

    /// Receive loop bound to one session. Exits silently on normal end of
    /// stream or when the session it was started with has been replaced by
    /// `restart`/`close`; only a failure on the still-current session is
    /// reported through `on_error`.
    fn spawn_receive_loop(
        &self,
        mut responses: Streaming<StreamingRecognizeResponse>,
        session: Arc<ProviderSession>,
        cb: Arc<dyn SttCallback>,
    ) {
        let state = Arc::clone(&self.state);
        tokio::spawn(async move {
            loop {
                let message = responses.message().await;

                let still_current = {
                    let guard = Self::locked(&state);
                    guard
                        .session
                        .as_ref()
                        .is_some_and(|current| Arc::ptr_eq(current, &session))
                };

                match message {
                    Ok(None) => return,
                    Err(status) => {
                        if still_current {
                            cb.on_error(SttError::ProviderReceive(status.to_string())).await;
                        }
                        return;
                    }
                    Ok(Some(response)) => {
                        if !still_current {
                            return;
                        }

                        // The provider may still deliver a final after this
                        // event, but accepts no more audio on this session.
                        if response.speech_event_type() == SpeechEventType::EndOfSingleUtterance {
                            cb.on_end_of_utterance().await;
                        }

                        for result in response.results {
                            let Some(alternative) = result.alternatives.first() else {
                                continue;
                            };
                            if result.is_final {
                                cb.on_final(&alternative.transcript, alternative.confidence as f64)
                                    .await;
                            } else {
                                cb.on_partial(&alternative.transcript).await;
                            }
                        }
                    }
                }
            }
        });
    }
}

#[async_trait]
impl SttAdapter for GoogleSttAdapter {
    async fn start(&self, cb: Arc<dyn SttCallback>) -> Result<(), SttError> {
        let (session, responses) = self.open_session().await?;
        {
            let mut state = Self::locked(&self.state);
            state.cb = Some(Arc::clone(&cb));
            state.session = Some(Arc::clone(&session));
        }
        self.spawn_receive_loop(responses, session, cb);
        Ok(())
    }

    async fn send_audio(&self, audio: &[u8]) -> Result<(), SttError> {
        if audio.is_empty() {
            return Ok(());
        }

        let session = { Self::locked(&self.state).session.clone() };
        let Some(session) = session else {
            // Session not ready or already closed; skip.
            return Ok(());
        };

        let message = StreamingRecognizeRequest {
            streaming_request: Some(StreamingRequest::AudioContent(audio.to_vec())),
        };
        session
            .audio_tx
            .send(message)
            .await
            .map_err(|_| SttError::ProviderSend("provider send side closed".to_string()))
    }

    async fn restart(&self) -> Result<(), SttError> {
        // Create the new session first to minimise the sending gap, then
        // retire the old one; dropping its sender closes the old send side.
        let (session, responses) = self.open_session().await?;

        let (cb, old_session) = {
            let mut state = Self::locked(&self.state);
            let cb = state.cb.clone();
            let old = state.session.replace(Arc::clone(&session));
            (cb, old)
        };
        drop(old_session);

        let Some(cb) = cb else {
            return Err(SttError::ProviderStart("restart before start".to_string()));
        };

        debug!("provider session restarted");
        self.spawn_receive_loop(responses, session, cb);
        Ok(())
    }

    async fn close(&self) {
        let mut state = Self::locked(&self.state);
        // Dropping the session closes the request stream; the receive loop
        // sees end-of-stream (or finds itself superseded) and exits silently.
        state.session = None;
        state.cb = None;
    }

    fn name(&self) -> &str {
        "google"
    }
}

fn proto_encoding(encoding: AudioEncoding) -> ProtoEncoding {
    match encoding {
        AudioEncoding::Linear16 => ProtoEncoding::Linear16,
        AudioEncoding::Mulaw => ProtoEncoding::Mulaw,
        AudioEncoding::Flac => ProtoEncoding::Flac,
        AudioEncoding::Amr => ProtoEncoding::Amr,
        AudioEncoding::AmrWb => ProtoEncoding::AmrWb,
        AudioEncoding::OggOpus => ProtoEncoding::OggOpus,
        AudioEncoding::SpeexWithHeaderByte => ProtoEncoding::SpeexWithHeaderByte,
        AudioEncoding::WebmOpus => ProtoEncoding::WebmOpus,
    }
}
