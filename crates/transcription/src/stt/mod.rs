//! Speech-to-text provider adapters.
//!
//! The adapter is the variant seam over provider backends. The session
//! handler only sees [`SttAdapter`] and receives hypotheses through the
//! [`SttCallback`] surface, raised by the adapter's receive loop on a
//! separate task.

pub mod mock;

#[cfg(feature = "google-stt")]
pub mod google;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Adapter failures, named by effect.
#[derive(Debug, Error)]
pub enum SttError {
    #[error("failed to start provider session: {0}")]
    ProviderStart(String),
    #[error("failed to send audio to provider: {0}")]
    ProviderSend(String),
    #[error("provider receive failed: {0}")]
    ProviderReceive(String),
}

/// Callback surface invoked by an adapter's receive loop.
///
/// All callbacks from one provider session are serialised by that session's
/// single receive loop, so implementations see partials in provider order
/// and the final after every partial the session delivered.
#[async_trait]
pub trait SttCallback: Send + Sync {
    /// One interim hypothesis.
    async fn on_partial(&self, text: &str);

    /// A final hypothesis for the current utterance.
    async fn on_final(&self, text: &str, confidence: f64);

    /// The provider detected the end of speech. No more audio will be
    /// accepted on this session; a final may still follow.
    async fn on_end_of_utterance(&self);

    /// An unrecoverable session error.
    async fn on_error(&self, err: SttError);
}

/// Uniform contract over STT provider backends.
#[async_trait]
pub trait SttAdapter: Send + Sync {
    /// Opens a provider session, stores the callback and sends the session
    /// configuration. A receive loop is running when this returns.
    async fn start(&self, cb: Arc<dyn SttCallback>) -> Result<(), SttError>;

    /// Forwards one audio chunk to the provider. An empty chunk is a no-op.
    async fn send_audio(&self, audio: &[u8]) -> Result<(), SttError>;

    /// Replaces the provider session with a fresh one using the same
    /// configuration and callback. The new session is created before the
    /// old send side is closed, and a fresh receive loop bound to the new
    /// session is running when this returns. Receive loops bound to a
    /// superseded session must exit without raising `on_error`.
    async fn restart(&self) -> Result<(), SttError>;

    /// Terminates the send and receive sides and releases the callback.
    /// Idempotent.
    async fn close(&self);

    /// Backend name for logging.
    fn name(&self) -> &str;
}
