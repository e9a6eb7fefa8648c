//! Per-stream session handler.
//!
//! The handler owns one segment lifecycle, one STT adapter and the segment
//! counters for the life of a stream, and implements the adapter callback
//! surface. Two producers act on it concurrently: the RPC read loop (via
//! [`SessionHandler::send_audio`]) and the provider receive loop (via the
//! callbacks). Every shared-state decision goes through the lifecycle's
//! transition methods or the handler mutex; state is never inspected outside
//! a lock and then acted on.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use speechgate_events::{
    FINAL_EVENT_TYPE, PARTIAL_EVENT_TYPE, TranscriptFinal, TranscriptPartial, TranscriptSink,
    unix_timestamp_ms,
};

use crate::config::SegmentLimits;
use crate::lifecycle::{Lifecycle, State};
use crate::segment::SegmentIdGenerator;
use crate::stt::{SttAdapter, SttCallback, SttError};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("segment limit exceeded: {0}")]
    LimitExceeded(String),
    #[error(transparent)]
    Stt(#[from] SttError),
}

/// Observer invoked with the new segment id after a rollover. Observers must
/// not mutate handler state.
pub type TransitionCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Usage counters for the current segment.
#[derive(Debug, Clone, Copy)]
pub struct SegmentMetrics {
    pub audio_bytes: u64,
    pub partial_count: u32,
    pub duration: Duration,
}

struct SessionState {
    last_audio_offset_ms: i64,
    audio_bytes: u64,
    partial_count: u32,
    segment_started_at: Instant,
    /// Armed by end-of-utterance; consumed by the next final.
    pending_restart: bool,
    utterance_count: u32,
    on_transition: Option<TransitionCallback>,
}

/// Coordinates one audio stream between the STT adapter and the event sink.
pub struct SessionHandler {
    adapter: Arc<dyn SttAdapter>,
    sink: Arc<dyn TranscriptSink>,
    segments: Arc<SegmentIdGenerator>,
    interaction_id: String,
    tenant_id: String,
    limits: SegmentLimits,
    /// One provider session spans many utterances; each final rolls the
    /// segment over without restarting the adapter. When unset, end of
    /// utterance arms a provider restart executed after the matching final.
    continuous_mode: bool,
    lifecycle: Lifecycle,
    inner: Mutex<SessionState>,
    /// Bumped on every callback so the driver can drain pending provider
    /// results after the client stops sending.
    activity: watch::Sender<u64>,
}

impl SessionHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        adapter: Arc<dyn SttAdapter>,
        sink: Arc<dyn TranscriptSink>,
        segments: Arc<SegmentIdGenerator>,
        interaction_id: impl Into<String>,
        tenant_id: impl Into<String>,
        segment_id: impl Into<String>,
        limits: SegmentLimits,
        continuous_mode: bool,
    ) -> Self {
        let (activity, _) = watch::channel(0u64);
        Self {
            adapter,
            sink,
            segments,
            interaction_id: interaction_id.into(),
            tenant_id: tenant_id.into(),
            limits,
            continuous_mode,
            lifecycle: Lifecycle::new(segment_id),
            inner: Mutex::new(SessionState {
                last_audio_offset_ms: 0,
                audio_bytes: 0,
                partial_count: 0,
                segment_started_at: Instant::now(),
                pending_restart: false,
                utterance_count: 0,
                on_transition: None,
            }),
            activity,
        }
    }

    fn locked(&self) -> MutexGuard<'_, SessionState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn touch(&self) {
        self.activity.send_modify(|v| *v += 1);
    }

    /// Opens the provider session with this handler as the callback receiver.
    /// The adapter's receive loop is running when this returns.
    pub async fn start(self: &Arc<Self>) -> Result<(), SttError> {
        let cb: Arc<dyn SttCallback> = Arc::clone(self) as Arc<dyn SttCallback>;
        self.adapter.start(cb).await
    }

    /// Forwards one audio chunk, enforcing the segment guardrails. An empty
    /// chunk still updates the audio offset but does not count against
    /// limits. On a limit breach the segment is dropped and the send fails.
    pub async fn send_audio(&self, audio: &[u8], audio_offset_ms: i64) -> Result<(), SessionError> {
        let (total_bytes, started_at) = {
            let mut inner = self.locked();
            inner.last_audio_offset_ms = audio_offset_ms;
            inner.audio_bytes += audio.len() as u64;
            (inner.audio_bytes, inner.segment_started_at)
        };

        if !audio.is_empty() {
            if self.limits.max_audio_bytes > 0 && total_bytes > self.limits.max_audio_bytes {
                let reason = format!(
                    "max audio bytes exceeded: {total_bytes} > {}",
                    self.limits.max_audio_bytes
                );
                self.drop_segment(&reason);
                return Err(SessionError::LimitExceeded(reason));
            }

            let elapsed = started_at.elapsed();
            if !self.limits.max_duration.is_zero() && elapsed > self.limits.max_duration {
                let reason = format!(
                    "max duration exceeded: {}ms > {}ms",
                    elapsed.as_millis(),
                    self.limits.max_duration.as_millis()
                );
                self.drop_segment(&reason);
                return Err(SessionError::LimitExceeded(reason));
            }
        }

        self.adapter.send_audio(audio).await?;
        Ok(())
    }

    /// Closes the current segment and the provider session. Idempotent.
    pub async fn close(&self) {
        self.lifecycle.close();
        self.adapter.close().await;
        self.touch();
    }

    /// Abandons the current segment without emitting a final.
    ///
    /// Returns `true` if this call performed the transition.
    pub fn drop_segment(&self, reason: &str) -> bool {
        let segment_id = self.lifecycle.segment_id();
        let previous = self.lifecycle.state();
        let dropped = self.lifecycle.drop_segment();
        if dropped {
            warn!(
                interaction_id = %self.interaction_id,
                %segment_id,
                previous_state = %previous,
                %reason,
                "segment dropped"
            );
        }
        self.touch();
        dropped
    }

    pub fn segment_id(&self) -> String {
        self.lifecycle.segment_id()
    }

    pub fn state(&self) -> State {
        self.lifecycle.state()
    }

    pub fn is_dropped(&self) -> bool {
        self.lifecycle.is_dropped()
    }

    /// Number of completed utterances (rollovers) on this stream.
    pub fn utterance_count(&self) -> u32 {
        self.locked().utterance_count
    }

    pub fn metrics(&self) -> SegmentMetrics {
        let inner = self.locked();
        SegmentMetrics {
            audio_bytes: inner.audio_bytes,
            partial_count: inner.partial_count,
            duration: inner.segment_started_at.elapsed(),
        }
    }

    /// Registers an observer for segment transitions.
    pub fn set_transition_callback(&self, cb: TransitionCallback) {
        self.locked().on_transition = Some(cb);
    }

    /// Waits for pending provider results to settle: returns once the
    /// segment has its final (or is terminal), once `idle_gap` passes with
    /// no callback activity, or at `max_wait`. Used by the driver between
    /// end of client input and teardown so an in-flight final is not lost.
    pub async fn await_quiescent(&self, idle_gap: Duration, max_wait: Duration) {
        let mut activity = self.activity.subscribe();
        let deadline = tokio::time::Instant::now() + max_wait;

        loop {
            let state = self.lifecycle.state();
            if state.is_terminal() || state == State::FinalEmitted {
                return;
            }

            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                return;
            }

            match tokio::time::timeout(idle_gap.min(remaining), activity.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) => return,
                Err(_) => return,
            }
        }
    }

    /// Closes the finished segment, opens the next one and, for
    /// single-utterance providers, restarts the provider session. Runs
    /// inside `on_final`, after publication, so the old receive loop
    /// completes its own call before any new loop can act.
    async fn rollover(&self, restart_provider: bool) {
        let old_segment_id = self.lifecycle.segment_id();
        self.lifecycle.close();

        let new_segment_id = self.segments.next(&self.interaction_id);
        let (utterance, old_bytes, old_partials, old_elapsed, transition) = {
            let mut inner = self.locked();
            inner.utterance_count += 1;
            let old_bytes = inner.audio_bytes;
            let old_partials = inner.partial_count;
            let old_elapsed = inner.segment_started_at.elapsed();
            inner.audio_bytes = 0;
            inner.partial_count = 0;
            inner.segment_started_at = Instant::now();
            (
                inner.utterance_count,
                old_bytes,
                old_partials,
                old_elapsed,
                inner.on_transition.clone(),
            )
        };
        self.lifecycle.reset(new_segment_id.as_str());

        info!(
            interaction_id = %self.interaction_id,
            old_segment = %old_segment_id,
            new_segment = %new_segment_id,
            utterance,
            audio_bytes = old_bytes,
            partials = old_partials,
            elapsed_ms = old_elapsed.as_millis() as u64,
            "segment rollover"
        );

        if restart_provider
            && let Err(err) = self.adapter.restart().await
        {
            warn!(
                interaction_id = %self.interaction_id,
                segment_id = %new_segment_id,
                %err,
                "provider restart failed, dropping segment"
            );
            self.lifecycle.drop_segment();
        }

        if let Some(cb) = transition {
            cb(&new_segment_id);
        }
        self.touch();
    }
}

#[async_trait]
impl SttCallback for SessionHandler {
    async fn on_partial(&self, text: &str) {
        if let Err(err) = self.lifecycle.emit_partial() {
            debug!(
                segment_id = %self.lifecycle.segment_id(),
                state = %self.lifecycle.state(),
                %err,
                "partial ignored"
            );
            self.touch();
            return;
        }

        let count = {
            let mut inner = self.locked();
            inner.partial_count += 1;
            inner.partial_count
        };
        if self.limits.max_partials > 0 && count > self.limits.max_partials {
            let reason = format!("max partials exceeded: {count} > {}", self.limits.max_partials);
            self.drop_segment(&reason);
            return;
        }

        let event = TranscriptPartial {
            event_type: PARTIAL_EVENT_TYPE.to_string(),
            interaction_id: self.interaction_id.clone(),
            tenant_id: self.tenant_id.clone(),
            segment_id: self.lifecycle.segment_id(),
            text: text.to_string(),
            timestamp: unix_timestamp_ms(),
        };
        if let Err(err) = self.sink.publish_partial(&self.interaction_id, event).await {
            warn!(
                interaction_id = %self.interaction_id,
                segment_id = %self.lifecycle.segment_id(),
                %err,
                "failed to publish partial"
            );
        }
        self.touch();
    }

    async fn on_final(&self, text: &str, confidence: f64) {
        if let Err(err) = self.lifecycle.emit_final() {
            debug!(
                segment_id = %self.lifecycle.segment_id(),
                state = %self.lifecycle.state(),
                %err,
                "final ignored"
            );
            self.touch();
            return;
        }

        let audio_offset_ms = self.locked().last_audio_offset_ms;
        let segment_id = self.lifecycle.segment_id();
        let event = TranscriptFinal {
            event_type: FINAL_EVENT_TYPE.to_string(),
            interaction_id: self.interaction_id.clone(),
            tenant_id: self.tenant_id.clone(),
            segment_id: segment_id.clone(),
            text: text.to_string(),
            confidence,
            audio_offset_ms,
            timestamp: unix_timestamp_ms(),
        };
        if let Err(err) = self.sink.publish_final(&self.interaction_id, event).await {
            warn!(
                interaction_id = %self.interaction_id,
                %segment_id,
                %err,
                "failed to publish final"
            );
        }

        // Rollover runs after publication so the closing utterance's receive
        // loop finishes its own work before a replacement loop exists.
        let pending_restart = {
            let mut inner = self.locked();
            std::mem::take(&mut inner.pending_restart)
        };
        if pending_restart {
            self.rollover(true).await;
        } else if self.continuous_mode {
            self.rollover(false).await;
        }
        self.touch();
    }

    async fn on_end_of_utterance(&self) {
        if self.continuous_mode {
            // Finals are the only rollover trigger in continuous mode.
            debug!(
                interaction_id = %self.interaction_id,
                "end of utterance ignored in continuous mode"
            );
            self.touch();
            return;
        }

        // No state transition here: some providers signal end of utterance
        // before delivering the final, and restarting the session first
        // would abandon that final.
        self.locked().pending_restart = true;
        self.touch();
    }

    async fn on_error(&self, err: SttError) {
        let segment_id = self.lifecycle.segment_id();
        let previous = self.lifecycle.state();
        let dropped = self.lifecycle.drop_segment();
        warn!(
            interaction_id = %self.interaction_id,
            %segment_id,
            previous_state = %previous,
            dropped,
            %err,
            "stt error, segment dropped"
        );
        self.touch();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

    use speechgate_events::PublishError;

    use super::*;

    #[derive(Default)]
    struct TestAdapter {
        started: AtomicBool,
        restarts: AtomicU32,
        closed: AtomicBool,
        sent: StdMutex<Vec<Vec<u8>>>,
    }

    #[async_trait]
    impl SttAdapter for TestAdapter {
        async fn start(&self, _cb: Arc<dyn SttCallback>) -> Result<(), SttError> {
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        async fn send_audio(&self, audio: &[u8]) -> Result<(), SttError> {
            self.sent.lock().unwrap().push(audio.to_vec());
            Ok(())
        }

        async fn restart(&self) -> Result<(), SttError> {
            self.restarts.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn close(&self) {
            self.closed.store(true, Ordering::SeqCst);
        }

        fn name(&self) -> &str {
            "test"
        }
    }

    #[derive(Default)]
    struct CollectingSink {
        partials: StdMutex<Vec<TranscriptPartial>>,
        finals: StdMutex<Vec<TranscriptFinal>>,
    }

    #[async_trait]
    impl TranscriptSink for CollectingSink {
        async fn publish_partial(
            &self,
            _key: &str,
            event: TranscriptPartial,
        ) -> Result<(), PublishError> {
            self.partials.lock().unwrap().push(event);
            Ok(())
        }

        async fn publish_final(
            &self,
            _key: &str,
            event: TranscriptFinal,
        ) -> Result<(), PublishError> {
            self.finals.lock().unwrap().push(event);
            Ok(())
        }

        async fn close(&self) {}
    }

    struct FailingSink;

    #[async_trait]
    impl TranscriptSink for FailingSink {
        async fn publish_partial(
            &self,
            _key: &str,
            _event: TranscriptPartial,
        ) -> Result<(), PublishError> {
            Err(PublishError::Transport("bus down".to_string()))
        }

        async fn publish_final(
            &self,
            _key: &str,
            _event: TranscriptFinal,
        ) -> Result<(), PublishError> {
            Err(PublishError::Transport("bus down".to_string()))
        }

        async fn close(&self) {}
    }

    struct Fixture {
        adapter: Arc<TestAdapter>,
        sink: Arc<CollectingSink>,
        handler: Arc<SessionHandler>,
    }

    fn fixture(limits: SegmentLimits, continuous_mode: bool) -> Fixture {
        let adapter = Arc::new(TestAdapter::default());
        let sink = Arc::new(CollectingSink::default());
        let segments = Arc::new(SegmentIdGenerator::new());
        let segment_id = segments.next("int-1");
        let handler = Arc::new(SessionHandler::new(
            adapter.clone(),
            sink.clone(),
            segments,
            "int-1",
            "tenant-1",
            segment_id,
            limits,
            continuous_mode,
        ));
        Fixture {
            adapter,
            sink,
            handler,
        }
    }

    fn loose_limits() -> SegmentLimits {
        SegmentLimits {
            max_audio_bytes: 1024 * 1024,
            max_duration: Duration::from_secs(3600),
            max_partials: 1000,
        }
    }

    #[tokio::test]
    async fn max_audio_bytes_drops_segment_and_fails_send() {
        let limits = SegmentLimits {
            max_audio_bytes: 100,
            ..loose_limits()
        };
        let f = fixture(limits, false);

        f.handler.send_audio(&[0u8; 50], 0).await.unwrap();

        let err = f.handler.send_audio(&[0u8; 60], 100).await.unwrap_err();
        assert!(matches!(err, SessionError::LimitExceeded(_)));
        assert!(f.handler.is_dropped());
        assert_eq!(f.handler.metrics().audio_bytes, 110);
    }

    #[tokio::test]
    async fn max_partials_drops_segment() {
        let limits = SegmentLimits {
            max_partials: 3,
            ..loose_limits()
        };
        let f = fixture(limits, false);

        for _ in 0..3 {
            f.handler.on_partial("partial text").await;
        }
        assert!(!f.handler.is_dropped());

        f.handler.on_partial("one too many").await;
        assert!(f.handler.is_dropped());
        assert_eq!(f.sink.partials.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn max_duration_drops_segment() {
        let limits = SegmentLimits {
            max_duration: Duration::from_millis(50),
            ..loose_limits()
        };
        let f = fixture(limits, false);

        f.handler.send_audio(b"audio", 0).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        let err = f.handler.send_audio(b"audio", 100).await.unwrap_err();
        assert!(matches!(err, SessionError::LimitExceeded(_)));
        assert!(f.handler.is_dropped());
    }

    #[tokio::test]
    async fn eou_then_final_rolls_over_with_restart() {
        let f = fixture(loose_limits(), false);
        f.handler.send_audio(b"audio", 10).await.unwrap();
        f.handler.on_partial("hello").await;

        // EOU alone must not transition anything.
        f.handler.on_end_of_utterance().await;
        assert_eq!(f.handler.state(), State::Open);
        assert_eq!(f.handler.utterance_count(), 0);
        assert_eq!(f.handler.segment_id(), "int-1-seg-1");

        f.handler.on_final("hello world", 0.9).await;

        assert_eq!(f.sink.finals.lock().unwrap().len(), 1);
        assert_eq!(f.handler.segment_id(), "int-1-seg-2");
        assert_eq!(f.handler.state(), State::Open);
        assert_eq!(f.handler.utterance_count(), 1);
        assert_eq!(f.adapter.restarts.load(Ordering::SeqCst), 1);

        // Counters reset for the new segment.
        let metrics = f.handler.metrics();
        assert_eq!(metrics.audio_bytes, 0);
        assert_eq!(metrics.partial_count, 0);
    }

    #[tokio::test]
    async fn continuous_mode_rolls_over_without_restart() {
        let f = fixture(loose_limits(), true);

        f.handler.on_final("first utterance", 0.9).await;
        assert_eq!(f.handler.segment_id(), "int-1-seg-2");
        assert_eq!(f.adapter.restarts.load(Ordering::SeqCst), 0);

        f.handler.on_final("second utterance", 0.9).await;
        assert_eq!(f.handler.segment_id(), "int-1-seg-3");
        assert_eq!(f.handler.utterance_count(), 2);
        assert_eq!(f.sink.finals.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn eou_is_ignored_in_continuous_mode() {
        let f = fixture(loose_limits(), true);

        f.handler.on_end_of_utterance().await;
        f.handler.on_final("utterance", 0.9).await;

        // Had the flag been armed, the rollover would have restarted the
        // provider session.
        assert_eq!(f.adapter.restarts.load(Ordering::SeqCst), 0);
        assert_eq!(f.handler.segment_id(), "int-1-seg-2");
    }

    #[tokio::test]
    async fn final_without_boundary_ends_segment_in_place() {
        let f = fixture(loose_limits(), false);

        f.handler.on_final("only utterance", 0.9).await;

        assert_eq!(f.handler.state(), State::FinalEmitted);
        assert_eq!(f.handler.utterance_count(), 0);
        assert_eq!(f.handler.segment_id(), "int-1-seg-1");
        assert_eq!(f.adapter.restarts.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn duplicate_final_is_suppressed() {
        let f = fixture(loose_limits(), false);

        f.handler.on_final("the final", 0.9).await;
        f.handler.on_final("the final again", 0.9).await;

        let finals = f.sink.finals.lock().unwrap();
        assert_eq!(finals.len(), 1);
        assert_eq!(finals[0].text, "the final");
    }

    #[tokio::test]
    async fn partial_after_final_is_not_published() {
        let f = fixture(loose_limits(), false);

        f.handler.on_final("done", 0.9).await;
        f.handler.on_partial("stale").await;

        assert!(f.sink.partials.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn eou_without_final_never_fires_restart() {
        let f = fixture(loose_limits(), false);
        f.handler.on_partial("hello").await;
        f.handler.on_end_of_utterance().await;

        assert_eq!(f.handler.state(), State::Open);
        assert_eq!(f.adapter.restarts.load(Ordering::SeqCst), 0);

        f.handler.close().await;
        assert_eq!(f.handler.state(), State::Closed);
        assert!(f.sink.finals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn empty_audio_updates_offset_without_counting() {
        let f = fixture(loose_limits(), false);

        f.handler.send_audio(&[], 42).await.unwrap();
        assert_eq!(f.handler.metrics().audio_bytes, 0);

        f.handler.on_final("done", 0.9).await;
        assert_eq!(f.sink.finals.lock().unwrap()[0].audio_offset_ms, 42);
    }

    #[tokio::test]
    async fn stt_error_drops_segment_and_blocks_final() {
        let f = fixture(loose_limits(), false);

        f.handler.on_partial("I want").await;
        f.handler
            .on_error(SttError::ProviderReceive("stream reset".to_string()))
            .await;
        assert!(f.handler.is_dropped());

        f.handler.on_final("never delivered", 0.9).await;
        assert_eq!(f.sink.partials.lock().unwrap().len(), 1);
        assert!(f.sink.finals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn publish_failure_does_not_touch_lifecycle() {
        let adapter = Arc::new(TestAdapter::default());
        let segments = Arc::new(SegmentIdGenerator::new());
        let segment_id = segments.next("int-1");
        let handler = Arc::new(SessionHandler::new(
            adapter,
            Arc::new(FailingSink),
            segments,
            "int-1",
            "tenant-1",
            segment_id,
            loose_limits(),
            false,
        ));

        handler.on_partial("hello").await;
        assert_eq!(handler.state(), State::Open);

        handler.on_final("done", 0.9).await;
        assert_eq!(handler.state(), State::FinalEmitted);
    }

    #[tokio::test]
    async fn transition_callback_observes_new_segment() {
        let f = fixture(loose_limits(), false);
        let seen: Arc<StdMutex<Vec<String>>> = Arc::new(StdMutex::new(Vec::new()));
        let seen_cb = Arc::clone(&seen);
        f.handler.set_transition_callback(Arc::new(move |id| {
            seen_cb.lock().unwrap().push(id.to_string());
        }));

        f.handler.on_end_of_utterance().await;
        f.handler.on_final("done", 0.9).await;

        assert_eq!(*seen.lock().unwrap(), vec!["int-1-seg-2".to_string()]);
    }

    #[tokio::test]
    async fn drop_segment_first_call_wins() {
        let f = fixture(loose_limits(), false);
        assert!(f.handler.drop_segment("first"));
        assert!(!f.handler.drop_segment("second"));
        assert!(f.handler.is_dropped());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_closes_adapter() {
        let f = fixture(loose_limits(), false);
        f.handler.close().await;
        f.handler.close().await;
        assert_eq!(f.handler.state(), State::Closed);
        assert!(f.adapter.closed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn await_quiescent_returns_on_final() {
        let f = fixture(loose_limits(), false);
        let handler = Arc::clone(&f.handler);
        let waiter = tokio::spawn(async move {
            handler
                .await_quiescent(Duration::from_secs(5), Duration::from_secs(5))
                .await;
        });

        tokio::time::sleep(Duration::from_millis(10)).await;
        f.handler.on_final("done", 0.9).await;

        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("drain did not return after final")
            .unwrap();
    }

    #[tokio::test]
    async fn await_quiescent_times_out_on_idle() {
        let f = fixture(loose_limits(), false);
        let started = Instant::now();
        f.handler
            .await_quiescent(Duration::from_millis(30), Duration::from_secs(5))
            .await;
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(f.handler.state(), State::Open);
    }
}
