//! Deterministic mock STT backend for running without cloud credentials.
//!
//! The mock cycles through a fixed table of utterances. Each `send_audio`
//! produces the next partial of the current utterance; the frame that
//! consumes the last partial also produces the final and the end-of-utterance
//! signal, after which the table advances to the next utterance. Closing a
//! session mid-utterance still drains the final for that utterance,
//! simulating a provider that flushes on close.
//!
//! All callbacks are delivered by a single task draining an internal queue,
//! so they fire on a different task than the caller of `send_audio` and are
//! totally ordered like a real provider receive loop.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::mpsc;

use super::{SttAdapter, SttCallback, SttError};
use async_trait::async_trait;

/// A scripted utterance with progressive partial transcripts.
#[derive(Debug, Clone, Copy)]
pub struct SimulatedUtterance {
    pub partials: &'static [&'static str],
    pub final_text: &'static str,
    pub confidence: f64,
}

/// Sample utterances the mock cycles through.
pub const DEFAULT_UTTERANCES: &[SimulatedUtterance] = &[
    SimulatedUtterance {
        partials: &["I want", "I want to", "I want to cancel"],
        final_text: "I want to cancel my subscription",
        confidence: 0.94,
    },
    SimulatedUtterance {
        partials: &["Yes", "Yes please"],
        final_text: "Yes please go ahead",
        confidence: 0.97,
    },
    SimulatedUtterance {
        partials: &["Can you", "Can you help", "Can you help me with"],
        final_text: "Can you help me with my account",
        confidence: 0.91,
    },
    SimulatedUtterance {
        partials: &["I've been", "I've been waiting", "I've been waiting for"],
        final_text: "I've been waiting for over an hour",
        confidence: 0.89,
    },
    SimulatedUtterance {
        partials: &["Thank you"],
        final_text: "Thank you very much",
        confidence: 0.98,
    },
];

enum MockEvent {
    Partial(&'static str),
    Final(&'static str, f64),
    EndOfUtterance,
    Error(String),
}

struct MockState {
    cb: Option<Arc<dyn SttCallback>>,
    queue: Option<mpsc::UnboundedSender<MockEvent>>,
    utterance: usize,
    partial_index: usize,
    final_sent: bool,
    partials_emitted: usize,
    closed: bool,
}

/// Mock implementation of [`SttAdapter`].
pub struct MockSttAdapter {
    delay: Duration,
    fail_after_partials: Option<usize>,
    state: Mutex<MockState>,
}

impl Default for MockSttAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSttAdapter {
    pub fn new() -> Self {
        Self::with_delay(Duration::from_millis(25))
    }

    /// Creates a mock with a custom callback delivery delay.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            fail_after_partials: None,
            state: Mutex::new(MockState {
                cb: None,
                queue: None,
                utterance: 0,
                partial_index: 0,
                final_sent: false,
                partials_emitted: 0,
                closed: false,
            }),
        }
    }

    /// Raises `on_error` instead of further results once `count` partials
    /// have been delivered. For exercising failure paths.
    pub fn with_failure_after_partials(mut self, count: usize) -> Self {
        self.fail_after_partials = Some(count);
        self
    }

    fn locked(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn spawn_delivery(cb: Arc<dyn SttCallback>, delay: Duration) -> mpsc::UnboundedSender<MockEvent> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                match event {
                    MockEvent::Partial(text) => cb.on_partial(text).await,
                    MockEvent::Final(text, confidence) => cb.on_final(text, confidence).await,
                    MockEvent::EndOfUtterance => cb.on_end_of_utterance().await,
                    MockEvent::Error(message) => {
                        cb.on_error(SttError::ProviderReceive(message)).await;
                    }
                }
            }
        });
        tx
    }

    fn current(state: &MockState) -> SimulatedUtterance {
        DEFAULT_UTTERANCES[state.utterance % DEFAULT_UTTERANCES.len()]
    }

    fn advance(state: &mut MockState) {
        state.utterance += 1;
        state.partial_index = 0;
        state.final_sent = false;
    }
}

#[async_trait]
impl SttAdapter for MockSttAdapter {
    async fn start(&self, cb: Arc<dyn SttCallback>) -> Result<(), SttError> {
        let mut state = self.locked();
        state.queue = Some(Self::spawn_delivery(Arc::clone(&cb), self.delay));
        state.cb = Some(cb);
        Ok(())
    }

    async fn send_audio(&self, audio: &[u8]) -> Result<(), SttError> {
        if audio.is_empty() {
            return Ok(());
        }

        let mut state = self.locked();
        if state.closed {
            return Ok(());
        }
        let Some(queue) = state.queue.clone() else {
            return Ok(());
        };

        if let Some(limit) = self.fail_after_partials
            && state.partials_emitted >= limit
        {
            let _ = queue.send(MockEvent::Error("simulated provider failure".to_string()));
            return Ok(());
        }

        let utterance = Self::current(&state);
        if state.partial_index < utterance.partials.len() {
            let text = utterance.partials[state.partial_index];
            state.partial_index += 1;
            state.partials_emitted += 1;
            let _ = queue.send(MockEvent::Partial(text));
        }

        // Last partial consumed: the utterance completes like silence
        // detection had fired.
        if state.partial_index >= utterance.partials.len() && !state.final_sent {
            state.final_sent = true;
            let _ = queue.send(MockEvent::Final(utterance.final_text, utterance.confidence));
            let _ = queue.send(MockEvent::EndOfUtterance);
            Self::advance(&mut state);
        }

        Ok(())
    }

    async fn restart(&self) -> Result<(), SttError> {
        let mut state = self.locked();
        if state.closed {
            return Err(SttError::ProviderStart("mock session closed".to_string()));
        }
        let Some(cb) = state.cb.clone() else {
            return Err(SttError::ProviderStart(
                "mock restart before start".to_string(),
            ));
        };

        // An in-progress utterance is abandoned by the session cutover.
        if state.partial_index > 0 {
            Self::advance(&mut state);
        }

        // Dropping the old sender lets the previous delivery task drain its
        // queued events and exit.
        state.queue = Some(Self::spawn_delivery(cb, self.delay));
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.locked();
        if state.closed {
            return;
        }
        state.closed = true;

        // Drain: an utterance that produced partials but no final yet still
        // gets its final.
        if state.partial_index > 0
            && !state.final_sent
            && let Some(queue) = state.queue.as_ref()
        {
            let utterance = Self::current(&state);
            let _ = queue.send(MockEvent::Final(utterance.final_text, utterance.confidence));
        }

        state.queue = None;
        state.cb = None;
    }

    fn name(&self) -> &str {
        "mock"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Event {
        Partial(String),
        Final(String, f64),
        Eou,
        Error(String),
    }

    #[derive(Default)]
    struct Recorder {
        events: StdMutex<Vec<Event>>,
    }

    impl Recorder {
        fn snapshot(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }

        async fn wait_until(&self, count: usize) -> Vec<Event> {
            for _ in 0..400 {
                let events = self.snapshot();
                if events.len() >= count {
                    return events;
                }
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
            panic!(
                "timed out waiting for {count} events, got {:?}",
                self.snapshot()
            );
        }
    }

    #[async_trait]
    impl SttCallback for Recorder {
        async fn on_partial(&self, text: &str) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Partial(text.to_string()));
        }

        async fn on_final(&self, text: &str, confidence: f64) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Final(text.to_string(), confidence));
        }

        async fn on_end_of_utterance(&self) {
            self.events.lock().unwrap().push(Event::Eou);
        }

        async fn on_error(&self, err: SttError) {
            self.events
                .lock()
                .unwrap()
                .push(Event::Error(err.to_string()));
        }
    }

    fn adapter() -> MockSttAdapter {
        MockSttAdapter::with_delay(Duration::from_millis(1))
    }

    #[tokio::test]
    async fn emits_partials_then_final_and_eou_in_order() {
        let adapter = adapter();
        let recorder = Arc::new(Recorder::default());
        adapter.start(recorder.clone()).await.unwrap();

        for frame in [b"hi1".as_slice(), b"hi2", b"hi3"] {
            adapter.send_audio(frame).await.unwrap();
        }

        let events = recorder.wait_until(5).await;
        assert_eq!(
            events,
            vec![
                Event::Partial("I want".to_string()),
                Event::Partial("I want to".to_string()),
                Event::Partial("I want to cancel".to_string()),
                Event::Final("I want to cancel my subscription".to_string(), 0.94),
                Event::Eou,
            ]
        );
    }

    #[tokio::test]
    async fn close_drains_final_for_in_progress_utterance() {
        let adapter = adapter();
        let recorder = Arc::new(Recorder::default());
        adapter.start(recorder.clone()).await.unwrap();

        adapter.send_audio(b"hi1").await.unwrap();
        adapter.send_audio(b"hi2").await.unwrap();
        adapter.close().await;

        let events = recorder.wait_until(3).await;
        assert_eq!(
            events,
            vec![
                Event::Partial("I want".to_string()),
                Event::Partial("I want to".to_string()),
                Event::Final("I want to cancel my subscription".to_string(), 0.94),
            ]
        );
    }

    #[tokio::test]
    async fn advances_to_next_utterance_after_completion() {
        let adapter = adapter();
        let recorder = Arc::new(Recorder::default());
        adapter.start(recorder.clone()).await.unwrap();

        for _ in 0..5 {
            adapter.send_audio(b"audio").await.unwrap();
        }

        // Utterance 1: 3 partials + final + EOU; utterance 2: 2 partials +
        // final + EOU.
        let events = recorder.wait_until(9).await;
        assert_eq!(events[5], Event::Partial("Yes".to_string()));
        assert_eq!(events[6], Event::Partial("Yes please".to_string()));
        assert_eq!(events[7], Event::Final("Yes please go ahead".to_string(), 0.97));
        assert_eq!(events[8], Event::Eou);
    }

    #[tokio::test]
    async fn restart_abandons_in_progress_utterance() {
        let adapter = adapter();
        let recorder = Arc::new(Recorder::default());
        adapter.start(recorder.clone()).await.unwrap();

        adapter.send_audio(b"hi1").await.unwrap();
        adapter.restart().await.unwrap();
        adapter.send_audio(b"hi2").await.unwrap();

        let events = recorder.wait_until(2).await;
        assert_eq!(events[0], Event::Partial("I want".to_string()));
        assert_eq!(events[1], Event::Partial("Yes".to_string()));
    }

    #[tokio::test]
    async fn empty_audio_is_a_noop() {
        let adapter = adapter();
        let recorder = Arc::new(Recorder::default());
        adapter.start(recorder.clone()).await.unwrap();

        adapter.send_audio(&[]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(recorder.snapshot().is_empty());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_stops_results() {
        let adapter = adapter();
        let recorder = Arc::new(Recorder::default());
        adapter.start(recorder.clone()).await.unwrap();

        adapter.close().await;
        adapter.close().await;
        adapter.send_audio(b"hi").await.unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(recorder.snapshot().is_empty());
    }

    #[tokio::test]
    async fn failure_knob_raises_on_error() {
        let adapter =
            MockSttAdapter::with_delay(Duration::from_millis(1)).with_failure_after_partials(1);
        let recorder = Arc::new(Recorder::default());
        adapter.start(recorder.clone()).await.unwrap();

        adapter.send_audio(b"hi1").await.unwrap();
        adapter.send_audio(b"hi2").await.unwrap();

        let events = recorder.wait_until(2).await;
        assert_eq!(events[0], Event::Partial("I want".to_string()));
        assert!(matches!(events[1], Event::Error(_)));
    }
}
