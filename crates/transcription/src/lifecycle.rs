//! Segment lifecycle state machine.
//!
//! One `State` value behind one mutex is the single source of truth for what
//! a segment may still emit. The two producers racing on it (the RPC read
//! loop and the provider receive loop) must call a transition method and
//! branch on its result; inspecting the state and then acting is not safe.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use thiserror::Error;

/// Lifecycle state of a segment.
///
/// ```text
/// OPEN ──emit_final──▶ FINAL_EMITTED ──close──▶ CLOSED
///   │                        │
///   └────────drop────────────┴──▶ DROPPED
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Segment is active and may emit partials.
    Open,
    /// The final transcript has been emitted; waiting to close.
    FinalEmitted,
    /// Segment ended normally.
    Closed,
    /// Segment was abandoned; no final has been or will be emitted.
    Dropped,
}

impl State {
    pub fn is_terminal(self) -> bool {
        matches!(self, State::Closed | State::Dropped)
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            State::Open => "OPEN",
            State::FinalEmitted => "FINAL_EMITTED",
            State::Closed => "CLOSED",
            State::Dropped => "DROPPED",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("segment is closed")]
    Closed,
    #[error("final already emitted for this segment")]
    AlreadyFinal,
    #[error("cannot emit partial after final")]
    NotAfterFinal,
}

struct Inner {
    segment_id: String,
    state: State,
}

/// Thread-safe lifecycle for a single segment.
pub struct Lifecycle {
    inner: Mutex<Inner>,
}

impl Lifecycle {
    /// Creates a lifecycle in `OPEN` state.
    pub fn new(segment_id: impl Into<String>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                segment_id: segment_id.into(),
                state: State::Open,
            }),
        }
    }

    fn locked(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn segment_id(&self) -> String {
        self.locked().segment_id.clone()
    }

    pub fn state(&self) -> State {
        self.locked().state
    }

    pub fn is_terminal(&self) -> bool {
        self.locked().state.is_terminal()
    }

    pub fn is_dropped(&self) -> bool {
        self.locked().state == State::Dropped
    }

    /// Validates a partial emission. The state does not change.
    pub fn emit_partial(&self) -> Result<(), LifecycleError> {
        let inner = self.locked();
        match inner.state {
            State::Open => Ok(()),
            State::FinalEmitted => Err(LifecycleError::NotAfterFinal),
            State::Closed | State::Dropped => Err(LifecycleError::Closed),
        }
    }

    /// Validates a final emission and transitions to `FINAL_EMITTED`.
    pub fn emit_final(&self) -> Result<(), LifecycleError> {
        let mut inner = self.locked();
        match inner.state {
            State::Open => {
                inner.state = State::FinalEmitted;
                Ok(())
            }
            State::FinalEmitted => Err(LifecycleError::AlreadyFinal),
            State::Closed | State::Dropped => Err(LifecycleError::Closed),
        }
    }

    /// Abandons the segment: no final has been or will be emitted after this.
    ///
    /// Returns `true` if this call performed the transition, `false` if the
    /// segment was already in a terminal state.
    pub fn drop_segment(&self) -> bool {
        let mut inner = self.locked();
        if inner.state.is_terminal() {
            return false;
        }
        inner.state = State::Dropped;
        true
    }

    /// Transitions to `CLOSED`. Callable from any state, idempotent.
    pub fn close(&self) {
        self.locked().state = State::Closed;
    }

    /// Re-opens the machine for a new segment at a rollover boundary.
    /// Overwrites the id and state atomically.
    pub fn reset(&self, new_segment_id: impl Into<String>) {
        let mut inner = self.locked();
        inner.segment_id = new_segment_id.into();
        inner.state = State::Open;
    }
}
