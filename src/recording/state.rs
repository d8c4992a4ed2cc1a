//! Recording state machine.
//!
//! All transitions go through [`reduce`], which returns the next state plus
//! the effects the caller must execute. Keeping the transition table pure
//! makes every path testable without touching audio hardware.

use std::time::{Duration, Instant};

/// Countdown length in seconds before recording begins.
pub const COUNTDOWN_START: u8 = 3;

/// The authoritative recording state. Exactly one value at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingState {
    /// No recording in progress; an artifact may be held from a prior session
    Idle,
    /// Counting down to recording start, `n` seconds remaining
    CountingDown(u8),
    Recording,
    Paused,
}

/// Events that can trigger state transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingEvent {
    /// User requested a new recording
    Start,
    /// One second of the countdown elapsed
    CountdownTick,
    /// User paused an active recording
    Pause,
    /// User resumed a paused recording
    Resume,
    /// User stopped the recording ("Done" while paused)
    Stop,
    /// User discarded the artifact (or aborted an active recording)
    Delete,
}

/// Side effects the caller executes after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    StartCountdown,
    CancelCountdown,
    OpenSession,
    StartSampler,
    PauseRecorder,
    ResumeRecorder,
    StopSampler,
    StopSession,
    /// Tear the capture down without finalizing an artifact
    AbortSession,
    ClearArtifact,
}

/// Applies one event to the current state.
///
/// Events that make no sense in the current state (pausing while idle,
/// starting mid-countdown) leave the state unchanged with no effects.
///
/// Deleting while Recording or Paused force-stops the capture so the
/// microphone is released, discarding the take instead of finalizing it.
pub fn reduce(state: RecordingState, event: RecordingEvent) -> (RecordingState, Vec<Effect>) {
    reduce_from(state, event, COUNTDOWN_START)
}

/// [`reduce`] with a configurable countdown length.
pub fn reduce_from(
    state: RecordingState,
    event: RecordingEvent,
    countdown_from: u8,
) -> (RecordingState, Vec<Effect>) {
    use Effect::*;
    use RecordingEvent::*;
    use RecordingState::*;

    match (state, event) {
        (Idle, Start) => (CountingDown(countdown_from.max(1)), vec![StartCountdown]),

        (CountingDown(n), CountdownTick) if n > 1 => (CountingDown(n - 1), vec![]),
        // The timer is cancelled before the session opens so a stray extra
        // tick can never start a second capture.
        (CountingDown(_), CountdownTick) => {
            (Recording, vec![CancelCountdown, OpenSession, StartSampler])
        }

        (Recording, Pause) => (Paused, vec![PauseRecorder]),
        (Paused, Resume) => (Recording, vec![ResumeRecorder]),

        (Recording, Stop) | (Paused, Stop) => (Idle, vec![StopSampler, StopSession]),

        (Recording, Delete) | (Paused, Delete) => {
            (Idle, vec![StopSampler, AbortSession, ClearArtifact])
        }
        (CountingDown(_), Delete) => (Idle, vec![CancelCountdown, ClearArtifact]),
        (Idle, Delete) => (Idle, vec![ClearArtifact]),

        (state, event) => {
            tracing::debug!(?state, ?event, "Ignoring event with no transition");
            (state, vec![])
        }
    }
}

/// Repeating one-second timer driving the countdown.
///
/// Polled from the render loop rather than running on its own thread; at most
/// one tick is reported per elapsed second. Dropping the timer (the
/// `CancelCountdown` effect) guarantees no further ticks fire.
pub struct CountdownTimer {
    next_tick: Instant,
    interval: Duration,
}

impl CountdownTimer {
    pub fn start() -> Self {
        Self::with_interval(Duration::from_secs(1))
    }

    /// Timer with a custom tick interval, for tests.
    pub fn with_interval(interval: Duration) -> Self {
        Self {
            next_tick: Instant::now() + interval,
            interval,
        }
    }

    /// Reports whether a tick is due, advancing the deadline if so.
    pub fn poll(&mut self) -> bool {
        if Instant::now() >= self.next_tick {
            self.next_tick += self.interval;
            true
        } else {
            false
        }
    }
}
