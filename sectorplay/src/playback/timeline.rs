//! Presentation clocks
//!
//! A Timeline is the abstract play clock every stage synchronizes against.
//! The system-clock variant derives position from a monotonic clock minus
//! accumulated paused time and is used only when there is no audio track.
//! The audio-clock variant derives position from the sample frames the audio
//! sink has actually consumed, so buffer underrun freezes position without an
//! explicit pause; it is the source of truth for A/V sync whenever audio
//! exists.

use crate::config::PlayerTuning;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

/// Play-clock state; Terminated is absorbing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimelineState {
    /// Position frozen; waiters blocked
    Paused,

    /// Position advancing
    Running,

    /// Session over; all waits return Closed
    Terminated,
}

/// Result of waiting for a unit's presentation time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentOutcome {
    /// The unit's time has arrived (within the fudge window)
    Present,

    /// The timeline terminated while waiting
    Closed,
}

/// Abstract presentation clock
pub trait Timeline: Send + Sync {
    /// Start or resume the clock (Paused -> Running)
    ///
    /// Returns whether the clock actually transitioned, decided under the
    /// clock's own lock so a caller can pair exactly one side effect (such as
    /// an event emission) with exactly one state change.
    fn go(&self) -> bool;

    /// Freeze the clock (Running -> Paused)
    ///
    /// Returns whether the clock actually transitioned, like [`Timeline::go`].
    fn pause(&self) -> bool;

    /// End the session (any -> Terminated, absorbing); wakes all waiters
    fn terminate(&self);

    /// Current state
    fn state(&self) -> TimelineState;

    /// Elapsed presentation nanoseconds since logical start, frozen while
    /// Paused
    fn position(&self) -> i64;

    /// Cheap check used by the decode stage to skip units whose time has
    /// already passed; never blocks
    fn should_decode(&self, presentation_ns: i64) -> bool {
        presentation_ns >= self.position()
    }

    /// Block until the given presentation time (or return Closed)
    ///
    /// Blocks through pauses; wakes within one bounded-wait interval of any
    /// state change.
    fn wait_to_present(&self, presentation_ns: i64) -> PresentOutcome;

    /// Whether the clock is paused
    fn is_paused(&self) -> bool {
        self.state() == TimelineState::Paused
    }

    /// Whether the clock has terminated
    fn is_terminated(&self) -> bool {
        self.state() == TimelineState::Terminated
    }
}

struct SystemClockInner {
    state: TimelineState,
    /// Instant of the last go(); meaningful only while Running
    resumed_at: Instant,
    /// Running time accumulated across previous Running spans
    accumulated: Duration,
}

impl SystemClockInner {
    fn position_ns(&self) -> i64 {
        let total = match self.state {
            TimelineState::Running => self.accumulated + self.resumed_at.elapsed(),
            _ => self.accumulated,
        };
        total.as_nanos() as i64
    }
}

/// Wall-clock timeline for audio-less media
///
/// Starts Paused at position zero.
pub struct SystemTimeline {
    inner: Mutex<SystemClockInner>,
    condvar: Condvar,
    fudge_ns: i64,
    poll: Duration,
}

impl SystemTimeline {
    /// Create a paused system-clock timeline
    pub fn new(tuning: &PlayerTuning) -> Self {
        Self {
            inner: Mutex::new(SystemClockInner {
                state: TimelineState::Paused,
                resumed_at: Instant::now(),
                accumulated: Duration::ZERO,
            }),
            condvar: Condvar::new(),
            fudge_ns: tuning.present_fudge_ns(),
            poll: tuning.wait_poll(),
        }
    }
}

impl Timeline for SystemTimeline {
    fn go(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != TimelineState::Paused {
            return false;
        }
        inner.state = TimelineState::Running;
        inner.resumed_at = Instant::now();
        debug!("System timeline running at {}ns", inner.position_ns());
        self.condvar.notify_all();
        true
    }

    fn pause(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != TimelineState::Running {
            return false;
        }
        let ran = inner.resumed_at.elapsed();
        inner.accumulated += ran;
        inner.state = TimelineState::Paused;
        debug!("System timeline paused at {}ns", inner.position_ns());
        self.condvar.notify_all();
        true
    }

    fn terminate(&self) {
        let mut inner = self.inner.lock().unwrap();
        if inner.state != TimelineState::Terminated {
            if inner.state == TimelineState::Running {
                let ran = inner.resumed_at.elapsed();
                inner.accumulated += ran;
            }
            inner.state = TimelineState::Terminated;
            self.condvar.notify_all();
        }
    }

    fn state(&self) -> TimelineState {
        self.inner.lock().unwrap().state
    }

    fn position(&self) -> i64 {
        self.inner.lock().unwrap().position_ns()
    }

    fn wait_to_present(&self, presentation_ns: i64) -> PresentOutcome {
        let mut inner = self.inner.lock().unwrap();
        loop {
            match inner.state {
                TimelineState::Terminated => return PresentOutcome::Closed,
                TimelineState::Paused => {
                    let (guard, _timed_out) = self.condvar.wait_timeout(inner, self.poll).unwrap();
                    inner = guard;
                    continue;
                }
                TimelineState::Running => {}
            }

            let remaining = presentation_ns - inner.position_ns() - self.fudge_ns;
            if remaining <= 0 {
                return PresentOutcome::Present;
            }

            let sleep = Duration::from_nanos(remaining as u64).min(self.poll);
            let (guard, _timed_out) = self.condvar.wait_timeout(inner, sleep).unwrap();
            inner = guard;
        }
    }
}

/// Audio-clock timeline
///
/// Position is the number of sample frames the audio sink has actually
/// consumed, scaled to nanoseconds. Starvation of the sink stalls the
/// counter and thereby freezes position with no explicit pause. `go()` and
/// `pause()` gate the shared `running` flag the sink consults before
/// consuming.
pub struct AudioTimeline {
    state: Mutex<TimelineState>,
    condvar: Condvar,
    /// Frames consumed by the sink; written on the audio callback path
    consumed_frames: Arc<AtomicU64>,
    /// Gate the sink consults before consuming frames
    running: Arc<AtomicBool>,
    sample_rate: u32,
    fudge_ns: i64,
    poll: Duration,
}

impl AudioTimeline {
    /// Create a paused audio-clock timeline
    ///
    /// `consumed_frames` and `running` are shared with the audio sink.
    pub fn new(
        tuning: &PlayerTuning,
        sample_rate: u32,
        consumed_frames: Arc<AtomicU64>,
        running: Arc<AtomicBool>,
    ) -> Self {
        running.store(false, Ordering::Release);
        Self {
            state: Mutex::new(TimelineState::Paused),
            condvar: Condvar::new(),
            consumed_frames,
            running,
            sample_rate,
            fudge_ns: tuning.present_fudge_ns(),
            poll: tuning.wait_poll(),
        }
    }
}

impl Timeline for AudioTimeline {
    fn go(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != TimelineState::Paused {
            return false;
        }
        *state = TimelineState::Running;
        self.running.store(true, Ordering::Release);
        debug!("Audio timeline running at {}ns", self.position());
        self.condvar.notify_all();
        true
    }

    fn pause(&self) -> bool {
        let mut state = self.state.lock().unwrap();
        if *state != TimelineState::Running {
            return false;
        }
        *state = TimelineState::Paused;
        self.running.store(false, Ordering::Release);
        debug!("Audio timeline paused at {}ns", self.position());
        self.condvar.notify_all();
        true
    }

    fn terminate(&self) {
        let mut state = self.state.lock().unwrap();
        if *state != TimelineState::Terminated {
            *state = TimelineState::Terminated;
            self.running.store(false, Ordering::Release);
            self.condvar.notify_all();
        }
    }

    fn state(&self) -> TimelineState {
        *self.state.lock().unwrap()
    }

    fn position(&self) -> i64 {
        let frames = self.consumed_frames.load(Ordering::Acquire);
        (frames as i128 * 1_000_000_000 / self.sample_rate as i128) as i64
    }

    fn wait_to_present(&self, presentation_ns: i64) -> PresentOutcome {
        let mut state = self.state.lock().unwrap();
        loop {
            match *state {
                TimelineState::Terminated => return PresentOutcome::Closed,
                TimelineState::Paused => {
                    let (guard, _timed_out) = self.condvar.wait_timeout(state, self.poll).unwrap();
                    state = guard;
                    continue;
                }
                TimelineState::Running => {}
            }

            let remaining = presentation_ns - self.position() - self.fudge_ns;
            if remaining <= 0 {
                return PresentOutcome::Present;
            }

            // Never sleep the full remainder: the audio clock can stall on
            // underrun, so re-check within the bounded-wait interval
            let sleep = Duration::from_nanos(remaining as u64).min(self.poll);
            let (guard, _timed_out) = self.condvar.wait_timeout(state, sleep).unwrap();
            state = guard;
        }
    }
}
