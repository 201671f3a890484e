//! Single-slot debounce timer with a running guard.
//!
//! ```text
//!           arm                 deadline passed           finish
//! Idle ──────────▶ Pending ───────────────────▶ Running ─────────▶ Idle
//!                  ▲   │ arm (restart)             │ arm            │
//!                  │   └──────────┘                ▼                │
//!                  └──────────────────────── Running{rearm} ────────┘
//!                              finish (re-armed)
//! ```
//!
//! Time is passed in by the caller, so the machine is deterministic under
//! test. A notification that arrives while a run is in flight does not start
//! a timer; it marks the run for re-arming, and the timer starts only when the
//! run finishes.
//!
//! [`crate::session::MergeSession`] runs merges synchronously inside `poll`,
//! so through it `Running` is never observed by `arm`. The guard matters to
//! embedders that drive a `Debouncer` directly and run the merge elsewhere
//! (another thread, an async task) between `begin_run` and `finish_run`.

use std::time::{Duration, Instant};

use tracing::trace;

/// Where the debouncer currently is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DebounceState {
    Idle,
    Pending { deadline: Instant },
    Running { rearm: bool },
}

/// What [`Debouncer::arm`] did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Armed {
    /// The timer (re)starts and fires at this instant.
    Scheduled(Instant),
    /// A run is in flight; the timer starts when it finishes.
    Deferred,
}

#[derive(Clone, Debug)]
pub struct Debouncer {
    delay: Duration,
    state: DebounceState,
}

impl Debouncer {
    #[must_use]
    pub const fn new(delay: Duration) -> Self {
        Self {
            delay,
            state: DebounceState::Idle,
        }
    }

    #[must_use]
    pub const fn delay(&self) -> Duration {
        self.delay
    }

    #[must_use]
    pub const fn state(&self) -> DebounceState {
        self.state
    }

    /// Cancel any pending timer and start a new one, unless a run is in flight.
    pub fn arm(&mut self, now: Instant) -> Armed {
        match self.state {
            DebounceState::Running { .. } => {
                self.state = DebounceState::Running { rearm: true };
                trace!("run in flight, re-arm deferred");
                Armed::Deferred
            }
            DebounceState::Idle | DebounceState::Pending { .. } => {
                let deadline = now + self.delay;
                self.state = DebounceState::Pending { deadline };
                Armed::Scheduled(deadline)
            }
        }
    }

    /// The pending deadline, if a timer is armed.
    #[must_use]
    pub const fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            DebounceState::Pending { deadline } => Some(deadline),
            _ => None,
        }
    }

    /// Whether the armed timer has fired by `now`.
    #[must_use]
    pub fn due(&self, now: Instant) -> bool {
        self.next_deadline().is_some_and(|d| now >= d)
    }

    /// Move `Pending → Running`. Returns `false` (and changes nothing) from
    /// any other state.
    pub fn begin_run(&mut self) -> bool {
        if matches!(self.state, DebounceState::Pending { .. }) {
            self.state = DebounceState::Running { rearm: false };
            true
        } else {
            false
        }
    }

    /// Leave `Running`. The timer is re-armed from `now` if a notification
    /// arrived during the run or `retry` is set; otherwise the machine idles.
    pub fn finish_run(&mut self, now: Instant, retry: bool) -> Option<Instant> {
        let rearm = matches!(self.state, DebounceState::Running { rearm: true });
        self.state = DebounceState::Idle;
        if rearm || retry {
            let deadline = now + self.delay;
            self.state = DebounceState::Pending { deadline };
            Some(deadline)
        } else {
            None
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
