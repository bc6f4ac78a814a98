//! Session crediting.
//!
//! The tracker holds the one context currently being timed. Every session
//! boundary (tab switch, window blur, idle transition) closes the running
//! session and, if it lasted long enough, turns it into an [`Interval`].

use chrono::{DateTime, Utc};

use crate::types::{ActiveSession, Context, Interval};

/// Sessions shorter than this many seconds are dropped.
pub const DEFAULT_MIN_SECONDS_TO_LOG: u64 = 5;

/// What closing the previous session produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credit {
    /// The previous session became an interval.
    Interval(Interval),
    /// The previous session was below the minimum and was dropped.
    TooShort { site: String, seconds: u64 },
    /// Nothing was being timed.
    Idle,
}

impl Credit {
    /// Returns the credited interval, if any.
    #[must_use]
    pub fn into_interval(self) -> Option<Interval> {
        match self {
            Self::Interval(interval) => Some(interval),
            Self::TooShort { .. } | Self::Idle => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Active(ActiveSession),
    Idle { since: DateTime<Utc> },
}

/// Converts context transitions into completed intervals.
#[derive(Debug, Clone)]
pub struct SessionTracker {
    state: State,
    min_seconds_to_log: u64,
}

impl SessionTracker {
    /// Creates an idle tracker.
    pub fn new(min_seconds_to_log: u64, now: DateTime<Utc>) -> Self {
        Self {
            state: State::Idle { since: now },
            min_seconds_to_log,
        }
    }

    /// The session currently being timed, or `None` when idle.
    pub fn active(&self) -> Option<&ActiveSession> {
        match &self.state {
            State::Active(session) => Some(session),
            State::Idle { .. } => None,
        }
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, State::Idle { .. })
    }

    /// When the current session (or idle period) began.
    pub fn since(&self) -> DateTime<Utc> {
        match &self.state {
            State::Active(session) => session.started_at,
            State::Idle { since } => *since,
        }
    }

    pub fn min_seconds_to_log(&self) -> u64 {
        self.min_seconds_to_log
    }

    /// Closes the running session and starts timing `next`.
    ///
    /// `None` (focus lost, idle, no tab) credits the previous session and
    /// leaves the tracker idle. A context with an empty URL counts as `None`.
    /// Repeated transitions to the same site are not coalesced.
    pub fn on_context_change(&mut self, next: Option<Context>, now: DateTime<Utc>) -> Credit {
        let next_state = match next.filter(|context| !context.url.is_empty()) {
            Some(context) => State::Active(ActiveSession::start(context, now)),
            None => State::Idle { since: now },
        };

        match std::mem::replace(&mut self.state, next_state) {
            State::Idle { .. } => Credit::Idle,
            State::Active(session) => {
                let seconds = elapsed_seconds(session.started_at, now);
                if seconds < self.min_seconds_to_log {
                    tracing::trace!(site = %session.site, seconds, "session too short, dropped");
                    return Credit::TooShort {
                        site: session.site,
                        seconds,
                    };
                }
                Credit::Interval(Interval {
                    site: session.site,
                    url: session.url,
                    title: session.title,
                    date: now.date_naive(),
                    duration_seconds: seconds,
                })
            }
        }
    }
}

/// Whole seconds between `start` and `now`; a clock that went backwards yields 0.
fn elapsed_seconds(start: DateTime<Utc>, now: DateTime<Utc>) -> u64 {
    u64::try_from((now - start).num_seconds()).unwrap_or(0)
}
