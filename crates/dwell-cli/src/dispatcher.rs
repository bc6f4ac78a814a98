//! Event dispatch: browser signals in, credited intervals and flushes out.
//!
//! [`Dispatcher::handle`] is a synchronous state transition per event. The
//! async [`Dispatcher::run`] loop multiplexes the event source, the flush
//! ticker and at most one in-flight upload. Uploads run on a spawned task, so
//! events keep being credited into the buffer while a request is pending.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use dwell_core::{Context, Credential, Credit, PendingBuffer, SessionTracker, StateStore, TokenStore};
use dwell_upload::{Collector, FlushClient, FlushJob, FlushReport, Receipt, UploadError};

use crate::source::EventSource;

/// Idle detector states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdleState {
    Active,
    Idle,
    Locked,
}

/// A browser signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BrowserEvent {
    /// A tab became active. `tab` is `None` when the tab could not be looked up.
    TabActivated {
        #[serde(default)]
        tab: Option<Context>,
    },
    /// A tab changed. Only completed navigations of the active tab that
    /// carry a URL count.
    TabUpdated {
        tab: Context,
        #[serde(default)]
        complete: bool,
        #[serde(default)]
        active: bool,
    },
    /// Window focus moved. `tab` is the focused window's active tab, or
    /// `None` when no browser window has focus.
    WindowFocusChanged {
        #[serde(default)]
        tab: Option<Context>,
    },
    IdleStateChanged { state: IdleState },
    SetToken { token: String },
    ClearToken,
    FlushNow,
}

/// What the caller must do after [`Dispatcher::handle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    Nothing,
    /// Start a flush if none is in flight.
    Flush,
    /// Look up the focused tab and pass it to [`Dispatcher::context_changed`].
    QueryActiveContext,
}

/// Counters for one [`Dispatcher::run`].
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub events: usize,
    pub delivered: usize,
    pub restored: usize,
}

impl RunSummary {
    fn record(&mut self, report: &FlushReport) {
        match report {
            FlushReport::Delivered { count, .. } => self.delivered += count,
            FlushReport::Restored { count, .. } => self.restored += count,
            FlushReport::Skipped(_) => {}
        }
    }
}

struct InFlight {
    job: FlushJob,
    handle: JoinHandle<Result<Receipt, UploadError>>,
}

/// Wires events to the session tracker, the buffer and the flush client.
pub struct Dispatcher<S, C> {
    tracker: SessionTracker,
    buffer: PendingBuffer<S>,
    tokens: TokenStore<S>,
    flusher: FlushClient<C>,
}

impl<S: StateStore, C: Collector> Dispatcher<S, C> {
    pub fn new(
        tracker: SessionTracker,
        buffer: PendingBuffer<S>,
        tokens: TokenStore<S>,
        flusher: FlushClient<C>,
    ) -> Self {
        Self {
            tracker,
            buffer,
            tokens,
            flusher,
        }
    }

    pub fn tracker(&self) -> &SessionTracker {
        &self.tracker
    }

    pub fn buffer(&self) -> &PendingBuffer<S> {
        &self.buffer
    }

    pub fn tokens(&self) -> &TokenStore<S> {
        &self.tokens
    }

    /// Applies one event.
    pub fn handle(&mut self, event: BrowserEvent, now: DateTime<Utc>) -> FollowUp {
        match event {
            BrowserEvent::TabActivated { tab } | BrowserEvent::WindowFocusChanged { tab } => {
                self.context_changed(tab, now)
            }
            BrowserEvent::TabUpdated {
                tab,
                complete,
                active,
            } => {
                if complete && active && !tab.url.is_empty() {
                    self.context_changed(Some(tab), now)
                } else {
                    FollowUp::Nothing
                }
            }
            BrowserEvent::IdleStateChanged {
                state: IdleState::Idle | IdleState::Locked,
            } => self.context_changed(None, now),
            BrowserEvent::IdleStateChanged {
                state: IdleState::Active,
            } => FollowUp::QueryActiveContext,
            BrowserEvent::SetToken { token } => {
                self.tokens.set(Credential::new(token));
                FollowUp::Nothing
            }
            BrowserEvent::ClearToken => {
                self.tokens.clear();
                FollowUp::Nothing
            }
            BrowserEvent::FlushNow => FollowUp::Flush,
        }
    }

    /// Closes the running session and starts timing `next`.
    ///
    /// Asks for a flush when an append brought the buffer to its threshold.
    pub fn context_changed(&mut self, next: Option<Context>, now: DateTime<Utc>) -> FollowUp {
        let Credit::Interval(interval) = self.tracker.on_context_change(next, now) else {
            return FollowUp::Nothing;
        };
        tracing::debug!(
            site = %interval.site,
            seconds = interval.duration_seconds,
            pending = self.buffer.len() + 1,
            "queued interval"
        );
        self.buffer.append(interval);
        if self.buffer.threshold_reached() {
            FollowUp::Flush
        } else {
            FollowUp::Nothing
        }
    }
}

impl<S: StateStore, C: Collector + 'static> Dispatcher<S, C> {
    /// Processes events until the source ends.
    ///
    /// On exit the running session is credited as if focus was lost and any
    /// in-flight upload is awaited and settled, so nothing drained is lost.
    pub async fn run<E: EventSource + ?Sized>(
        &mut self,
        source: &mut E,
        flush_every: Duration,
    ) -> RunSummary {
        let mut summary = RunSummary::default();
        let mut in_flight: Option<InFlight> = None;
        let mut ticker = tokio::time::interval_at(Instant::now() + flush_every, flush_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                event = source.next_event() => {
                    let Some(event) = event else { break };
                    summary.events += 1;
                    let mut follow_up = self.handle(event, Utc::now());
                    if follow_up == FollowUp::QueryActiveContext {
                        let context = source.active_context().await;
                        follow_up = self.context_changed(context, Utc::now());
                    }
                    if follow_up == FollowUp::Flush && in_flight.is_none() {
                        in_flight = self.start_flush(Utc::now());
                    }
                }
                _ = ticker.tick() => {
                    if in_flight.is_none() {
                        in_flight = self.start_flush(Utc::now());
                    }
                }
                result = upload_finished(&mut in_flight) => {
                    if let Some(InFlight { job, .. }) = in_flight.take() {
                        let report = self.flusher.finish(job, result, &mut self.buffer, &mut self.tokens);
                        summary.record(&report);
                    }
                }
            }
        }

        self.context_changed(None, Utc::now());
        if let Some(InFlight { job, handle }) = in_flight.take() {
            let result = handle.await.unwrap_or_else(|err| Err(err.into()));
            let report = self
                .flusher
                .finish(job, result, &mut self.buffer, &mut self.tokens);
            summary.record(&report);
        }
        tracing::debug!(?summary, pending = self.buffer.len(), "event source closed");
        summary
    }

    fn start_flush(&mut self, now: DateTime<Utc>) -> Option<InFlight> {
        match self.flusher.begin(&mut self.buffer, &mut self.tokens, now) {
            Ok(job) => {
                let handle = self.flusher.spawn_upload(&job);
                Some(InFlight { job, handle })
            }
            Err(reason) => {
                tracing::debug!(%reason, "flush skipped");
                None
            }
        }
    }
}

/// Resolves when the in-flight upload completes; never resolves if there is none.
async fn upload_finished(in_flight: &mut Option<InFlight>) -> Result<Receipt, UploadError> {
    match in_flight {
        Some(flight) => (&mut flight.handle)
            .await
            .unwrap_or_else(|err| Err(err.into())),
        None => std::future::pending().await,
    }
}
