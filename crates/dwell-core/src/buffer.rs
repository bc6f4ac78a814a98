//! Durable FIFO staging area for intervals awaiting upload.
//!
//! Every structural change is followed by a full overwrite of the persisted
//! copy. Persistence is best-effort: a failed write is logged and the
//! in-memory buffer stays authoritative until the next successful one.
//!
//! Uploading is a two-phase operation. [`PendingBuffer::drain_all`] hands out
//! a [`DrainedBatch`] which the caller must settle with exactly one of
//! [`DrainedBatch::commit`] (delivered) or [`PendingBuffer::restore`]
//! (failed, merge back ahead of anything queued since).

use std::collections::VecDeque;

use crate::store::{StateStore, StoreError, load_json, save_json};
use crate::types::Interval;

/// Storage key for the pending buffer.
pub const PENDING_KEY: &str = "pending_intervals";

/// Buffer length at which a flush should be triggered.
pub const DEFAULT_BATCH_THRESHOLD: usize = 5;

/// Default cap on buffered intervals.
pub const DEFAULT_MAX_PENDING: usize = 10_000;

/// Size policy for a [`PendingBuffer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferLimits {
    /// Length at which [`PendingBuffer::threshold_reached`] reports true. `0` disables it.
    pub batch_threshold: usize,
    /// Maximum number of buffered intervals; the oldest are dropped beyond it.
    pub max_pending: Option<usize>,
}

impl Default for BufferLimits {
    fn default() -> Self {
        Self {
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            max_pending: Some(DEFAULT_MAX_PENDING),
        }
    }
}

/// Ordered intervals awaiting upload, in credit order.
#[derive(Debug)]
pub struct PendingBuffer<S> {
    store: S,
    entries: VecDeque<Interval>,
    limits: BufferLimits,
}

impl<S: StateStore> PendingBuffer<S> {
    /// Loads the buffer from `store`.
    ///
    /// The persisted copy is the source of truth at startup. A corrupt copy is
    /// discarded with a warning; a failing backend is an error.
    pub fn load(store: S, limits: BufferLimits) -> Result<Self, StoreError> {
        let entries = match load_json::<Vec<Interval>, _>(&store, PENDING_KEY) {
            Ok(Some(entries)) => entries.into(),
            Ok(None) => VecDeque::new(),
            Err(err @ StoreError::Corrupt { .. }) => {
                tracing::warn!(error = %err, "discarding unreadable pending buffer");
                VecDeque::new()
            }
            Err(err) => return Err(err),
        };
        tracing::debug!(pending = entries.len(), "pending buffer loaded");

        let mut buffer = Self {
            store,
            entries,
            limits,
        };
        if buffer.enforce_cap() > 0 {
            buffer.persist();
        }
        Ok(buffer)
    }

    /// Adds `interval` at the tail.
    pub fn append(&mut self, interval: Interval) {
        self.entries.push_back(interval);
        self.enforce_cap();
        self.persist();
    }

    /// Removes and returns every buffered interval.
    ///
    /// Nothing drained remains in the buffer, so a batch can never be
    /// counted twice within one process.
    pub fn drain_all(&mut self) -> DrainedBatch {
        if self.entries.is_empty() {
            return DrainedBatch::default();
        }
        let intervals: Vec<Interval> = self.entries.drain(..).collect();
        self.persist();
        DrainedBatch { intervals }
    }

    /// Puts an undelivered batch back at the head, ahead of anything appended
    /// since it was drained, keeping its original order.
    pub fn restore(&mut self, batch: DrainedBatch) {
        if batch.is_empty() {
            return;
        }
        for interval in batch.intervals.into_iter().rev() {
            self.entries.push_front(interval);
        }
        self.enforce_cap();
        self.persist();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Interval> {
        self.entries.iter()
    }

    pub fn limits(&self) -> BufferLimits {
        self.limits
    }

    /// Whether the buffer has grown to the flush threshold.
    ///
    /// The buffer never flushes itself; callers check this after appending.
    pub fn threshold_reached(&self) -> bool {
        self.limits.batch_threshold > 0 && self.entries.len() >= self.limits.batch_threshold
    }

    /// Drops the oldest entries beyond `max_pending`. Returns how many were dropped.
    fn enforce_cap(&mut self) -> usize {
        let Some(max) = self.limits.max_pending else {
            return 0;
        };
        let excess = self.entries.len().saturating_sub(max);
        if excess > 0 {
            self.entries.drain(..excess);
            tracing::warn!(dropped = excess, max, "pending buffer full, dropped oldest intervals");
        }
        excess
    }

    fn persist(&self) {
        if let Err(err) = save_json(&self.store, PENDING_KEY, &self.entries) {
            tracing::warn!(error = %err, pending = self.entries.len(), "failed to persist pending buffer");
        }
    }
}

/// Intervals taken out of the buffer for one upload attempt.
#[must_use = "a drained batch must be committed or restored"]
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DrainedBatch {
    intervals: Vec<Interval>,
}

impl DrainedBatch {
    pub fn intervals(&self) -> &[Interval] {
        &self.intervals
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    /// Discards the batch after the collector accepted it. Returns its size.
    pub fn commit(self) -> usize {
        self.intervals.len()
    }
}
