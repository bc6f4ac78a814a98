//! Flushing the pending buffer to the collector.
//!
//! A flush drains the whole buffer into one batch, uploads it, and then
//! either commits the batch (delivered) or restores it ahead of anything
//! queued meanwhile (failed). Delivery is at-least-once: a batch may be sent
//! again after a failure, but is never dropped while buffered.
//!
//! The protocol is split into [`FlushClient::begin`] and
//! [`FlushClient::finish`] so an event loop can keep crediting intervals
//! while the request is pending. [`FlushClient::flush`] runs both halves
//! back to back.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::task::JoinHandle;

use dwell_core::{Credential, DrainedBatch, PendingBuffer, StateStore, TokenStore};

use crate::client::{Collector, Receipt, UploadError, UploadRecord};

/// Why a flush did not send anything.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Nothing buffered.
    Empty,
    /// No credential, or the stored one expired.
    NoCredential,
    /// A previous flush has not finished.
    InFlight,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Empty => "nothing to flush",
            Self::NoCredential => "no valid credential",
            Self::InFlight => "a flush is already in flight",
        };
        f.write_str(s)
    }
}

/// Result of one flush attempt.
#[derive(Debug)]
pub enum FlushReport {
    Skipped(SkipReason),
    /// The batch was accepted and discarded locally.
    Delivered {
        count: usize,
        inserted: Option<usize>,
    },
    /// The batch was put back into the buffer.
    Restored {
        count: usize,
        credential_cleared: bool,
        error: UploadError,
    },
}

/// A drained batch together with the credential it will be sent with.
#[must_use = "a flush job must be passed back to FlushClient::finish"]
#[derive(Debug)]
pub struct FlushJob {
    batch: DrainedBatch,
    credential: Credential,
}

impl FlushJob {
    pub fn len(&self) -> usize {
        self.batch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batch.is_empty()
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The batch in wire form.
    pub fn records(&self) -> Vec<UploadRecord> {
        self.batch.intervals().iter().map(UploadRecord::from).collect()
    }
}

/// Uploads buffered intervals, one batch at a time.
///
/// Never retries within a call; the next scheduled flush is the retry.
#[derive(Debug)]
pub struct FlushClient<C> {
    collector: Arc<C>,
    in_flight: bool,
}

impl<C: Collector> FlushClient<C> {
    pub fn new(collector: C) -> Self {
        Self {
            collector: Arc::new(collector),
            in_flight: false,
        }
    }

    pub fn collector(&self) -> &Arc<C> {
        &self.collector
    }

    /// Whether a job handed out by [`Self::begin`] has not been finished yet.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Starts a flush: checks preconditions and drains the buffer.
    ///
    /// Leaves the buffer untouched when skipping. An expired or malformed
    /// stored credential is cleared on the way out.
    pub fn begin<S: StateStore>(
        &mut self,
        buffer: &mut PendingBuffer<S>,
        tokens: &mut TokenStore<S>,
        now: DateTime<Utc>,
    ) -> Result<FlushJob, SkipReason> {
        if self.in_flight {
            return Err(SkipReason::InFlight);
        }
        if buffer.is_empty() {
            return Err(SkipReason::Empty);
        }
        let Some(credential) = tokens.usable(now) else {
            tracing::debug!(pending = buffer.len(), "no valid credential, skipping flush");
            return Err(SkipReason::NoCredential);
        };

        let batch = buffer.drain_all();
        self.in_flight = true;
        tracing::debug!(count = batch.len(), "flushing batch");
        Ok(FlushJob { batch, credential })
    }

    /// Settles a job with the upload result.
    ///
    /// Success commits the batch. Any failure restores it; an auth rejection
    /// also clears the credential, unless it was replaced after `begin`.
    pub fn finish<S: StateStore>(
        &mut self,
        job: FlushJob,
        result: Result<Receipt, UploadError>,
        buffer: &mut PendingBuffer<S>,
        tokens: &mut TokenStore<S>,
    ) -> FlushReport {
        self.in_flight = false;
        let FlushJob { batch, credential } = job;

        match result {
            Ok(receipt) => {
                let count = batch.commit();
                tracing::info!(count, inserted = ?receipt.inserted, "batch delivered");
                FlushReport::Delivered {
                    count,
                    inserted: receipt.inserted,
                }
            }
            Err(error) => {
                let count = batch.len();
                buffer.restore(batch);
                // A token set while the request was in flight was never sent.
                let credential_cleared = error.is_auth_rejection()
                    && tokens.credential() == Some(&credential);
                if credential_cleared {
                    tracing::warn!(count, error = %error, "collector rejected credential, clearing it");
                    tokens.clear();
                } else if error.is_auth_rejection() {
                    tracing::warn!(count, error = %error, "collector rejected a replaced credential, batch restored");
                } else {
                    tracing::warn!(count, error = %error, "flush failed, batch restored");
                }
                FlushReport::Restored {
                    count,
                    credential_cleared,
                    error,
                }
            }
        }
    }

    /// Runs a complete flush.
    pub async fn flush<S: StateStore>(
        &mut self,
        buffer: &mut PendingBuffer<S>,
        tokens: &mut TokenStore<S>,
        now: DateTime<Utc>,
    ) -> FlushReport {
        let job = match self.begin(buffer, tokens, now) {
            Ok(job) => job,
            Err(reason) => return FlushReport::Skipped(reason),
        };
        let result = self.collector.upload(job.credential(), &job.records()).await;
        self.finish(job, result, buffer, tokens)
    }
}

impl<C: Collector + 'static> FlushClient<C> {
    /// Uploads `job` on a background task so the caller can keep going.
    pub fn spawn_upload(&self, job: &FlushJob) -> JoinHandle<Result<Receipt, UploadError>> {
        let collector = Arc::clone(&self.collector);
        let credential = job.credential.clone();
        let records = job.records();
        tokio::spawn(async move { collector.upload(&credential, &records).await })
    }
}
