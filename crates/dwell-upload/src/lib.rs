//! Collector integration for dwell.
//!
//! Provides:
//! - [`CollectorClient`]: batch upload and read-side queries over HTTP
//! - [`FlushClient`]: the drain/upload/commit-or-restore protocol

mod client;
mod flush;

pub use client::{
    ACTIVITY_PATH, ActivityRecord, Collector, CollectorClient, DEFAULT_TIMEOUT, Receipt,
    TRACK_PATH, UploadError, UploadRecord,
};
pub use flush::{FlushClient, FlushJob, FlushReport, SkipReason};
