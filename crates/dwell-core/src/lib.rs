//! Core domain logic for browser dwell-time tracking.
//!
//! This crate contains the fundamental types and logic for:
//! - Session crediting: turning tab/window/idle transitions into intervals
//! - The pending buffer: durable staging with a two-phase drain
//! - Credentials: bearer tokens with an embedded expiry
//! - The persistence seam shared by the buffer and the credential

pub mod buffer;
pub mod store;
pub mod token;
pub mod tracker;
mod types;

pub use buffer::{BufferLimits, DrainedBatch, PendingBuffer};
pub use store::{MemoryStore, StateStore, StoreError};
pub use token::{Credential, TokenStore};
pub use tracker::{Credit, SessionTracker};
pub use types::{ActiveSession, Context, Interval, UNKNOWN_SITE, site_from_url};
