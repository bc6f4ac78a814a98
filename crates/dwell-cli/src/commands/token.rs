//! Token command: store or forget the upload credential.

use std::io::Write;

use anyhow::{Result, bail};
use chrono::{DateTime, SecondsFormat, Utc};

use dwell_core::{Credential, StateStore, TokenStore};

use crate::Config;
use crate::state::LocalState;

pub fn set<W: Write>(writer: &mut W, config: &Config, token: &str) -> Result<()> {
    let mut state = LocalState::open(config)?;
    store(writer, &mut state.tokens, token, Utc::now())
}

pub fn clear<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let mut state = LocalState::open(config)?;
    state.tokens.clear();
    writeln!(writer, "Token cleared.")?;
    Ok(())
}

/// Stores `token`, warning when uploads will not be able to use it.
fn store<S: StateStore, W: Write>(
    writer: &mut W,
    tokens: &mut TokenStore<S>,
    token: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    let token = token.trim();
    if token.is_empty() {
        bail!("token must not be empty");
    }

    let credential = Credential::new(token);
    match credential.expires_at() {
        Some(exp) if credential.is_valid_at(now) => writeln!(
            writer,
            "Token stored, valid until {}.",
            exp.to_rfc3339_opts(SecondsFormat::Secs, true)
        )?,
        Some(exp) => {
            tracing::warn!(%exp, "stored token is already expired");
            writeln!(
                writer,
                "Token stored, but it expired at {}; uploads will discard it.",
                exp.to_rfc3339_opts(SecondsFormat::Secs, true)
            )?;
        }
        None => {
            tracing::warn!("stored token has no readable expiry");
            writeln!(
                writer,
                "Token stored, but its expiry is unreadable; uploads will discard it."
            )?;
        }
    }
    tokens.set(credential);
    Ok(())
}
