//! Status command: a dump of the locally persisted state.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};

use dwell_core::Credential;

use super::report::format_duration;
use crate::Config;
use crate::state::LocalState;

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let state = LocalState::open(config)?;
    write_status(writer, config, &state, Utc::now())
}

pub fn write_status<W: Write>(
    writer: &mut W,
    config: &Config,
    state: &LocalState,
    now: DateTime<Utc>,
) -> Result<()> {
    writeln!(writer, "Dwell status")?;
    writeln!(writer, "Database: {}", config.database_path.display())?;
    writeln!(writer, "Collector: {}", config.collector_url)?;
    writeln!(writer, "Credential: {}", describe_credential(state.tokens.credential(), now))?;

    let total: u64 = state.buffer.iter().map(|i| i.duration_seconds).sum();
    writeln!(
        writer,
        "Pending: {} intervals, {} (flush at {})",
        state.buffer.len(),
        format_duration(total),
        state.buffer.limits().batch_threshold
    )?;
    for interval in state.buffer.iter() {
        writeln!(
            writer,
            "- {} {} {}s {}",
            interval.date, interval.site, interval.duration_seconds, interval.url
        )?;
    }

    let entries = state.db.entries().context("failed to list stored keys")?;
    if entries.is_empty() {
        writeln!(writer, "Stored keys: none")?;
        return Ok(());
    }
    writeln!(writer, "Stored keys:")?;
    for entry in entries {
        writeln!(
            writer,
            "- {}: {} bytes, updated {}",
            entry.key, entry.bytes, entry.updated_at
        )?;
    }
    Ok(())
}

fn describe_credential(credential: Option<&Credential>, now: DateTime<Utc>) -> String {
    let Some(credential) = credential else {
        return "not set".to_string();
    };
    match credential.expires_at() {
        Some(exp) if credential.is_valid_at(now) => {
            format!("valid until {}", exp.to_rfc3339_opts(SecondsFormat::Secs, true))
        }
        Some(exp) => format!("expired at {}", exp.to_rfc3339_opts(SecondsFormat::Secs, true)),
        None => "unreadable expiry".to_string(),
    }
}
