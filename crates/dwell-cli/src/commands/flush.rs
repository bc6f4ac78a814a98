//! Flush command: one upload attempt of everything buffered.

use std::io::Write;

use anyhow::Result;
use chrono::Utc;

use dwell_upload::{FlushClient, FlushReport};

use crate::Config;
use crate::state::{LocalState, collector_client};

pub async fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let mut state = LocalState::open(config)?;
    let mut flusher = FlushClient::new(collector_client(config)?);
    let report = flusher
        .flush(&mut state.buffer, &mut state.tokens, Utc::now())
        .await;
    write_report(writer, &report)
}

/// Describes a flush outcome for humans.
pub fn write_report<W: Write>(writer: &mut W, report: &FlushReport) -> Result<()> {
    match report {
        FlushReport::Skipped(reason) => writeln!(writer, "Nothing uploaded: {reason}.")?,
        FlushReport::Delivered { count, inserted } => {
            write!(writer, "Uploaded {count} interval{}", plural(*count))?;
            match inserted {
                Some(inserted) => writeln!(writer, " ({inserted} inserted).")?,
                None => writeln!(writer, ".")?,
            }
        }
        FlushReport::Restored {
            count,
            credential_cleared,
            error,
        } => {
            writeln!(writer, "Upload failed: {error}")?;
            writeln!(
                writer,
                "Kept {count} interval{} for the next flush.",
                plural(*count)
            )?;
            if *credential_cleared {
                writeln!(
                    writer,
                    "The collector rejected the token; set a new one with `dwell token set`."
                )?;
            }
        }
    }
    Ok(())
}

const fn plural(count: usize) -> &'static str {
    if count == 1 { "" } else { "s" }
}
