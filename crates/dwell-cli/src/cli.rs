//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};

/// Browser dwell-time tracker.
///
/// Credits time spent per site from browser focus and idle events, buffers
/// the intervals locally, and uploads them to a collector.
#[derive(Debug, Parser)]
#[command(name = "dwell", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Track browser events read as JSON lines from stdin.
    Track,

    /// Upload buffered intervals now.
    Flush,

    /// Show buffered intervals, credential state and stored keys.
    Status,

    /// Manage the upload credential.
    #[command(subcommand)]
    Token(TokenAction),

    /// Summarize time stored by the collector over a range of days.
    Report {
        /// Group by site or by page URL.
        #[arg(long, value_enum, default_value_t = GroupBy::Site)]
        by: GroupBy,

        /// Number of rows to show.
        #[arg(long, default_value_t = 10)]
        limit: usize,

        /// First day to include (YYYY-MM-DD). Defaults to six days before --to.
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last day to include (YYYY-MM-DD). Defaults to today (UTC).
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Output as JSON.
        #[arg(long, conflicts_with = "csv")]
        json: bool,

        /// Output every record in the range as CSV.
        #[arg(long)]
        csv: bool,
    },
}

/// Credential subcommands.
#[derive(Debug, Subcommand)]
pub enum TokenAction {
    /// Store a bearer token for uploads.
    Set {
        /// The token issued by the collector's login flow.
        token: String,
    },
    /// Forget the stored token.
    Clear,
}

/// Report grouping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GroupBy {
    Site,
    Page,
}
