use std::io;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use dwell_cli::commands::{flush, report, status, token, track};
use dwell_cli::{Cli, Commands, Config, TokenAction};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // try_init: tests may have installed a subscriber already
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = &cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    let mut stdout = io::stdout().lock();
    match command {
        Commands::Track => {
            track::run(&config).await?;
        }
        Commands::Flush => flush::run(&mut stdout, &config).await?,
        Commands::Status => status::run(&mut stdout, &config)?,
        Commands::Token(TokenAction::Set { token }) => token::set(&mut stdout, &config, token)?,
        Commands::Token(TokenAction::Clear) => token::clear(&mut stdout, &config)?,
        Commands::Report {
            by,
            limit,
            from,
            to,
            json,
            csv,
        } => {
            let range = report::DateRange::resolve(*from, *to, Utc::now().date_naive())?;
            let format = if *csv {
                report::ReportFormat::Csv
            } else if *json {
                report::ReportFormat::Json
            } else {
                report::ReportFormat::Table
            };
            report::run(&mut stdout, &config, *by, *limit, range, format).await?;
        }
    }

    Ok(())
}
