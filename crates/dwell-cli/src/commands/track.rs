//! Track command: run the event dispatcher over stdin.

use anyhow::Result;
use tokio::io::BufReader;

use dwell_upload::FlushClient;

use crate::Config;
use crate::dispatcher::{Dispatcher, RunSummary};
use crate::source::JsonLinesSource;
use crate::state::{LocalState, collector_client, session_tracker};

pub async fn run(config: &Config) -> Result<RunSummary> {
    let state = LocalState::open(config)?;
    let flusher = FlushClient::new(collector_client(config)?);
    let mut dispatcher = Dispatcher::new(session_tracker(config), state.buffer, state.tokens, flusher);

    tracing::info!(
        collector = %config.collector_url,
        pending = dispatcher.buffer().len(),
        every = ?config.flush_interval(),
        "tracking events from stdin"
    );
    let mut source = JsonLinesSource::new(BufReader::new(tokio::io::stdin()));
    let summary = dispatcher.run(&mut source, config.flush_interval()).await;
    tracing::info!(
        events = summary.events,
        delivered = summary.delivered,
        pending = dispatcher.buffer().len(),
        "tracking stopped"
    );
    Ok(summary)
}
