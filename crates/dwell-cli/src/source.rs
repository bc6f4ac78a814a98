//! Where browser events come from.
//!
//! The dispatcher only sees the [`EventSource`] trait. `dwell track` feeds
//! it newline-delimited JSON on stdin, one event per line, e.g.
//!
//! ```text
//! {"type":"tab_activated","tab":{"url":"https://docs.rs/","title":"Docs.rs"}}
//! {"type":"window_focus_changed","tab":null}
//! {"type":"idle_state_changed","state":"locked"}
//! ```

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use dwell_core::Context;

use crate::dispatcher::BrowserEvent;

/// A stream of browser events plus a way to ask what is focused right now.
#[async_trait(?Send)]
pub trait EventSource {
    /// The next event, or `None` once the source is exhausted.
    ///
    /// Must be cancel safe: the dispatcher polls it inside `select!`.
    async fn next_event(&mut self) -> Option<BrowserEvent>;

    /// The currently focused tab, used when the user returns from idle.
    async fn active_context(&mut self) -> Option<Context>;
}

/// Reads JSON-lines events from an async reader.
///
/// Remembers the last focused tab so [`EventSource::active_context`] can
/// answer without a round trip to the browser.
pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    last_focused: Option<Context>,
}

impl<R: AsyncBufRead + Unpin> JsonLinesSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            last_focused: None,
        }
    }

    fn remember(&mut self, event: &BrowserEvent) {
        match event {
            BrowserEvent::TabActivated { tab: Some(tab) }
            | BrowserEvent::WindowFocusChanged { tab: Some(tab) }
            | BrowserEvent::TabUpdated {
                tab, active: true, ..
            } if !tab.url.is_empty() => self.last_focused = Some(tab.clone()),
            _ => {}
        }
    }
}

#[async_trait(?Send)]
impl<R: AsyncBufRead + Unpin> EventSource for JsonLinesSource<R> {
    async fn next_event(&mut self) -> Option<BrowserEvent> {
        loop {
            let line = match self.lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return None,
                Err(err) => {
                    tracing::warn!(error = %err, "event stream read failed");
                    return None;
                }
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<BrowserEvent>(line) {
                Ok(event) => {
                    self.remember(&event);
                    return Some(event);
                }
                Err(err) => tracing::warn!(error = %err, "skipping malformed event"),
            }
        }
    }

    async fn active_context(&mut self) -> Option<Context> {
        self.last_focused.clone()
    }
}
