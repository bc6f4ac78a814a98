//! Core type definitions for browser activity.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use url::Url;

/// Site label for URLs without a usable host (e.g. `about:blank`).
pub const UNKNOWN_SITE: &str = "unknown";

/// Derives the site identifier for a URL.
///
/// The site is the URL's host with a leading `www.` removed. URLs that fail
/// to parse or carry no host map to [`UNKNOWN_SITE`].
#[must_use]
pub fn site_from_url(url: &str) -> String {
    Url::parse(url)
        .ok()
        .and_then(|parsed| {
            parsed
                .host_str()
                .map(|host| host.strip_prefix("www.").unwrap_or(host).to_string())
        })
        .filter(|host| !host.is_empty())
        .unwrap_or_else(|| UNKNOWN_SITE.to_string())
}

/// What the browser is currently showing: the focused tab of the focused window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Context {
    /// Full URL of the tab.
    pub url: String,
    /// Tab title, if the browser reported one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
}

impl Context {
    pub fn new(url: impl Into<String>, title: Option<String>) -> Self {
        Self {
            url: url.into(),
            title,
        }
    }

    /// Returns the site this context is attributed to.
    #[must_use]
    pub fn site(&self) -> String {
        site_from_url(&self.url)
    }
}

/// The context currently being timed.
///
/// Never persisted: a restart loses the running session, not any interval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub site: String,
    pub url: String,
    pub title: Option<String>,
    pub started_at: DateTime<Utc>,
}

impl ActiveSession {
    /// Starts timing `context` at `now`.
    pub fn start(context: Context, now: DateTime<Utc>) -> Self {
        Self {
            site: context.site(),
            url: context.url,
            title: context.title,
            started_at: now,
        }
    }
}

/// One completed, attributed span of time spent on a site.
///
/// Intervals are immutable once credited. They live in the pending buffer
/// until the collector acknowledges them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interval {
    /// Host the time is attributed to.
    pub site: String,
    /// Full URL observed.
    pub url: String,
    /// Tab title at the time the session started.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Calendar day (UTC) the interval is attributed to.
    pub date: NaiveDate,
    /// Whole seconds credited.
    pub duration_seconds: u64,
}
