//! Report command: time stored by the collector, per site or per page.

use std::collections::HashMap;
use std::io::Write;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Serialize;

use dwell_core::UNKNOWN_SITE;
use dwell_upload::ActivityRecord;

use crate::state::{LocalState, collector_client};
use crate::{Config, GroupBy};

/// Longest key printed in the table before truncation.
const MAX_KEY_WIDTH: usize = 60;

/// Days covered when `--from` is not given, counting the end day.
const DEFAULT_RANGE_DAYS: u64 = 7;

/// Total time for one site or page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub key: String,
    pub seconds: f64,
    pub entries: usize,
}

/// How the report is printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Table,
    Json,
    /// One line per stored record rather than per key.
    Csv,
}

/// Inclusive range of days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

impl DateRange {
    /// Fills in missing bounds: `to` defaults to `today`, `from` to six
    /// days before `to`.
    pub fn resolve(from: Option<NaiveDate>, to: Option<NaiveDate>, today: NaiveDate) -> Result<Self> {
        let to = to.unwrap_or(today);
        let from = from.unwrap_or_else(|| {
            to.checked_sub_days(Days::new(DEFAULT_RANGE_DAYS - 1))
                .unwrap_or(NaiveDate::MIN)
        });
        if from > to {
            bail!("--from {from} is after --to {to}");
        }
        Ok(Self { from, to })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from <= date && date <= self.to
    }
}

/// Parses a stored record date: either `YYYY-MM-DD` or a full RFC 3339 stamp.
fn record_date(record: &ActivityRecord) -> Option<NaiveDate> {
    let raw = record.date.as_deref()?.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc3339(raw) {
        return Some(stamp.with_timezone(&Utc).date_naive());
    }
    raw.get(..10)
        .and_then(|day| NaiveDate::parse_from_str(day, "%Y-%m-%d").ok())
}

/// Records dated inside `range`; undated records are left out.
pub fn in_range(records: &[ActivityRecord], range: DateRange) -> Vec<&ActivityRecord> {
    records
        .iter()
        .filter(|record| record_date(record).is_some_and(|date| range.contains(date)))
        .collect()
}

pub async fn run<W: Write>(
    writer: &mut W,
    config: &Config,
    by: GroupBy,
    limit: usize,
    range: DateRange,
    format: ReportFormat,
) -> Result<()> {
    let mut state = LocalState::open(config)?;
    let Some(credential) = state.tokens.usable(Utc::now()) else {
        bail!("no valid credential; store one with `dwell token set <TOKEN>`");
    };

    let client = collector_client(config)?;
    let records = match client.activities(&credential).await {
        Ok(records) => records,
        Err(err) if err.is_auth_rejection() => {
            tracing::warn!(%err, "collector rejected credential, clearing it");
            state.tokens.clear();
            return Err(err).context("collector rejected the stored token");
        }
        Err(err) => return Err(err).context("failed to fetch activity"),
    };
    let selected = in_range(&records, range);
    tracing::debug!(fetched = records.len(), in_range = selected.len(), "fetched activity");

    match format {
        ReportFormat::Csv => write_csv(writer, &selected)?,
        ReportFormat::Json => {
            let rows = aggregate(selected, by);
            let shown = &rows[..rows.len().min(limit)];
            writeln!(writer, "{}", serde_json::to_string_pretty(shown)?)?;
        }
        ReportFormat::Table => {
            let rows = aggregate(selected, by);
            write_table(writer, &rows, by, limit, range)?;
        }
    }
    Ok(())
}

/// Writes `date,site,page,duration_seconds` rows, every field quoted.
pub fn write_csv<W: Write>(writer: &mut W, records: &[&ActivityRecord]) -> Result<()> {
    writeln!(writer, "\"date\",\"site\",\"page\",\"duration_seconds\"")?;
    for record in records {
        let fields = [
            record.date.clone().unwrap_or_default(),
            site_key(record),
            record.url.clone().unwrap_or_default(),
            record.duration.to_string(),
        ];
        let line: Vec<String> = fields.iter().map(|field| csv_field(field)).collect();
        writeln!(writer, "{}", line.join(","))?;
    }
    Ok(())
}

fn csv_field(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Sums durations per key, largest first.
pub fn aggregate<'a>(
    records: impl IntoIterator<Item = &'a ActivityRecord>,
    by: GroupBy,
) -> Vec<ReportRow> {
    let mut totals: HashMap<String, (f64, usize)> = HashMap::new();
    for record in records {
        let key = match by {
            GroupBy::Site => site_key(record),
            GroupBy::Page => non_empty(record.url.as_deref())
                .map_or_else(|| site_key(record), str::to_string),
        };
        let total = totals.entry(key).or_default();
        total.0 += record.duration.max(0.0);
        total.1 += 1;
    }

    let mut rows: Vec<ReportRow> = totals
        .into_iter()
        .map(|(key, (seconds, entries))| ReportRow {
            key,
            seconds,
            entries,
        })
        .collect();
    rows.sort_by(|a, b| b.seconds.total_cmp(&a.seconds).then_with(|| a.key.cmp(&b.key)));
    rows
}

fn site_key(record: &ActivityRecord) -> String {
    non_empty(record.name.as_deref())
        .or_else(|| non_empty(record.domain.as_deref()))
        .unwrap_or(UNKNOWN_SITE)
        .to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

pub fn write_table<W: Write>(
    writer: &mut W,
    rows: &[ReportRow],
    by: GroupBy,
    limit: usize,
    range: DateRange,
) -> Result<()> {
    let label = match by {
        GroupBy::Site => "site",
        GroupBy::Page => "page",
    };
    if rows.is_empty() {
        writeln!(writer, "No activity recorded from {} to {}.", range.from, range.to)?;
        return Ok(());
    }

    let period = format!("{} to {}", range.from, range.to);
    let shown = &rows[..rows.len().min(limit)];
    if shown.len() < rows.len() {
        writeln!(
            writer,
            "Time by {label}, {period} (top {} of {})",
            shown.len(),
            rows.len()
        )?;
    } else {
        writeln!(writer, "Time by {label}, {period}")?;
    }
    writeln!(writer)?;

    let keys: Vec<String> = shown.iter().map(|row| truncate(&row.key)).collect();
    let width = keys.iter().map(|k| k.chars().count()).max().unwrap_or(0);
    let max = shown.first().map_or(0.0, |row| row.seconds);
    for (key, row) in keys.iter().zip(shown) {
        writeln!(
            writer,
            "{key:<width$}  {:>8}  {}",
            format_duration(whole_seconds(row.seconds)),
            progress_bar(row.seconds, max)
        )?;
    }

    let total: f64 = rows.iter().map(|row| row.seconds).sum();
    writeln!(writer)?;
    writeln!(writer, "Total: {}", format_duration(whole_seconds(total)))?;
    Ok(())
}

fn truncate(key: &str) -> String {
    if key.chars().count() <= MAX_KEY_WIDTH {
        return key.to_string();
    }
    let mut short: String = key.chars().take(MAX_KEY_WIDTH - 1).collect();
    short.push('…');
    short
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn whole_seconds(seconds: f64) -> u64 {
    seconds.max(0.0).round() as u64
}

/// Formats seconds as "1h 5m", "4m 10s" or "12s".
pub fn format_duration(seconds: u64) -> String {
    let hours = seconds / 3600;
    let minutes = (seconds % 3600) / 60;
    let secs = seconds % 60;

    if hours >= 1 {
        format!("{hours}h {minutes}m")
    } else if minutes >= 1 {
        format!("{minutes}m {secs}s")
    } else {
        format!("{secs}s")
    }
}

/// Generates a 10-character progress bar.
/// Values <5% of max get a single block for visibility.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn progress_bar(value: f64, max: f64) -> String {
    if max <= 0.0 {
        return "░░░░░░░░░░".to_string();
    }

    let ratio = value / max;
    let filled = if ratio < 0.05 && value > 0.0 {
        1
    } else {
        (ratio * 10.0).round().clamp(0.0, 10.0) as usize
    };

    let empty = 10 - filled;
    format!("{}{}", "█".repeat(filled), "░".repeat(empty))
}

#[cfg(test)]
mod tests {
    use base64::Engine as _;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use insta::assert_snapshot;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn record(name: Option<&str>, domain: Option<&str>, url: Option<&str>, duration: f64) -> ActivityRecord {
        ActivityRecord {
            name: name.map(str::to_string),
            domain: domain.map(str::to_string),
            url: url.map(str::to_string),
            title: None,
            duration,
            date: Some("2025-06-01".to_string()),
        }
    }

    fn records() -> Vec<ActivityRecord> {
        vec![
            record(Some("a.com"), Some("a.com"), Some("https://a.com/x"), 3000.0),
            record(None, Some("b.com"), Some("https://b.com/"), 600.0),
            record(Some("a.com"), None, Some("https://a.com/y"), 600.0),
            record(None, None, None, 30.0),
        ]
    }

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn week() -> DateRange {
        DateRange::resolve(None, Some(day("2025-06-01")), day("2025-06-10")).unwrap()
    }

    fn dated(date: Option<&str>) -> ActivityRecord {
        ActivityRecord {
            date: date.map(str::to_string),
            ..record(Some("a.com"), None, None, 10.0)
        }
    }

    fn render(rows: &[ReportRow], by: GroupBy, limit: usize) -> String {
        let mut output = Vec::new();
        write_table(&mut output, rows, by, limit, week()).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn format_duration_cases() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(90), "1m 30s");
        assert_eq!(format_duration(3600), "1h 0m");
        assert_eq!(format_duration(5400), "1h 30m");
    }

    #[test]
    fn progress_bar_cases() {
        assert_eq!(progress_bar(10.0, 10.0), "██████████");
        assert_eq!(progress_bar(5.0, 10.0), "█████░░░░░");
        assert_eq!(progress_bar(0.1, 10.0), "█░░░░░░░░░");
        assert_eq!(progress_bar(0.0, 10.0), "░░░░░░░░░░");
        assert_eq!(progress_bar(1.0, 0.0), "░░░░░░░░░░");
    }

    #[test]
    fn aggregate_by_site_prefers_name_then_domain() {
        let rows = aggregate(&records(), GroupBy::Site);
        let keys: Vec<_> = rows.iter().map(|r| (r.key.as_str(), r.seconds, r.entries)).collect();
        assert_eq!(
            keys,
            vec![("a.com", 3600.0, 2), ("b.com", 600.0, 1), ("unknown", 30.0, 1)]
        );
    }

    #[test]
    fn aggregate_by_page_falls_back_to_site() {
        let rows = aggregate(&records(), GroupBy::Page);
        let keys: Vec<_> = rows.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            keys,
            vec!["https://a.com/x", "https://a.com/y", "https://b.com/", "unknown"]
        );
    }

    #[test]
    fn site_table() {
        let rows = aggregate(&records(), GroupBy::Site);
        let output = render(&rows, GroupBy::Site, 10);
        assert_snapshot!(output, @r"
        Time by site, 2025-05-26 to 2025-06-01

        a.com       1h 0m  ██████████
        b.com      10m 0s  ██░░░░░░░░
        unknown       30s  █░░░░░░░░░

        Total: 1h 10m
        ");
    }

    #[test]
    fn limit_keeps_largest_rows() {
        let rows = aggregate(&records(), GroupBy::Site);
        let output = render(&rows, GroupBy::Site, 1);
        assert!(output.starts_with("Time by site, 2025-05-26 to 2025-06-01 (top 1 of 3)"));
        assert!(output.contains("a.com"));
        assert!(!output.contains("b.com"));
        // The total still covers every row.
        assert!(output.contains("Total: 1h 10m"));
    }

    #[test]
    fn empty_report() {
        assert_eq!(
            render(&[], GroupBy::Page, 10),
            "No activity recorded from 2025-05-26 to 2025-06-01.\n"
        );
    }

    #[test]
    fn default_range_is_last_seven_days() {
        let range = DateRange::resolve(None, None, day("2025-06-10")).unwrap();
        assert_eq!(range.from, day("2025-06-04"));
        assert_eq!(range.to, day("2025-06-10"));

        let range = DateRange::resolve(Some(day("2025-01-01")), None, day("2025-06-10")).unwrap();
        assert_eq!(range.from, day("2025-01-01"));

        assert!(DateRange::resolve(Some(day("2025-06-11")), None, day("2025-06-10")).is_err());
    }

    #[test]
    fn range_includes_both_end_days() {
        let records = vec![
            dated(Some("2025-05-25")),
            dated(Some("2025-05-26")),
            dated(Some("2025-06-01T23:59:59.000Z")),
            dated(Some("2025-06-02T00:00:00Z")),
            dated(Some("garbage")),
            dated(None),
        ];
        let kept: Vec<_> = in_range(&records, week())
            .into_iter()
            .map(|r| r.date.as_deref().unwrap())
            .collect();
        assert_eq!(kept, ["2025-05-26", "2025-06-01T23:59:59.000Z"]);
    }

    #[test]
    fn csv_lists_each_record_with_quoting() {
        let quoted = ActivityRecord {
            url: Some(r#"https://c.com/?q="x""#.to_string()),
            ..record(None, Some("c.com"), None, 12.5)
        };
        let records = [record(Some("a.com"), None, Some("https://a.com/"), 120.0), quoted];
        let refs: Vec<&ActivityRecord> = records.iter().collect();

        let mut output = Vec::new();
        write_csv(&mut output, &refs).unwrap();
        assert_snapshot!(String::from_utf8(output).unwrap(), @r#"
        "date","site","page","duration_seconds"
        "2025-06-01","a.com","https://a.com/","120"
        "2025-06-01","c.com","https://c.com/?q=""x""","12.5"
        "#);
    }

    #[test]
    fn long_page_urls_are_truncated() {
        let url = format!("https://example.com/{}", "a".repeat(100));
        let short = truncate(&url);
        assert_eq!(short.chars().count(), MAX_KEY_WIDTH);
        assert!(short.ends_with('…'));
    }

    #[tokio::test]
    async fn run_fetches_and_prints_json() {
        let server = MockServer::start().await;
        let token = format!(
            "e30.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"exp":4102444800}"#)
        );
        Mock::given(method("GET"))
            .and(path("/api/activity/me"))
            .and(header("authorization", format!("Bearer {token}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "activities": [
                    {"name": "a.com", "domain": "a.com", "url": "https://a.com/", "duration": 120, "date": "2025-06-01"},
                    {"name": "b.com", "domain": "b.com", "url": "https://b.com/", "duration": 60, "date": "2025-06-01"},
                    {"name": "c.com", "domain": "c.com", "url": "https://c.com/", "duration": 900, "date": "2025-05-01T10:00:00.000Z"}
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: temp.path().join("dwell.db"),
            collector_url: server.uri(),
            ..Config::default()
        };
        {
            let mut state = LocalState::open(&config).unwrap();
            state.tokens.set(dwell_core::Credential::new(token.clone()));
        }

        let mut output = Vec::new();
        run(&mut output, &config, GroupBy::Site, 1, week(), ReportFormat::Json)
            .await
            .unwrap();
        let rows: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(
            rows,
            serde_json::json!([{"key": "a.com", "seconds": 120.0, "entries": 1}])
        );
    }

    #[tokio::test]
    async fn rejected_token_is_cleared() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/activity/me"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let temp = tempfile::tempdir().unwrap();
        let config = Config {
            database_path: temp.path().join("dwell.db"),
            collector_url: server.uri(),
            ..Config::default()
        };
        let token = format!(
            "e30.{}.sig",
            URL_SAFE_NO_PAD.encode(r#"{"exp":4102444800}"#)
        );
        LocalState::open(&config)
            .unwrap()
            .tokens
            .set(dwell_core::Credential::new(token));

        let mut output = Vec::new();
        let err = run(&mut output, &config, GroupBy::Site, 10, week(), ReportFormat::Table)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("rejected"));
        assert!(LocalState::open(&config).unwrap().tokens.credential().is_none());
    }
}
