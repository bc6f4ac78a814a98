//! HTTP client for the remote activity collector.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use dwell_core::{Credential, Interval};

/// Default request timeout for collector calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Batch upload endpoint.
pub const TRACK_PATH: &str = "/api/activity/track";
/// Read-side endpoint returning every stored interval for the caller.
pub const ACTIVITY_PATH: &str = "/api/activity/me";

/// Collector client errors.
#[derive(Debug, Error)]
pub enum UploadError {
    /// The configured base URL is unusable.
    #[error("invalid collector URL {url}: {reason}")]
    InvalidBaseUrl { url: String, reason: String },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed before a response arrived.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// The collector rejected the credential (401/403).
    #[error("credential rejected with status {status}")]
    Unauthorized { status: u16 },
    /// Any other non-success response.
    #[error("collector returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// A success response whose body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The upload task died before producing a result.
    #[error("upload task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl UploadError {
    /// Whether the collector refused the credential.
    pub fn is_auth_rejection(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// One interval as the collector expects it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub domain: String,
    pub url: String,
    pub title: String,
    pub duration: u64,
    /// `YYYY-MM-DD`.
    pub date: String,
}

impl From<&Interval> for UploadRecord {
    fn from(interval: &Interval) -> Self {
        Self {
            domain: interval.site.clone(),
            url: interval.url.clone(),
            title: interval.title.clone().unwrap_or_default(),
            duration: interval.duration_seconds,
            date: interval.date.format("%Y-%m-%d").to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct TrackRequest<'a> {
    records: &'a [UploadRecord],
}

#[derive(Debug, Deserialize)]
struct TrackResponse {
    #[serde(default)]
    inserted: Option<usize>,
}

/// Acknowledgement of an accepted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Receipt {
    /// Records the collector reports inserting, when its body says so.
    pub inserted: Option<usize>,
}

/// One stored interval as returned by the read-side endpoint.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActivityRecord {
    /// Legacy site field; preferred over `domain` when present.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub duration: f64,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ActivityResponse {
    #[serde(default)]
    activities: Vec<ActivityRecord>,
}

/// Destination for uploaded batches.
#[async_trait]
pub trait Collector: Send + Sync {
    /// Sends one batch. All-or-nothing: there is no partial acknowledgement.
    async fn upload(
        &self,
        credential: &Credential,
        records: &[UploadRecord],
    ) -> Result<Receipt, UploadError>;
}

/// Collector HTTP client.
///
/// Cloning is cheap; clones share the underlying connection pool.
#[derive(Clone)]
pub struct CollectorClient {
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for CollectorClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl CollectorClient {
    /// Creates a client for the collector at `base_url` with the default timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, UploadError> {
        Self::with_timeout(base_url, DEFAULT_TIMEOUT)
    }

    /// Creates a client with an explicit request timeout.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is not an absolute URL, or if the HTTP
    /// client fails to build.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, UploadError> {
        let base_url = base_url.into();
        let trimmed = base_url.trim().trim_end_matches('/').to_string();
        reqwest::Url::parse(&trimmed).map_err(|err| UploadError::InvalidBaseUrl {
            url: base_url.clone(),
            reason: err.to_string(),
        })?;

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(UploadError::ClientBuild)?;

        Ok(Self {
            http,
            base_url: trimmed,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Uploads `records` as one batch.
    pub async fn track(
        &self,
        credential: &Credential,
        records: &[UploadRecord],
    ) -> Result<Receipt, UploadError> {
        let response = self
            .http
            .post(format!("{}{TRACK_PATH}", self.base_url))
            .bearer_auth(credential.token())
            .json(&TrackRequest { records })
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(receipt_from_body(response.text().await));
        }
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, body))
    }

    /// Fetches every interval the collector holds for the credential's owner.
    pub async fn activities(
        &self,
        credential: &Credential,
    ) -> Result<Vec<ActivityRecord>, UploadError> {
        let response = self
            .http
            .get(format!("{}{ACTIVITY_PATH}", self.base_url))
            .bearer_auth(credential.token())
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        check_status(status, &body)?;

        let payload: ActivityResponse = serde_json::from_str(&body)
            .map_err(|err| UploadError::InvalidResponse(err.to_string()))?;
        Ok(payload.activities)
    }
}

#[async_trait]
impl Collector for CollectorClient {
    async fn upload(
        &self,
        credential: &Credential,
        records: &[UploadRecord],
    ) -> Result<Receipt, UploadError> {
        self.track(credential, records).await
    }
}

/// The collector already accepted the batch, so an unreadable body only
/// loses the inserted count.
fn receipt_from_body(body: Result<String, reqwest::Error>) -> Receipt {
    let body = match body {
        Ok(body) => body,
        Err(err) => {
            tracing::debug!(error = %err, "could not read success body");
            return Receipt { inserted: None };
        }
    };
    let inserted = serde_json::from_str::<TrackResponse>(&body)
        .ok()
        .and_then(|payload| payload.inserted);
    Receipt { inserted }
}

fn check_status(status: StatusCode, body: &str) -> Result<(), UploadError> {
    if status.is_success() {
        return Ok(());
    }
    Err(status_error(status, body.to_string()))
}

fn status_error(status: StatusCode, body: String) -> UploadError {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return UploadError::Unauthorized {
            status: status.as_u16(),
        };
    }
    UploadError::Status {
        status: status.as_u16(),
        body,
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn record(domain: &str, duration: u64) -> UploadRecord {
        UploadRecord {
            domain: domain.to_string(),
            url: format!("https://{domain}/"),
            title: String::new(),
            duration,
            date: "2025-06-01".to_string(),
        }
    }

    #[test]
    fn record_from_interval_fills_empty_title() {
        let interval = Interval {
            site: "example.com".to_string(),
            url: "https://example.com/x".to_string(),
            title: None,
            date: NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            duration_seconds: 61,
        };
        let record = UploadRecord::from(&interval);
        assert_eq!(record.domain, "example.com");
        assert_eq!(record.title, "");
        assert_eq!(record.duration, 61);
        assert_eq!(record.date, "2025-06-01");
    }

    #[test]
    fn client_rejects_unparseable_base_url() {
        assert!(matches!(
            CollectorClient::new("not a url"),
            Err(UploadError::InvalidBaseUrl { .. })
        ));
    }

    #[test]
    fn client_trims_trailing_slash() {
        let client = CollectorClient::new("http://localhost:5000/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:5000");
    }

    #[tokio::test]
    async fn track_posts_batch_with_bearer_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path(TRACK_PATH))
            .and(header("authorization", "Bearer tok.en.sig"))
            .and(body_json(json!({
                "records": [
                    {"domain": "a.com", "url": "https://a.com/", "title": "", "duration": 60, "date": "2025-06-01"}
                ]
            })))
            .respond_with(
                ResponseTemplate::new(201)
                    .set_body_json(json!({"message": "Batch logged", "inserted": 1})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = CollectorClient::new(server.uri()).unwrap();
        let receipt = client
            .track(&Credential::new("tok.en.sig"), &[record("a.com", 60)])
            .await
            .unwrap();
        assert_eq!(receipt.inserted, Some(1));
    }

    #[tokio::test]
    async fn unreadable_success_body_still_delivers() {
        let err = reqwest::get("http://127.0.0.1:1/").await.unwrap_err();
        assert_eq!(receipt_from_body(Err(err)), Receipt { inserted: None });
        assert_eq!(
            receipt_from_body(Ok(r#"{"message":"ok","inserted":4}"#.to_string())),
            Receipt { inserted: Some(4) }
        );
    }

    #[tokio::test]
    async fn success_without_count_is_still_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("ok"))
            .mount(&server)
            .await;

        let client = CollectorClient::new(server.uri()).unwrap();
        let receipt = client
            .track(&Credential::new("t"), &[record("a.com", 60)])
            .await
            .unwrap();
        assert_eq!(receipt.inserted, None);
    }

    #[tokio::test]
    async fn auth_statuses_map_to_unauthorized() {
        for status in [401, 403] {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .respond_with(
                    ResponseTemplate::new(status)
                        .set_body_json(json!({"message": "Invalid or expired token"})),
                )
                .mount(&server)
                .await;

            let client = CollectorClient::new(server.uri()).unwrap();
            let err = client
                .track(&Credential::new("t"), &[record("a.com", 60)])
                .await
                .unwrap_err();
            assert!(err.is_auth_rejection(), "status {status}: {err}");
        }
    }

    #[tokio::test]
    async fn other_failures_keep_status_and_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"message": "No valid records to insert"})),
            )
            .mount(&server)
            .await;

        let client = CollectorClient::new(server.uri()).unwrap();
        let err = client
            .track(&Credential::new("t"), &[record("a.com", 60)])
            .await
            .unwrap_err();
        match err {
            UploadError::Status { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("No valid records"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn activities_reads_stored_records() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path(ACTIVITY_PATH))
            .and(header("authorization", "Bearer t"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "activities": [
                    {"name": "a.com", "domain": "a.com", "url": "https://a.com/", "title": "", "duration": 60, "date": "2025-06-01T00:00:00.000Z"},
                    {"domain": "b.com", "duration": 5}
                ]
            })))
            .mount(&server)
            .await;

        let client = CollectorClient::new(server.uri()).unwrap();
        let activities = client.activities(&Credential::new("t")).await.unwrap();
        assert_eq!(activities.len(), 2);
        assert_eq!(activities[0].name.as_deref(), Some("a.com"));
        assert_eq!(activities[1].name, None);
        assert!((activities[1].duration - 5.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn activities_rejects_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>"))
            .mount(&server)
            .await;

        let client = CollectorClient::new(server.uri()).unwrap();
        let err = client.activities(&Credential::new("t")).await.unwrap_err();
        assert!(matches!(err, UploadError::InvalidResponse(_)));
    }
}
