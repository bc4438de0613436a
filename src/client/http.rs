//! Analytics REST API Client
//!
//! HTTP implementation of [`SourceClient`] and [`Remediation`] for the
//! Árvore Pão backend.

use crate::refresh::{Failure, Remediation, SourceClient};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;

/// How the backend signals that required server-side state is missing
#[derive(Debug, Clone)]
pub struct PreconditionRule {
    /// Status code used for the signal (400 for "models not trained")
    pub status: u16,
    /// Case-insensitive body markers; any match counts. Empty means the
    /// status alone is enough.
    pub markers: Vec<String>,
}

impl Default for PreconditionRule {
    fn default() -> Self {
        Self {
            status: 400,
            markers: vec![
                "not trained".to_string(),
                "não treinad".to_string(),
                "train-models".to_string(),
            ],
        }
    }
}

impl PreconditionRule {
    pub fn matches(&self, status: u16, body: &str) -> bool {
        if status != self.status {
            return false;
        }
        if self.markers.is_empty() {
            return true;
        }
        let body = body.to_lowercase();
        self.markers
            .iter()
            .any(|marker| body.contains(&marker.to_lowercase()))
    }
}

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL of the backend (e.g. "http://localhost:8000")
    pub base_url: String,
    /// Transport-level timeout for each request
    pub request_timeout_ms: u64,
    pub precondition: PreconditionRule,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout_ms: 10_000,
            precondition: PreconditionRule::default(),
        }
    }
}

/// GETs JSON payloads from the analytics API
#[derive(Clone)]
pub struct HttpSourceClient {
    client: Client,
    config: HttpClientConfig,
}

impl HttpSourceClient {
    pub fn new(config: HttpClientConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self { client, config })
    }

    /// Join the base URL and a locator path
    pub fn url(&self, locator: &str) -> String {
        join_url(&self.config.base_url, locator)
    }

    /// Build a remediation action that POSTs to `path` on the same backend
    pub fn remediation(&self, path: &str) -> HttpRemediation {
        HttpRemediation {
            client: self.client.clone(),
            url: self.url(path),
        }
    }
}

#[async_trait]
impl SourceClient for HttpSourceClient {
    async fn fetch(&self, locator: &str) -> Result<Value, Failure> {
        let url = self.url(locator);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_failure)?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map_err(|e| Failure::decode(format!("{} returned invalid JSON: {}", url, e)));
        }

        if self.config.precondition.matches(status.as_u16(), &body) {
            return Err(Failure::precondition(error_detail(&body, status)));
        }

        Err(Failure::http_status(
            status.as_u16(),
            error_detail(&body, status),
        ))
    }
}

/// POSTs to a backend endpoint to restore missing state (e.g. train models)
#[derive(Clone)]
pub struct HttpRemediation {
    client: Client,
    url: String,
}

impl HttpRemediation {
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Remediation for HttpRemediation {
    async fn remediate(&self) -> Result<(), Failure> {
        tracing::info!(url = %self.url, "Requesting remediation");

        let response = self
            .client
            .post(&self.url)
            .send()
            .await
            .map_err(transport_failure)?;

        let status = response.status();
        let body = response.text().await.map_err(transport_failure)?;

        if !status.is_success() {
            return Err(Failure::http_status(
                status.as_u16(),
                error_detail(&body, status),
            ));
        }

        // The training endpoint answers 200 with {"success": false, "error": ...}
        // when it could not do its job.
        if let Ok(value) = serde_json::from_str::<Value>(&body) {
            if value.get("success").and_then(Value::as_bool) == Some(false) {
                let reason = value
                    .get("error")
                    .and_then(Value::as_str)
                    .unwrap_or("remediation reported failure");
                return Err(Failure::precondition(reason.to_string()));
            }
        }

        Ok(())
    }
}

fn transport_failure(e: reqwest::Error) -> Failure {
    if e.is_timeout() {
        Failure::network("request timed out")
    } else if e.is_connect() {
        Failure::network(format!("connection failed: {}", e))
    } else if e.is_decode() {
        Failure::decode(e.to_string())
    } else {
        Failure::network(e.to_string())
    }
}

/// Extract a readable message from an error body (`{"detail": ...}` or raw text)
fn error_detail(body: &str, status: StatusCode) -> String {
    let detail = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["detail", "error", "message"]
            .iter()
            .find_map(|key| v.get(*key).and_then(Value::as_str).map(str::to_string))
    });

    match detail {
        Some(detail) => detail,
        None if body.trim().is_empty() => status
            .canonical_reason()
            .unwrap_or("request failed")
            .to_string(),
        None => body.trim().chars().take(200).collect(),
    }
}

pub(crate) fn join_url(base: &str, path: &str) -> String {
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
