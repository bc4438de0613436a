//! Fetcher
//!
//! Issues every configured request concurrently and converts each result,
//! success or failure, into an [`Outcome`]. A source that reports a
//! precondition failure may run one remediation action followed by exactly
//! one retry.

use super::error::{ErrorKind, Failure};
use super::source::{DataSourceSpec, Outcome};
use async_trait::async_trait;
use futures_util::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Performs a single request for a source locator
#[async_trait]
pub trait SourceClient: Send + Sync {
    /// Fetch the payload behind `locator`
    ///
    /// Implementations report a missing upstream state as
    /// [`ErrorKind::Precondition`] so the fetcher can try to remediate it.
    async fn fetch(&self, locator: &str) -> Result<Value, Failure>;
}

/// Corrective action run before retrying a precondition failure
#[async_trait]
pub trait Remediation: Send + Sync {
    async fn remediate(&self) -> Result<(), Failure>;
}

/// Timeouts applied by the fetcher
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Upper bound for a single request
    pub request_timeout: Duration,
    /// Upper bound for a single remediation action
    pub remediation_timeout: Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            remediation_timeout: Duration::from_secs(120),
        }
    }
}

/// Concurrent, failure-isolated fetcher
pub struct Fetcher {
    client: Arc<dyn SourceClient>,
    remediations: HashMap<String, Arc<dyn Remediation>>,
    config: FetchConfig,
}

impl Fetcher {
    pub fn new(client: Arc<dyn SourceClient>, config: FetchConfig) -> Self {
        Self {
            client,
            remediations: HashMap::new(),
            config,
        }
    }

    /// Register a named remediation action
    pub fn add_remediation(&mut self, name: impl Into<String>, remediation: Arc<dyn Remediation>) {
        self.remediations.insert(name.into(), remediation);
    }

    pub fn has_remediation(&self, name: &str) -> bool {
        self.remediations.contains_key(name)
    }

    /// Fetch every source concurrently
    ///
    /// The returned map has exactly one entry per spec.
    pub async fn fetch_all(&self, specs: &[DataSourceSpec]) -> HashMap<String, Outcome> {
        let requests = specs.iter().map(|spec| async move {
            let outcome = self.fetch_source(spec).await;
            (spec.name.clone(), outcome)
        });

        join_all(requests).await.into_iter().collect()
    }

    /// Fetch one source, running its recovery chain at most once
    async fn fetch_source(&self, spec: &DataSourceSpec) -> Outcome {
        match self.request(&spec.locator).await {
            Ok(payload) => Outcome::Success(payload),
            Err(failure) if failure.is_precondition() => self.recover(spec, failure).await,
            Err(failure) => {
                tracing::warn!(source = %spec.name, error = %failure, "Data source fetch failed");
                Outcome::Failure(failure)
            }
        }
    }

    async fn recover(&self, spec: &DataSourceSpec, original: Failure) -> Outcome {
        let Some(name) = spec.recovery.as_deref() else {
            tracing::warn!(source = %spec.name, error = %original, "Precondition failed, no recovery configured");
            return Outcome::Failure(original);
        };

        let Some(remediation) = self.remediations.get(name) else {
            tracing::warn!(source = %spec.name, remediation = name, "Recovery refers to an unknown remediation");
            return Outcome::Failure(original);
        };

        tracing::info!(source = %spec.name, remediation = name, reason = %original.message, "Running remediation before retry");

        let remediated =
            match tokio::time::timeout(self.config.remediation_timeout, remediation.remediate())
                .await
            {
                Ok(result) => result,
                Err(_) => Err(Failure::network(format!(
                    "remediation timed out after {}ms",
                    self.config.remediation_timeout.as_millis()
                ))),
            };

        if let Err(e) = remediated {
            tracing::warn!(source = %spec.name, remediation = name, error = %e, "Remediation failed");
            return Outcome::Failure(Failure::new(
                ErrorKind::Precondition,
                format!("{} (remediation '{}' failed: {})", original.message, name, e),
            ));
        }

        match self.request(&spec.locator).await {
            Ok(payload) => {
                tracing::info!(source = %spec.name, "Retry after remediation succeeded");
                Outcome::Success(payload)
            }
            Err(failure) => {
                tracing::warn!(source = %spec.name, error = %failure, "Retry after remediation failed");
                Outcome::Failure(failure)
            }
        }
    }

    async fn request(&self, locator: &str) -> Result<Value, Failure> {
        match tokio::time::timeout(self.config.request_timeout, self.client.fetch(locator)).await {
            Ok(result) => result,
            Err(_) => Err(Failure::network(format!(
                "request timed out after {}ms",
                self.config.request_timeout.as_millis()
            ))),
        }
    }
}
