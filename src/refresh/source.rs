//! Data sources, outcomes and refresh cycles

use super::error::Failure;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// A named data feed polled on every cycle
///
/// Immutable once registered with a controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataSourceSpec {
    /// Unique source name (e.g. "resumo", "alertas")
    pub name: String,
    /// Opaque request descriptor handed to the source client
    pub locator: String,
    /// Name of the remediation to run when the source reports a
    /// precondition failure, followed by a single retry
    pub recovery: Option<String>,
}

impl DataSourceSpec {
    pub fn new(name: impl Into<String>, locator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            locator: locator.into(),
            recovery: None,
        }
    }

    /// Attach a remediate-then-retry chain
    pub fn with_recovery(mut self, remediation: impl Into<String>) -> Self {
        self.recovery = Some(remediation.into());
        self
    }
}

/// Result of fetching one source during one cycle
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "data", rename_all = "snake_case")]
pub enum Outcome {
    Success(Value),
    Failure(Failure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Outcome::Success(_) => None,
            Outcome::Failure(failure) => Some(failure),
        }
    }
}

/// One attempt to fetch every source and dispatch the results
///
/// Lives only for the duration of the cycle.
#[derive(Debug, Clone)]
pub struct RefreshCycle {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub results: HashMap<String, Outcome>,
}

impl RefreshCycle {
    /// `started_at` is taken by the caller before the first request goes out
    pub fn new(id: u64, started_at: DateTime<Utc>, results: HashMap<String, Outcome>) -> Self {
        Self {
            id,
            started_at,
            results,
        }
    }

    pub fn outcome(&self, source: &str) -> Option<&Outcome> {
        self.results.get(source)
    }

    pub fn payload(&self, source: &str) -> Option<&Value> {
        self.results.get(source).and_then(Outcome::payload)
    }

    pub fn succeeded(&self) -> usize {
        self.results.values().filter(|o| o.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }
}
