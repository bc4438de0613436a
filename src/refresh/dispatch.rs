//! Render dispatch
//!
//! Hands each cycle's outcomes to the render bindings registered for the
//! sources. Every callback runs in isolation: an error or a panic in one
//! binding is reported and the remaining bindings still run. The summary
//! binding always runs last.

use super::error::{ErrorKind, Failure, RenderError};
use super::source::{Outcome, RefreshCycle};
use serde_json::Value;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Render callbacks for one data source
pub trait RenderBinding: Send + Sync {
    fn on_success(&self, payload: &Value) -> Result<(), RenderError>;

    fn on_failure(&self, failure: &Failure) -> Result<(), RenderError>;
}

/// Callback run once per cycle after every per-source binding
///
/// Receives the whole cycle so aggregates spanning several sources
/// (e.g. the alert counter) can be computed.
pub trait SummaryBinding: Send + Sync {
    fn on_cycle(&self, cycle: &RefreshCycle) -> Result<(), RenderError>;
}

/// Sink for cycle-level and callback-level failures
pub trait Reporter: Send + Sync {
    fn report(&self, kind: ErrorKind, message: &str);
}

/// Reporter that logs through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn report(&self, kind: ErrorKind, message: &str) {
        tracing::error!(kind = %kind, "{}", message);
    }
}

/// Counts from a single dispatch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Per-source callbacks that completed
    pub rendered: usize,
    /// Callbacks (summary included) that errored or panicked
    pub callback_failures: usize,
    /// Sources with an outcome but no binding
    pub unbound: usize,
}

/// Ordered set of render bindings
pub struct Dispatcher {
    bindings: Vec<(String, Arc<dyn RenderBinding>)>,
    summary: Option<Arc<dyn SummaryBinding>>,
    reporter: Arc<dyn Reporter>,
}

impl Dispatcher {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            bindings: Vec::new(),
            summary: None,
            reporter,
        }
    }

    /// Bind a render callback to a source name
    pub fn bind(&mut self, source: impl Into<String>, binding: Arc<dyn RenderBinding>) {
        self.bindings.push((source.into(), binding));
    }

    pub fn set_summary(&mut self, summary: Arc<dyn SummaryBinding>) {
        self.summary = Some(summary);
    }

    pub fn is_bound(&self, source: &str) -> bool {
        self.bindings.iter().any(|(name, _)| name == source)
    }

    /// Run every binding for the cycle, then the summary
    pub fn dispatch(&self, cycle: &RefreshCycle) -> DispatchReport {
        let mut report = DispatchReport::default();

        for (source, binding) in &self.bindings {
            let Some(outcome) = cycle.results.get(source) else {
                continue;
            };

            let ok = self.invoke(source, || match outcome {
                Outcome::Success(payload) => binding.on_success(payload),
                Outcome::Failure(failure) => binding.on_failure(failure),
            });

            if ok {
                report.rendered += 1;
            } else {
                report.callback_failures += 1;
            }
        }

        report.unbound = cycle
            .results
            .keys()
            .filter(|name| !self.is_bound(name))
            .count();

        if let Some(summary) = &self.summary {
            if !self.invoke("summary", || summary.on_cycle(cycle)) {
                report.callback_failures += 1;
            }
        }

        report
    }

    fn invoke<F>(&self, target: &str, callback: F) -> bool
    where
        F: FnOnce() -> Result<(), RenderError>,
    {
        match panic::catch_unwind(AssertUnwindSafe(callback)) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                self.reporter.report(
                    ErrorKind::Callback,
                    &format!("Render callback for '{}' failed: {}", target, e),
                );
                false
            }
            Err(panic) => {
                self.reporter.report(
                    ErrorKind::Callback,
                    &format!(
                        "Render callback for '{}' panicked: {}",
                        target,
                        panic_message(panic.as_ref())
                    ),
                );
                false
            }
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
