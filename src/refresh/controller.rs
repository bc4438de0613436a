//! Refresh Controller
//!
//! Owns the registered sources, the fetcher, the render dispatcher and the
//! scheduler. Sources and bindings are registered on a
//! [`RefreshControllerBuilder`] before the controller starts.

use super::dispatch::{
    DispatchReport, Dispatcher, RenderBinding, Reporter, SummaryBinding, TracingReporter,
};
use super::error::{ControllerError, RegistryError, SchedulerError};
use super::fetcher::{FetchConfig, Fetcher, Remediation, SourceClient};
use super::scheduler::{CycleError, Scheduler};
use super::source::{DataSourceSpec, RefreshCycle};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Phase of the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CyclePhase {
    Idle,
    Fetching,
    Rendering,
}

/// What happened during one cycle
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub id: u64,
    pub started_at: DateTime<Utc>,
    pub sources: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub callback_failures: usize,
    pub duration_ms: u64,
}

impl CycleReport {
    /// True when at least one source was fetched successfully
    pub fn any_success(&self) -> bool {
        self.succeeded > 0
    }
}

/// Builder collecting sources, bindings and collaborators
pub struct RefreshControllerBuilder {
    client: Arc<dyn SourceClient>,
    sources: Vec<(DataSourceSpec, Option<Arc<dyn RenderBinding>>)>,
    remediations: Vec<(String, Arc<dyn Remediation>)>,
    summary: Option<Arc<dyn SummaryBinding>>,
    reporter: Arc<dyn Reporter>,
    interval: Duration,
    fetch: FetchConfig,
}

impl RefreshControllerBuilder {
    pub fn new(client: Arc<dyn SourceClient>) -> Self {
        Self {
            client,
            sources: Vec::new(),
            remediations: Vec::new(),
            summary: None,
            reporter: Arc::new(TracingReporter),
            interval: Duration::from_secs(30),
            fetch: FetchConfig::default(),
        }
    }

    /// Register a source together with its render binding
    pub fn source(mut self, spec: DataSourceSpec, binding: Arc<dyn RenderBinding>) -> Self {
        self.sources.push((spec, Some(binding)));
        self
    }

    /// Register a source whose outcome is only visible to the summary
    pub fn unbound_source(mut self, spec: DataSourceSpec) -> Self {
        self.sources.push((spec, None));
        self
    }

    pub fn remediation(mut self, name: impl Into<String>, remediation: Arc<dyn Remediation>) -> Self {
        self.remediations.push((name.into(), remediation));
        self
    }

    pub fn summary(mut self, summary: Arc<dyn SummaryBinding>) -> Self {
        self.summary = Some(summary);
        self
    }

    pub fn reporter(mut self, reporter: Arc<dyn Reporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn fetch_config(mut self, config: FetchConfig) -> Self {
        self.fetch = config;
        self
    }

    /// Validate the registrations and build the controller
    pub fn build(self) -> Result<RefreshController, RegistryError> {
        if self.interval.is_zero() {
            return Err(RegistryError::InvalidInterval);
        }

        let mut fetcher = Fetcher::new(self.client, self.fetch);
        for (name, remediation) in self.remediations {
            fetcher.add_remediation(name, remediation);
        }

        let mut dispatcher = Dispatcher::new(self.reporter.clone());
        let mut seen = HashSet::new();
        let mut specs = Vec::with_capacity(self.sources.len());

        for (spec, binding) in self.sources {
            if spec.name.trim().is_empty() {
                return Err(RegistryError::EmptyName);
            }
            if !seen.insert(spec.name.clone()) {
                return Err(RegistryError::DuplicateSource(spec.name));
            }
            if let Some(remediation) = &spec.recovery {
                if !fetcher.has_remediation(remediation) {
                    return Err(RegistryError::UnknownRemediation {
                        source_name: spec.name.clone(),
                        remediation: remediation.clone(),
                    });
                }
            }
            if let Some(binding) = binding {
                dispatcher.bind(spec.name.clone(), binding);
            }
            specs.push(spec);
        }

        if let Some(summary) = self.summary {
            dispatcher.set_summary(summary);
        }

        Ok(RefreshController {
            inner: Arc::new(ControllerInner {
                specs,
                fetcher,
                dispatcher,
                next_cycle_id: AtomicU64::new(1),
                phase: Mutex::new(CyclePhase::Idle),
                last_report: Mutex::new(None),
            }),
            scheduler: Scheduler::new(self.reporter),
            interval: self.interval,
        })
    }
}

/// Polls every registered source and renders the results on a timer
pub struct RefreshController {
    inner: Arc<ControllerInner>,
    scheduler: Scheduler,
    interval: Duration,
}

struct ControllerInner {
    specs: Vec<DataSourceSpec>,
    fetcher: Fetcher,
    dispatcher: Dispatcher,
    next_cycle_id: AtomicU64,
    phase: Mutex<CyclePhase>,
    last_report: Mutex<Option<CycleReport>>,
}

impl RefreshController {
    pub fn builder(client: Arc<dyn SourceClient>) -> RefreshControllerBuilder {
        RefreshControllerBuilder::new(client)
    }

    /// Start periodic refresh: one cycle now, then one per interval
    pub fn start(&self) -> Result<(), SchedulerError> {
        let inner = self.inner.clone();
        self.scheduler.start(self.interval, move || {
            let inner = inner.clone();
            async move {
                inner.run_cycle().await;
                Ok::<(), CycleError>(())
            }
        })
    }

    /// Stop scheduling cycles; an in-flight cycle still completes
    pub fn stop(&self) {
        self.scheduler.stop();
    }

    /// Request an immediate cycle; `false` when coalesced
    pub fn trigger_now(&self) -> bool {
        self.scheduler.trigger_now()
    }

    /// Wait for the last cycle after `stop()`
    pub async fn join(&self) {
        self.scheduler.join().await;
    }

    /// Run a single cycle outside the scheduler
    ///
    /// Fails with [`ControllerError::CycleInFlight`] when a scheduled or
    /// manual cycle is running. While it runs, `trigger_now()` is a no-op.
    pub async fn run_once(&self) -> Result<CycleReport, ControllerError> {
        let _claim = self
            .scheduler
            .claim()
            .ok_or(ControllerError::CycleInFlight)?;
        Ok(self.inner.run_cycle().await)
    }

    pub fn phase(&self) -> CyclePhase {
        *lock(&self.inner.phase)
    }

    pub fn is_running(&self) -> bool {
        self.scheduler.is_running()
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn sources(&self) -> &[DataSourceSpec] {
        &self.inner.specs
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        lock(&self.inner.last_report).clone()
    }
}

impl ControllerInner {
    /// Callers hold the scheduler's cycle slot
    async fn run_cycle(&self) -> CycleReport {
        let started = Instant::now();
        let started_at = Utc::now();
        let id = self.next_cycle_id.fetch_add(1, Ordering::SeqCst);
        tracing::info!(cycle = id, sources = self.specs.len(), "Refresh cycle started");

        self.set_phase(CyclePhase::Fetching);
        let results = self.fetcher.fetch_all(&self.specs).await;
        let cycle = RefreshCycle::new(id, started_at, results);

        self.set_phase(CyclePhase::Rendering);
        let dispatched: DispatchReport = self.dispatcher.dispatch(&cycle);
        self.set_phase(CyclePhase::Idle);

        let report = CycleReport {
            id,
            started_at: cycle.started_at,
            sources: cycle.results.len(),
            succeeded: cycle.succeeded(),
            failed: cycle.failed(),
            callback_failures: dispatched.callback_failures,
            duration_ms: started.elapsed().as_millis() as u64,
        };

        if report.failed > 0 {
            tracing::warn!(
                cycle = id,
                succeeded = report.succeeded,
                failed = report.failed,
                duration_ms = report.duration_ms,
                "Refresh cycle completed with failures"
            );
        } else {
            tracing::info!(
                cycle = id,
                succeeded = report.succeeded,
                duration_ms = report.duration_ms,
                "Refresh cycle completed"
            );
        }

        *lock(&self.last_report) = Some(report.clone());
        report
    }

    fn set_phase(&self, phase: CyclePhase) {
        *lock(&self.phase) = phase;
    }
}

impl Drop for RefreshController {
    fn drop(&mut self) {
        self.scheduler.stop();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::dispatch::testing::{
        Clock, CollectingReporter, RecordingBinding, RecordingSummary,
    };
    use crate::refresh::error::Failure;
    use crate::refresh::fetcher::testing::{CountingRemediation, ScriptedClient};
    use serde_json::json;

    fn client() -> Arc<ScriptedClient> {
        let client = ScriptedClient::new();
        client.respond("/a", Ok(json!({"a": 1})));
        client.respond("/b", Ok(json!({"b": 2})));
        client.respond("/c", Ok(json!({"c": 3})));
        client.respond("/d", Err(Failure::precondition("models not trained")));
        client.respond("/d", Ok(json!({"d": 4})));
        Arc::new(client)
    }

    #[tokio::test]
    async fn test_full_cycle_with_recovery() {
        let clock = Arc::new(Clock::default());
        let bindings: Vec<_> = (0..4)
            .map(|_| Arc::new(RecordingBinding::new(clock.clone())))
            .collect();
        let summary = Arc::new(RecordingSummary::new(clock.clone()));
        let remediation = Arc::new(CountingRemediation::succeeding());

        let controller = RefreshController::builder(client())
            .source(DataSourceSpec::new("a", "/a"), bindings[0].clone())
            .source(DataSourceSpec::new("b", "/b"), bindings[1].clone())
            .source(DataSourceSpec::new("c", "/c"), bindings[2].clone())
            .source(
                DataSourceSpec::new("d", "/d").with_recovery("train"),
                bindings[3].clone(),
            )
            .remediation("train", remediation.clone())
            .summary(summary.clone())
            .build()
            .unwrap();

        let report = controller.run_once().await.unwrap();

        assert_eq!(report.sources, 4);
        assert_eq!(report.succeeded, 4);
        assert_eq!(remediation.calls(), 1);
        assert_eq!(controller.phase(), CyclePhase::Idle);
        assert_eq!(controller.last_report().map(|r| r.id), Some(report.id));

        let (summary_at, cycle_id) = summary.calls()[0];
        assert_eq!(cycle_id, report.id);
        for binding in &bindings {
            assert_eq!(binding.calls().len(), 1);
            assert!(summary_at >= binding.calls()[0].0);
        }
    }

    #[tokio::test]
    async fn test_outcome_count_matches_sources() {
        let controller = RefreshController::builder(client())
            .unbound_source(DataSourceSpec::new("a", "/a"))
            .unbound_source(DataSourceSpec::new("missing", "/nowhere"))
            .build()
            .unwrap();

        let report = controller.run_once().await.unwrap();
        assert_eq!(report.sources, 2);
        assert_eq!(report.succeeded, 1);
        assert_eq!(report.failed, 1);
        assert!(report.any_success());
    }

    #[tokio::test]
    async fn test_cycle_ids_increase() {
        let controller = RefreshController::builder(client())
            .unbound_source(DataSourceSpec::new("a", "/a"))
            .build()
            .unwrap();

        let first = controller.run_once().await.unwrap();
        let second = controller.run_once().await.unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_cycles_render() {
        let clock = Arc::new(Clock::default());
        let binding = Arc::new(RecordingBinding::new(clock));

        let controller = RefreshController::builder(client())
            .source(DataSourceSpec::new("a", "/a"), binding.clone())
            .interval(Duration::from_secs(30))
            .reporter(Arc::new(CollectingReporter::default()))
            .build()
            .unwrap();

        controller.start().unwrap();
        assert!(controller.is_running());
        assert!(!controller.trigger_now());

        tokio::time::sleep(Duration::from_secs(31)).await;
        controller.stop();
        controller.join().await;

        assert_eq!(binding.calls().len(), 2);
        assert!(!controller.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_during_run_once_is_coalesced() {
        let client = ScriptedClient::with_delay(Duration::from_secs(5));
        client.respond("/a", Ok(json!({"a": 1})));
        let binding = Arc::new(RecordingBinding::new(Arc::new(Clock::default())));
        let reporter = Arc::new(CollectingReporter::default());

        let controller = RefreshController::builder(Arc::new(client))
            .source(DataSourceSpec::new("a", "/a"), binding.clone())
            .interval(Duration::from_secs(30))
            .reporter(reporter.clone())
            .build()
            .unwrap();

        controller.start().unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(controller.phase(), CyclePhase::Idle);

        let (report, (triggered, second)) = tokio::join!(controller.run_once(), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            (controller.trigger_now(), controller.run_once().await.err())
        });

        assert!(report.is_ok());
        assert!(!triggered);
        assert_eq!(second, Some(ControllerError::CycleInFlight));

        controller.stop();
        controller.join().await;

        assert_eq!(binding.calls().len(), 2);
        assert!(reporter.reports().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_once_rejected_while_scheduled_cycle_runs() {
        let client = ScriptedClient::with_delay(Duration::from_secs(5));
        client.respond("/a", Ok(json!({"a": 1})));

        let controller = RefreshController::builder(Arc::new(client))
            .unbound_source(DataSourceSpec::new("a", "/a"))
            .build()
            .unwrap();

        controller.start().unwrap();
        assert_eq!(
            controller.run_once().await.err(),
            Some(ControllerError::CycleInFlight)
        );
        controller.stop();
        controller.join().await;
    }

    /// Client that records when each request starts
    #[derive(Default)]
    struct StampingClient {
        stamps: Mutex<Vec<DateTime<Utc>>>,
    }

    #[async_trait::async_trait]
    impl SourceClient for StampingClient {
        async fn fetch(&self, _locator: &str) -> Result<serde_json::Value, Failure> {
            self.stamps.lock().unwrap().push(Utc::now());
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(json!({}))
        }
    }

    #[tokio::test]
    async fn test_started_at_precedes_first_request() {
        let client = Arc::new(StampingClient::default());
        let controller = RefreshController::builder(client.clone())
            .unbound_source(DataSourceSpec::new("a", "/a"))
            .unbound_source(DataSourceSpec::new("b", "/b"))
            .build()
            .unwrap();

        let report = controller.run_once().await.unwrap();

        let stamps = client.stamps.lock().unwrap().clone();
        let first_request = stamps.iter().min().copied().unwrap();
        assert!(report.started_at <= first_request);
        assert!(Utc::now() - report.started_at >= chrono::Duration::milliseconds(50));
    }

    #[test]
    fn test_build_rejects_duplicates() {
        let result = RefreshController::builder(client())
            .unbound_source(DataSourceSpec::new("a", "/a"))
            .unbound_source(DataSourceSpec::new("a", "/other"))
            .build();

        assert_eq!(
            result.err(),
            Some(RegistryError::DuplicateSource("a".to_string()))
        );
    }

    #[test]
    fn test_build_rejects_unknown_remediation() {
        let result = RefreshController::builder(client())
            .unbound_source(DataSourceSpec::new("d", "/d").with_recovery("train"))
            .build();

        assert!(matches!(
            result.err(),
            Some(RegistryError::UnknownRemediation { .. })
        ));
    }

    #[test]
    fn test_build_rejects_zero_interval_and_empty_name() {
        let result = RefreshController::builder(client())
            .interval(Duration::ZERO)
            .build();
        assert_eq!(result.err(), Some(RegistryError::InvalidInterval));

        let result = RefreshController::builder(client())
            .unbound_source(DataSourceSpec::new(" ", "/a"))
            .build();
        assert_eq!(result.err(), Some(RegistryError::EmptyName));
    }
}
