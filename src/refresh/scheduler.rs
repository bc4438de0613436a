//! Refresh Scheduler
//!
//! Drives periodic refresh cycles on a fixed delay: the interval is measured
//! from the end of one cycle to the start of the next, so a slow cycle never
//! overlaps the following one.
//!
//! ## Manual triggers
//!
//! `trigger_now()` while a cycle is in flight is coalesced into a no-op and
//! returns `false`. While idle it claims the next cycle, which starts right
//! away, and the interval timer restarts once that cycle completes.
//!
//! A cycle run outside the loop holds a [`CycleClaim`]. It counts as in
//! flight for triggers, and a timer that fires meanwhile waits for the claim
//! to be released, then re-arms from that point.

use super::dispatch::{panic_message, Reporter};
use super::error::{ErrorKind, SchedulerError};
use futures_util::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;

/// Error type a cycle function may return
pub type CycleError = Box<dyn std::error::Error + Send + Sync>;

/// Fixed-delay scheduler with coalescing manual triggers
pub struct Scheduler {
    reporter: Arc<dyn Reporter>,
    shared: Arc<SharedState>,
    run: Mutex<Option<ActiveRun>>,
    draining: Mutex<Option<JoinHandle<()>>>,
}

/// Who owns the current cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    Idle,
    /// Claimed by the loop, by `start()` or by a manual trigger
    Scheduled,
    /// Claimed through [`Scheduler::claim`]
    External,
}

struct SharedState {
    claim: Mutex<Claim>,
    released: Notify,
    cycles_run: AtomicU64,
}

impl SharedState {
    fn release(&self) {
        *lock(&self.claim) = Claim::Idle;
        self.released.notify_waiters();
    }
}

/// Marks a cycle run outside the scheduler loop as in flight until dropped
pub struct CycleClaim {
    shared: Arc<SharedState>,
}

impl Drop for CycleClaim {
    fn drop(&mut self) {
        self.shared.release();
    }
}

/// Handles for the currently running loop
struct ActiveRun {
    trigger: mpsc::Sender<()>,
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

impl Scheduler {
    pub fn new(reporter: Arc<dyn Reporter>) -> Self {
        Self {
            reporter,
            shared: Arc::new(SharedState {
                claim: Mutex::new(Claim::Idle),
                released: Notify::new(),
                cycles_run: AtomicU64::new(0),
            }),
            run: Mutex::new(None),
            draining: Mutex::new(None),
        }
    }

    /// Start the refresh loop
    ///
    /// Runs one cycle immediately, then waits `interval` after each
    /// completed cycle before starting the next. Must be called from within
    /// a tokio runtime.
    pub fn start<F, Fut>(&self, interval: Duration, cycle_fn: F) -> Result<(), SchedulerError>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), CycleError>> + Send + 'static,
    {
        if interval.is_zero() {
            return Err(SchedulerError::InvalidInterval);
        }

        let mut run = lock(&self.run);
        if run.is_some() {
            return Err(SchedulerError::AlreadyRunning);
        }

        if let Some(previous) = lock(&self.draining).as_ref() {
            if !previous.is_finished() {
                return Err(SchedulerError::Draining);
            }
        }

        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        // The first cycle is claimed before the task exists so a trigger
        // racing with start() is coalesced into it.
        {
            let mut claim = lock(&self.shared.claim);
            if *claim == Claim::Idle {
                *claim = Claim::Scheduled;
            }
        }

        let handle = tokio::spawn(run_loop(
            interval,
            cycle_fn,
            self.shared.clone(),
            self.reporter.clone(),
            trigger_rx,
            shutdown_rx,
        ));

        tracing::info!(interval_ms = interval.as_millis() as u64, "Refresh scheduler started");

        *run = Some(ActiveRun {
            trigger: trigger_tx,
            shutdown: shutdown_tx,
            handle,
        });

        Ok(())
    }

    /// Stop scheduling new cycles
    ///
    /// A cycle already in flight finishes; nothing new is scheduled.
    /// Calling `stop()` again has no further effect.
    pub fn stop(&self) {
        let Some(run) = lock(&self.run).take() else {
            return;
        };

        let _ = run.shutdown.send(true);
        *lock(&self.draining) = Some(run.handle);

        tracing::info!("Refresh scheduler stopped");
    }

    /// Request a cycle right now
    ///
    /// Returns `true` if a new cycle was claimed, `false` if the trigger was
    /// coalesced (a cycle is already in flight or pending) or the scheduler
    /// is not running.
    pub fn trigger_now(&self) -> bool {
        let run = lock(&self.run);
        let Some(run) = run.as_ref() else {
            return false;
        };

        {
            let mut claim = lock(&self.shared.claim);
            if *claim != Claim::Idle {
                tracing::debug!("Manual refresh ignored, cycle already in flight");
                return false;
            }
            *claim = Claim::Scheduled;
        }

        if run.trigger.try_send(()).is_err() {
            // The loop already holds a pending wake-up; it will run the claimed cycle.
            tracing::debug!("Manual refresh merged with pending wake-up");
        }

        true
    }

    /// Wait for a stopped loop to finish its last cycle
    pub async fn join(&self) {
        let handle = lock(&self.draining).take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                tracing::error!(error = %e, "Refresh scheduler task failed");
            }
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.run).is_some()
    }

    pub fn is_cycle_in_flight(&self) -> bool {
        *lock(&self.shared.claim) != Claim::Idle
    }

    /// Claim the cycle slot for a cycle run outside the loop
    ///
    /// Returns `None` when a cycle is already in flight. Works whether or
    /// not the loop is running.
    pub fn claim(&self) -> Option<CycleClaim> {
        let mut claim = lock(&self.shared.claim);
        if *claim != Claim::Idle {
            return None;
        }
        *claim = Claim::External;
        Some(CycleClaim {
            shared: self.shared.clone(),
        })
    }

    /// Number of cycles started since construction
    pub fn cycles_run(&self) -> u64 {
        self.shared.cycles_run.load(Ordering::SeqCst)
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Some(run) = lock(&self.run).take() {
            let _ = run.shutdown.send(true);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_loop<F, Fut>(
    interval: Duration,
    cycle_fn: F,
    shared: Arc<SharedState>,
    reporter: Arc<dyn Reporter>,
    mut trigger: mpsc::Receiver<()>,
    mut shutdown: watch::Receiver<bool>,
) where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), CycleError>> + Send + 'static,
{
    loop {
        let released = shared.released.notified();
        let claimed = {
            let mut claim = lock(&shared.claim);
            if *claim == Claim::External {
                false
            } else {
                *claim = Claim::Scheduled;
                true
            }
        };

        if claimed {
            // Triggers that arrived while waking up are folded into this cycle.
            while trigger.try_recv().is_ok() {}

            let cycle = shared.cycles_run.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::debug!(cycle, "Refresh cycle triggered");

            // cycle_fn() itself is called inside the guarded future.
            let run = async { cycle_fn().await };
            match AssertUnwindSafe(run).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    reporter.report(ErrorKind::Callback, &format!("Refresh cycle failed: {}", e));
                }
                Err(panic) => {
                    reporter.report(
                        ErrorKind::Callback,
                        &format!("Refresh cycle panicked: {}", panic_message(panic.as_ref())),
                    );
                }
            }

            shared.release();
        } else {
            tracing::debug!("Timer fired during an external cycle, waiting for it");
            tokio::select! {
                _ = released => {}
                _ = shutdown.changed() => break,
            }
        }

        if *shutdown.borrow() {
            break;
        }

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            Some(()) = trigger.recv() => {
                tracing::debug!("Manual refresh requested");
            }
            _ = shutdown.changed() => break,
        }

        if *shutdown.borrow() {
            break;
        }
    }

    // A trigger may have claimed a cycle the loop will never run.
    {
        let mut claim = lock(&shared.claim);
        if *claim == Claim::Scheduled {
            *claim = Claim::Idle;
        }
    }
    shared.released.notify_waiters();
    tracing::debug!("Refresh loop exited");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::refresh::dispatch::testing::CollectingReporter;
    use std::sync::Mutex as StdMutex;
    use tokio::time::Instant;

    /// Cycle function that records its start instants and takes `duration`
    fn recording_cycle(
        duration: Duration,
        starts: Arc<StdMutex<Vec<Instant>>>,
    ) -> impl Fn() -> futures_util::future::BoxFuture<'static, Result<(), CycleError>>
           + Send
           + Sync
           + 'static {
        move || {
            let starts = starts.clone();
            Box::pin(async move {
                starts.lock().unwrap().push(Instant::now());
                tokio::time::sleep(duration).await;
                Ok(())
            })
        }
    }

    fn scheduler() -> (Scheduler, Arc<CollectingReporter>) {
        let reporter = Arc::new(CollectingReporter::default());
        (Scheduler::new(reporter.clone()), reporter)
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_measured_from_cycle_end() {
        let (scheduler, _) = scheduler();
        let starts = Arc::new(StdMutex::new(Vec::new()));

        scheduler
            .start(
                Duration::from_millis(30_000),
                recording_cycle(Duration::from_millis(5_000), starts.clone()),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_millis(80_000)).await;
        scheduler.stop();

        let starts = starts.lock().unwrap().clone();
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[1] - starts[0], Duration::from_millis(35_000));
        assert_eq!(starts[2] - starts[1], Duration::from_millis(35_000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_while_in_flight_is_coalesced() {
        let (scheduler, _) = scheduler();
        let starts = Arc::new(StdMutex::new(Vec::new()));

        scheduler
            .start(
                Duration::from_secs(30),
                recording_cycle(Duration::from_secs(5), starts.clone()),
            )
            .unwrap();

        assert!(scheduler.is_cycle_in_flight());
        assert!(!scheduler.trigger_now());
        assert!(!scheduler.trigger_now());

        tokio::time::sleep(Duration::from_secs(10)).await;

        assert_eq!(starts.lock().unwrap().len(), 1);
        assert_eq!(scheduler.cycles_run(), 1);
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_trigger_while_idle_runs_and_resets_timer() {
        let (scheduler, _) = scheduler();
        let starts = Arc::new(StdMutex::new(Vec::new()));
        let origin = Instant::now();

        scheduler
            .start(
                Duration::from_secs(30),
                recording_cycle(Duration::from_secs(5), starts.clone()),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!scheduler.is_cycle_in_flight());

        assert!(scheduler.trigger_now());
        assert!(!scheduler.trigger_now());

        // Manual cycle at +10s ends at +15s, so the timer fires at +45s, not +35s.
        tokio::time::sleep(Duration::from_secs(40)).await;
        scheduler.stop();

        let starts = starts.lock().unwrap().clone();
        assert_eq!(starts.len(), 3);
        assert_eq!(starts[1] - origin, Duration::from_secs(10));
        assert_eq!(starts[2] - origin, Duration::from_secs(45));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_lets_in_flight_cycle_finish() {
        let (scheduler, _) = scheduler();
        let starts = Arc::new(StdMutex::new(Vec::new()));

        scheduler
            .start(
                Duration::from_secs(30),
                recording_cycle(Duration::from_secs(5), starts.clone()),
            )
            .unwrap();

        tokio::time::sleep(Duration::from_secs(1)).await;
        scheduler.stop();
        scheduler.stop();
        assert!(!scheduler.is_running());
        assert!(!scheduler.trigger_now());

        scheduler.join().await;
        assert!(!scheduler.is_cycle_in_flight());

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(starts.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_when_never_started_is_noop() {
        let (scheduler, _) = scheduler();
        scheduler.stop();
        scheduler.stop();
        scheduler.join().await;
        assert!(!scheduler.is_running());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_cycle_is_reported_and_rearmed() {
        let (scheduler, reporter) = scheduler();
        let runs = Arc::new(AtomicU64::new(0));
        let counter = runs.clone();

        scheduler
            .start(Duration::from_secs(30), move || {
                let counter = counter.clone();
                async move {
                    let n = counter.fetch_add(1, Ordering::SeqCst);
                    if n == 0 {
                        Err::<(), CycleError>("backend exploded".into())
                    } else if n == 1 {
                        panic!("renderer blew up");
                    } else {
                        Ok(())
                    }
                }
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(65)).await;
        scheduler.stop();

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        let reports = reporter.reports();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].1.contains("backend exploded"));
        assert!(reports[1].1.contains("renderer blew up"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_panic_before_future_is_reported_and_rearmed() {
        let (scheduler, reporter) = scheduler();
        let runs = Arc::new(AtomicU64::new(0));
        let counter = runs.clone();

        scheduler
            .start(Duration::from_secs(30), move || {
                if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                    panic!("cycle setup failed");
                }
                async { Ok::<(), CycleError>(()) }
            })
            .unwrap();

        tokio::time::sleep(Duration::from_secs(65)).await;

        assert_eq!(runs.load(Ordering::SeqCst), 3);
        let reports = reporter.reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].1.contains("cycle setup failed"));
        assert!(!scheduler.is_cycle_in_flight());
        assert!(scheduler.trigger_now());
        scheduler.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_claim_blocks_triggers_and_defers_timer() {
        let (scheduler, reporter) = scheduler();
        let starts = Arc::new(StdMutex::new(Vec::new()));
        let origin = Instant::now();

        scheduler
            .start(
                Duration::from_secs(30),
                recording_cycle(Duration::from_secs(1), starts.clone()),
            )
            .unwrap();
        assert!(scheduler.claim().is_none());

        tokio::time::sleep(Duration::from_secs(20)).await;
        let claim = scheduler.claim().unwrap();
        assert!(scheduler.is_cycle_in_flight());
        assert!(!scheduler.trigger_now());
        assert!(scheduler.claim().is_none());

        // The timer fires at +31s while the claim is held until +40s.
        tokio::time::sleep(Duration::from_secs(20)).await;
        drop(claim);
        assert!(!scheduler.is_cycle_in_flight());

        tokio::time::sleep(Duration::from_secs(35)).await;
        scheduler.stop();

        let starts = starts.lock().unwrap().clone();
        assert_eq!(starts.len(), 2);
        assert_eq!(starts[0] - origin, Duration::ZERO);
        assert_eq!(starts[1] - origin, Duration::from_secs(70));
        assert!(reporter.reports().is_empty());
    }

    #[tokio::test]
    async fn test_claim_without_running_loop() {
        let (scheduler, _) = scheduler();
        let claim = scheduler.claim().unwrap();
        assert!(scheduler.is_cycle_in_flight());
        assert!(scheduler.claim().is_none());
        drop(claim);
        assert!(!scheduler.is_cycle_in_flight());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_twice_and_zero_interval() {
        let (scheduler, _) = scheduler();
        let starts = Arc::new(StdMutex::new(Vec::new()));

        assert_eq!(
            scheduler.start(
                Duration::ZERO,
                recording_cycle(Duration::from_secs(1), starts.clone())
            ),
            Err(SchedulerError::InvalidInterval)
        );

        scheduler
            .start(
                Duration::from_secs(30),
                recording_cycle(Duration::from_secs(1), starts.clone()),
            )
            .unwrap();
        assert_eq!(
            scheduler.start(
                Duration::from_secs(30),
                recording_cycle(Duration::from_secs(1), starts.clone())
            ),
            Err(SchedulerError::AlreadyRunning)
        );

        scheduler.stop();
        scheduler.join().await;

        scheduler
            .start(
                Duration::from_secs(30),
                recording_cycle(Duration::from_secs(1), starts.clone()),
            )
            .unwrap();
        tokio::time::sleep(Duration::from_secs(2)).await;
        scheduler.stop();

        assert_eq!(starts.lock().unwrap().len(), 2);
    }
}
