use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::executor::MonitoringExecutor;
use crate::audit::LogRotator;

pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(60);
pub const DEFAULT_ROTATION_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);
/// Shortest period a cycle runs at; shorter ones, zero included, are raised to it
pub const MIN_PERIOD: Duration = Duration::from_millis(1);

/// Clears a sweep's "in progress" flag when the sweep ends
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Run `job` immediately and then every `period`.
///
/// Each run is spawned on its own task so a slow run never delays the timer.
/// A tick that fires while the previous run is still going is skipped.
/// `period` is raised to [`MIN_PERIOD`] if shorter.
pub fn spawn_cycle<F, Fut>(name: &'static str, period: Duration, job: F) -> JoinHandle<()>
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let running = Arc::new(AtomicBool::new(false));
    let period = period.max(MIN_PERIOD);

    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            timer.tick().await;

            if running.swap(true, Ordering::AcqRel) {
                warn!(cycle = name, "Previous sweep still running, skipping this tick");
                continue;
            }

            debug!(cycle = name, "Starting sweep");
            let flag = RunningFlag(running.clone());
            let run = job();
            tokio::spawn(async move {
                let _flag = flag;
                run.await;
            });
        }
    })
}

/// Drives the probe sweep and the log rotation sweep
pub struct WorkerScheduler {
    executor: Arc<MonitoringExecutor>,
    rotator: Arc<LogRotator>,
    check_interval: Duration,
    rotation_interval: Duration,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerScheduler {
    pub fn new(executor: Arc<MonitoringExecutor>, rotator: Arc<LogRotator>) -> Self {
        Self {
            executor,
            rotator,
            check_interval: DEFAULT_CHECK_INTERVAL,
            rotation_interval: DEFAULT_ROTATION_INTERVAL,
            handles: Vec::new(),
        }
    }

    pub fn with_intervals(mut self, check_interval: Duration, rotation_interval: Duration) -> Self {
        self.check_interval = check_interval;
        self.rotation_interval = rotation_interval;
        self
    }

    pub fn is_running(&self) -> bool {
        self.handles.iter().any(|handle| !handle.is_finished())
    }

    /// Start both cycles; each runs once right away. Calling twice is a no-op.
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }

        info!(
            check_interval_secs = self.check_interval.as_secs(),
            rotation_interval_secs = self.rotation_interval.as_secs(),
            "Starting background workers"
        );

        let executor = self.executor.clone();
        self.handles.push(spawn_cycle("probe", self.check_interval, move || {
            let executor = executor.clone();
            async move {
                executor.gather_all_checks().await;
            }
        }));

        let rotator = self.rotator.clone();
        self.handles.push(spawn_cycle("rotation", self.rotation_interval, move || {
            let rotator = rotator.clone();
            async move {
                rotator.rotate_all_logs().await;
            }
        }));
    }

    /// Stop scheduling new sweeps. Sweeps already running finish on their own.
    pub fn stop(&mut self) {
        for handle in self.handles.drain(..) {
            handle.abort();
        }
        info!("Background workers stopped");
    }
}

impl Drop for WorkerScheduler {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::monitoring::checker::{Checker, HttpChecker, DEFAULT_USER_AGENT};
    use crate::monitoring::processor::OutcomeProcessor;
    use crate::monitoring::processor::tests::{MemoryStore, RecordingNotifier};
    use std::sync::atomic::AtomicUsize;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_cycle_runs_immediately_then_periodically() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_cycle("test", Duration::from_millis(100), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_millis(230)).await;
        assert!(runs.load(Ordering::SeqCst) >= 3);
        handle.abort();
    }

    #[tokio::test]
    async fn test_slow_sweep_is_not_overlapped() {
        let started = Arc::new(AtomicUsize::new(0));
        let counter = started.clone();
        let handle = spawn_cycle("slow", Duration::from_millis(50), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(400)).await;
            }
        });

        // Several ticks fire while the first sweep sleeps
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1);

        // After it finishes the next tick starts a new one
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(started.load(Ordering::SeqCst), 2);
        handle.abort();
    }

    #[tokio::test]
    async fn test_cycles_do_not_block_each_other() {
        let fast = Arc::new(AtomicUsize::new(0));
        let counter = fast.clone();
        let slow = spawn_cycle("slow", Duration::from_secs(3600), || async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        });
        let quick = spawn_cycle("fast", Duration::from_millis(50), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(280)).await;
        assert!(fast.load(Ordering::SeqCst) >= 4);
        slow.abort();
        quick.abort();
    }

    #[tokio::test]
    async fn test_zero_period_is_raised_not_fatal() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_cycle("zero", Duration::ZERO, move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert!(runs.load(Ordering::SeqCst) >= 1);
        handle.abort();
    }

    #[tokio::test]
    async fn test_scheduler_with_zero_intervals_keeps_running() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let logs = Arc::new(AuditLog::new(dir.path()));
        let checker: Arc<dyn Checker> = Arc::new(HttpChecker::new(DEFAULT_USER_AGENT).unwrap());
        let processor = Arc::new(OutcomeProcessor::new(store.clone(), logs.clone(), Arc::new(RecordingNotifier::default())));
        let executor = Arc::new(MonitoringExecutor::new(store, checker, processor));
        let mut scheduler =
            WorkerScheduler::new(executor, Arc::new(LogRotator::new(logs))).with_intervals(Duration::ZERO, Duration::ZERO);

        scheduler.start();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(scheduler.is_running());
        scheduler.stop();
    }

    #[tokio::test]
    async fn test_scheduler_start_and_stop() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let logs = Arc::new(AuditLog::new(dir.path()));
        let checker: Arc<dyn Checker> = Arc::new(HttpChecker::new(DEFAULT_USER_AGENT).unwrap());
        let processor = Arc::new(OutcomeProcessor::new(store.clone(), logs.clone(), Arc::new(RecordingNotifier::default())));
        let executor = Arc::new(MonitoringExecutor::new(store, checker, processor));
        let rotator = Arc::new(LogRotator::new(logs));

        let mut scheduler = WorkerScheduler::new(executor, rotator)
            .with_intervals(Duration::from_millis(50), Duration::from_millis(50));
        assert!(!scheduler.is_running());

        scheduler.start();
        assert!(scheduler.is_running());
        scheduler.start();
        assert_eq!(scheduler.handles.len(), 2);

        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.stop();
        assert!(!scheduler.is_running());
    }
}
