use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::checker::Checker;
use super::processor::{OutcomeProcessor, ProcessReport};
use super::validation::validate_check_data;
use crate::store::{CHECKS, RecordStore};

/// How one check fared in a sweep
#[derive(Debug)]
pub enum CheckRun {
    Processed(ProcessReport),
    /// The record could not be read
    Unreadable,
    /// The record failed validation; nothing was probed or written
    Invalid,
    /// A previous sweep is still working on this check
    InFlight,
    /// Probed, but the outcome could not be persisted
    Failed,
}

/// Counts for one probe sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepSummary {
    pub listed: usize,
    pub processed: usize,
    pub invalid: usize,
    pub unreadable: usize,
    pub in_flight: usize,
    pub failed: usize,
}

impl SweepSummary {
    fn record(&mut self, run: &CheckRun) {
        match run {
            CheckRun::Processed(_) => self.processed += 1,
            CheckRun::Unreadable => self.unreadable += 1,
            CheckRun::Invalid => self.invalid += 1,
            CheckRun::InFlight => self.in_flight += 1,
            CheckRun::Failed => self.failed += 1,
        }
    }
}

/// Removes a record id from the in-flight set when its run ends, even if the
/// task panics or is aborted
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight.remove(&self.id);
    }
}

/// Monitoring executor - runs validate, probe and process for every check
pub struct MonitoringExecutor {
    store: Arc<dyn RecordStore>,
    checker: Arc<dyn Checker>,
    processor: Arc<OutcomeProcessor>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl MonitoringExecutor {
    pub fn new(store: Arc<dyn RecordStore>, checker: Arc<dyn Checker>, processor: Arc<OutcomeProcessor>) -> Self {
        Self { store, checker, processor, in_flight: Arc::new(Mutex::new(HashSet::new())) }
    }

    fn claim(&self, record_id: &str) -> Option<InFlightGuard> {
        let mut in_flight = self.in_flight.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        in_flight
            .insert(record_id.to_string())
            .then(|| InFlightGuard { in_flight: self.in_flight.clone(), id: record_id.to_string() })
    }

    /// Look up all checks and process each one in its own task
    pub async fn gather_all_checks(self: &Arc<Self>) -> SweepSummary {
        let ids = match self.store.list(CHECKS).await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Could not list checks: {}", e);
                return SweepSummary::default();
            }
        };

        let mut summary = SweepSummary { listed: ids.len(), ..Default::default() };
        if ids.is_empty() {
            warn!("Could not find any checks to process");
            return summary;
        }

        let mut tasks = JoinSet::new();
        for id in ids {
            let executor = Arc::clone(self);
            tasks.spawn(async move { executor.run_check(&id).await });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(run) => summary.record(&run),
                Err(e) => {
                    error!("Check task ended abnormally: {}", e);
                    summary.failed += 1;
                }
            }
        }

        info!(
            listed = summary.listed,
            processed = summary.processed,
            invalid = summary.invalid,
            in_flight = summary.in_flight,
            failed = summary.failed + summary.unreadable,
            "Probe sweep finished"
        );
        summary
    }

    /// Read, validate, probe and process a single check.
    ///
    /// The record id is claimed before the record is read and stays claimed
    /// until the outcome is processed, so a concurrent sweep can neither act
    /// on a snapshot older than the one being processed nor write in between.
    pub async fn run_check(&self, record_id: &str) -> CheckRun {
        let Some(_guard) = self.claim(record_id) else {
            debug!(record_id, "Check is still being processed by an earlier sweep");
            return CheckRun::InFlight;
        };

        let raw = match self.store.read(CHECKS, record_id).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!(record_id, "Error reading check data: {}", e);
                return CheckRun::Unreadable;
            }
        };

        let check = match validate_check_data(&raw) {
            Ok(check) => check,
            Err(e) => {
                warn!(record_id, "Skipping improperly formatted check: {}", e);
                return CheckRun::Invalid;
            }
        };

        let outcome = self.checker.probe(&check).await;

        match self.processor.process(&check, outcome).await {
            Ok(report) => CheckRun::Processed(report),
            Err(e) => {
                error!(check_id = %check.id, "Error processing check outcome: {}", e);
                CheckRun::Failed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::AuditLog;
    use crate::monitoring::processor::tests::{MemoryStore, RecordingNotifier};
    use crate::monitoring::types::{Check, CheckOutcome};
    use crate::store::StoreError;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tempfile::tempdir;
    use tokio::sync::Notify;

    /// Checker answering a fixed status and counting probes
    struct FixedChecker {
        status: u16,
        probes: AtomicUsize,
        delay: Duration,
    }

    #[async_trait::async_trait]
    impl Checker for FixedChecker {
        async fn probe(&self, _check: &Check) -> CheckOutcome {
            self.probes.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            CheckOutcome::response(self.status)
        }
    }

    /// Checker that blocks until released
    struct GatedChecker {
        gate: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl Checker for GatedChecker {
        async fn probe(&self, _check: &Check) -> CheckOutcome {
            self.gate.notified().await;
            CheckOutcome::response(200)
        }
    }

    fn record(id: &str) -> Value {
        json!({
            "id": id,
            "userPhone": "5551234567",
            "protocol": "http",
            "url": "example.com/health",
            "method": "get",
            "successCodes": [200],
            "timeoutSeconds": 2
        })
    }

    fn executor_with(store: Arc<MemoryStore>, checker: Arc<dyn Checker>, logs: Arc<AuditLog>) -> Arc<MonitoringExecutor> {
        let processor = Arc::new(OutcomeProcessor::new(store.clone(), logs, Arc::new(RecordingNotifier::default())));
        Arc::new(MonitoringExecutor::new(store, checker, processor))
    }

    #[tokio::test]
    async fn test_sweep_probes_valid_checks_and_skips_invalid_ones() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        {
            let mut records = store.records.lock().unwrap();
            records.insert("aaaaaaaaaaaaaaaaaaaa".into(), record("aaaaaaaaaaaaaaaaaaaa"));
            records.insert("bbbbbbbbbbbbbbbbbbbb".into(), record("bbbbbbbbbbbbbbbbbbbb"));
            let mut broken = record("cccccccccccccccccccc");
            broken.as_object_mut().unwrap().remove("successCodes");
            records.insert("cccccccccccccccccccc".into(), broken);
        }
        let checker = Arc::new(FixedChecker { status: 200, probes: AtomicUsize::new(0), delay: Duration::ZERO });
        let logs = Arc::new(AuditLog::new(dir.path()));
        let executor = executor_with(store.clone(), checker.clone(), logs.clone());

        let summary = executor.gather_all_checks().await;

        assert_eq!(summary.listed, 3);
        assert_eq!(summary.processed, 2);
        assert_eq!(summary.invalid, 1);
        assert_eq!(checker.probes.load(Ordering::SeqCst), 2);

        // The invalid record was neither probed nor touched
        let records = store.records.lock().unwrap();
        assert!(records["cccccccccccccccccccc"].get("state").is_none());
        assert_eq!(records["aaaaaaaaaaaaaaaaaaaa"]["state"], "up");
        drop(records);
        assert!(!logs.log_path("cccccccccccccccccccc").unwrap().exists());
    }

    #[tokio::test]
    async fn test_checks_are_probed_in_parallel() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        {
            let mut records = store.records.lock().unwrap();
            for c in ['a', 'b', 'c', 'd', 'e'] {
                let id: String = std::iter::repeat_n(c, 20).collect();
                records.insert(id.clone(), record(&id));
            }
        }
        let checker =
            Arc::new(FixedChecker { status: 200, probes: AtomicUsize::new(0), delay: Duration::from_millis(300) });
        let executor = executor_with(store, checker, Arc::new(AuditLog::new(dir.path())));

        let start = std::time::Instant::now();
        let summary = executor.gather_all_checks().await;

        assert_eq!(summary.processed, 5);
        assert!(start.elapsed() < Duration::from_millis(1200));
    }

    #[tokio::test]
    async fn test_overlapping_sweeps_never_double_process_a_check() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        store.records.lock().unwrap().insert("aaaaaaaaaaaaaaaaaaaa".into(), record("aaaaaaaaaaaaaaaaaaaa"));
        let gate = Arc::new(Notify::new());
        let executor = executor_with(store, Arc::new(GatedChecker { gate: gate.clone() }), Arc::new(AuditLog::new(dir.path())));

        let first = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.gather_all_checks().await })
        };
        // Let the first sweep claim the check and block in the probe
        tokio::time::sleep(Duration::from_millis(100)).await;

        let second = executor.gather_all_checks().await;
        assert_eq!(second.in_flight, 1);
        assert_eq!(second.processed, 0);

        gate.notify_one();
        let first = first.await.unwrap();
        assert_eq!(first.processed, 1);

        // Once released the check is available again
        gate.notify_one();
        assert_eq!(executor.gather_all_checks().await.processed, 1);
    }

    /// Store whose second read takes its snapshot, then stalls until released
    #[derive(Default)]
    struct StallingStore {
        inner: MemoryStore,
        reads: AtomicUsize,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl RecordStore for StallingStore {
        async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError> {
            self.inner.list(collection).await
        }

        async fn read(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
            let snapshot = self.inner.read(collection, id).await;
            if self.reads.fetch_add(1, Ordering::SeqCst) == 1 {
                self.release.notified().await;
            }
            snapshot
        }

        async fn update(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError> {
            self.inner.update(collection, id, record).await
        }
    }

    #[tokio::test]
    async fn test_overlapping_sweep_never_acts_on_a_stale_record() {
        let dir = tempdir().unwrap();
        let store = Arc::new(StallingStore::default());
        let mut down = record("aaaaaaaaaaaaaaaaaaaa");
        down["state"] = json!("down");
        down["lastChecked"] = json!(1_700_000_000_000_i64);
        store.inner.records.lock().unwrap().insert("aaaaaaaaaaaaaaaaaaaa".into(), down);

        let gate = Arc::new(Notify::new());
        let notifier = Arc::new(RecordingNotifier::default());
        let logs = Arc::new(AuditLog::new(dir.path()));
        let processor = Arc::new(OutcomeProcessor::new(store.clone(), logs, notifier.clone()));
        let executor =
            Arc::new(MonitoringExecutor::new(store.clone(), Arc::new(GatedChecker { gate: gate.clone() }), processor));

        let first = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.gather_all_checks().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        // The second sweep starts while the first is still waiting on the endpoint
        let second = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.gather_all_checks().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        gate.notify_one();
        assert_eq!(first.await.unwrap().processed, 1);

        // Whatever the second sweep is waiting on, let it finish
        store.release.notify_one();
        gate.notify_one();
        let second = second.await.unwrap();

        assert_eq!(second.in_flight, 1);
        assert_eq!(second.processed, 0);
        assert_eq!(store.reads.load(Ordering::SeqCst), 1);

        let sent = notifier.sent.lock().unwrap();
        assert_eq!(sent.len(), 1, "one down to up transition alerted {} times", sent.len());
        assert!(sent[0].1.ends_with("is currently up"));
    }

    #[tokio::test]
    async fn test_empty_store_is_reported_not_fatal() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore::default());
        let checker = Arc::new(FixedChecker { status: 200, probes: AtomicUsize::new(0), delay: Duration::ZERO });
        let executor = executor_with(store, checker, Arc::new(AuditLog::new(dir.path())));

        assert_eq!(executor.gather_all_checks().await, SweepSummary::default());
    }

    #[tokio::test]
    async fn test_persist_failure_is_isolated_to_the_check() {
        let dir = tempdir().unwrap();
        let store = Arc::new(MemoryStore { fail_updates: true, ..Default::default() });
        store.records.lock().unwrap().insert("aaaaaaaaaaaaaaaaaaaa".into(), record("aaaaaaaaaaaaaaaaaaaa"));
        store.records.lock().unwrap().insert("bbbbbbbbbbbbbbbbbbbb".into(), record("bbbbbbbbbbbbbbbbbbbb"));
        let checker = Arc::new(FixedChecker { status: 500, probes: AtomicUsize::new(0), delay: Duration::ZERO });
        let executor = executor_with(store, checker.clone(), Arc::new(AuditLog::new(dir.path())));

        let summary = executor.gather_all_checks().await;

        assert_eq!(summary.failed, 2);
        assert_eq!(checker.probes.load(Ordering::SeqCst), 2);
    }
}
