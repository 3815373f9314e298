//! Uptime worker: probes user-defined HTTP(S) checks on a schedule, alerts
//! the owner when a check changes state and keeps a rotated audit log of
//! every probe.

pub mod audit;
pub mod config;
pub mod monitoring;
pub mod notify;
pub mod store;

use std::sync::Arc;

use tracing::warn;

use crate::audit::{AuditLog, LogRotator};
use crate::config::{AlertProvider, Config};
use crate::monitoring::{HttpChecker, MonitoringExecutor, OutcomeProcessor, WorkerScheduler};
use crate::notify::{LogNotifier, Notifier, TwilioNotifier};
use crate::store::{FileStore, RecordStore};

/// Pick the notifier described by the configuration.
///
/// Twilio without credentials falls back to logging alerts.
pub fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    let alerts = &config.alerts;
    match (alerts.provider, &alerts.account_sid, &alerts.auth_token) {
        (AlertProvider::Twilio, Some(sid), Some(token)) if !sid.is_empty() && !token.is_empty() => {
            Arc::new(TwilioNotifier::new(&alerts.api_base, sid, token, &alerts.from_phone, &alerts.country_code))
        }
        (AlertProvider::Twilio, _, _) => {
            warn!("Twilio credentials missing, alerts will only be logged");
            Arc::new(LogNotifier)
        }
        (AlertProvider::Log, _, _) => Arc::new(LogNotifier),
    }
}

/// Wire store, audit log, notifier and checker into a ready-to-start scheduler
pub fn build_scheduler(config: &Config) -> reqwest::Result<WorkerScheduler> {
    let store: Arc<dyn RecordStore> = Arc::new(FileStore::new(&config.storage.data_dir));
    let logs = Arc::new(AuditLog::new(&config.storage.logs_dir));
    let notifier = build_notifier(config);
    let checker = Arc::new(HttpChecker::new(&config.worker.user_agent)?);

    let processor = Arc::new(OutcomeProcessor::new(store.clone(), logs.clone(), notifier));
    let executor = Arc::new(MonitoringExecutor::new(store, checker, processor));
    let rotator = Arc::new(LogRotator::new(logs));

    Ok(WorkerScheduler::new(executor, rotator)
        .with_intervals(config.worker.check_interval(), config.worker.rotation_interval()))
}
