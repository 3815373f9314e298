use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use super::types::{Check, CheckOutcome, CheckState, LogEntry};
use crate::audit::AuditLog;
use crate::notify::Notifier;
use crate::store::{CHECKS, RecordStore, StoreError};

/// State decision for one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
    pub state: CheckState,
    pub alert_warranted: bool,
}

/// What happened to the alert for one probe
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDelivery {
    NotWarranted,
    Sent,
    Failed,
}

/// Result of processing one probe outcome
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessReport {
    pub decision: Decision,
    /// Record as persisted
    pub updated: Check,
    pub alert: AlertDelivery,
}

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("could not serialize check {id}: {source}")]
    Serialize {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("could not persist check {id}: {source}")]
    Persist {
        id: String,
        #[source]
        source: StoreError,
    },
}

/// Decide the new state and whether the owner should hear about it.
///
/// A check is up only when a response arrived with one of its success codes.
/// The first probe of a check (no `last_checked`) only sets a baseline and
/// never alerts.
pub fn decide(check: &Check, outcome: &CheckOutcome) -> Decision {
    let state = match (&outcome.error, outcome.response_code) {
        (None, Some(code)) if check.is_success_code(code) => CheckState::Up,
        _ => CheckState::Down,
    };
    let alert_warranted = check.last_checked.is_some() && check.state != state;

    Decision { state, alert_warranted }
}

/// Human-readable alert text
pub fn alert_message(check: &Check, state: CheckState) -> String {
    format!(
        "Alert: Your check for {} {}://{} is currently {}",
        check.method.as_str().to_uppercase(),
        check.protocol,
        check.url,
        state
    )
}

/// Applies probe outcomes: audit log, record update, alert
pub struct OutcomeProcessor {
    store: Arc<dyn RecordStore>,
    logs: Arc<AuditLog>,
    notifier: Arc<dyn Notifier>,
}

impl OutcomeProcessor {
    pub fn new(store: Arc<dyn RecordStore>, logs: Arc<AuditLog>, notifier: Arc<dyn Notifier>) -> Self {
        Self { store, logs, notifier }
    }

    /// Process one outcome for a check snapshot.
    ///
    /// Steps run in order: log entry, persist, alert. A persist failure ends
    /// processing for this check and no alert is sent; the next tick sees the
    /// old state again and re-detects the change. A failed alert does not
    /// undo the log entry or the persisted state.
    pub async fn process(&self, check: &Check, outcome: CheckOutcome) -> Result<ProcessReport, ProcessError> {
        let decision = decide(check, &outcome);
        let now = chrono::Utc::now().timestamp_millis();

        let entry = LogEntry {
            check: check.clone(),
            outcome,
            state: decision.state,
            alert_sent: decision.alert_warranted,
            time_ms: now,
        };
        if let Err(e) = self.logs.append_entry(&entry).await {
            warn!(check_id = %check.id, "Error writing audit log entry: {}", e);
        }

        let updated = check.observed(decision.state, now);
        let record = serde_json::to_value(&updated)
            .map_err(|source| ProcessError::Serialize { id: check.id.clone(), source })?;
        self.store
            .update(CHECKS, &check.id, &record)
            .await
            .map_err(|source| ProcessError::Persist { id: check.id.clone(), source })?;

        let alert = if decision.alert_warranted {
            let message = alert_message(&updated, decision.state);
            match self.notifier.send(&updated.user_phone, &message).await {
                Ok(()) => {
                    info!(check_id = %check.id, "User was alerted to a status change: {}", message);
                    AlertDelivery::Sent
                }
                Err(e) => {
                    warn!(check_id = %check.id, "Could not alert user to a status change: {}", e);
                    AlertDelivery::Failed
                }
            }
        } else {
            debug!(check_id = %check.id, state = %decision.state, "Check outcome has not changed, no alert needed");
            AlertDelivery::NotWarranted
        };

        Ok(ProcessReport { decision, updated, alert })
    }
}
