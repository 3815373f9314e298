use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use super::{AuditError, AuditLog, LogName};

/// Attempts at finding a free archive name before giving up on a log
const MAX_NAME_ATTEMPTS: i64 = 16;

/// Result of one rotation sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RotationSummary {
    /// Archive ids written in this sweep
    pub rotated: Vec<String>,
    /// Log ids that could not be rotated
    pub failed: Vec<String>,
}

/// Compresses live logs into archives and truncates them
pub struct LogRotator {
    logs: Arc<AuditLog>,
}

impl LogRotator {
    pub fn new(logs: Arc<AuditLog>) -> Self {
        Self { logs }
    }

    /// Rotate every uncompressed log.
    ///
    /// Logs are rotated concurrently; a failure on one is reported and the
    /// others carry on.
    pub async fn rotate_all_logs(&self) -> RotationSummary {
        let ids: Vec<String> = match self.logs.list(false).await {
            Ok(names) => names
                .into_iter()
                .filter_map(|name| match name {
                    LogName::Live(id) => Some(id),
                    LogName::Archive(_) => None,
                })
                .collect(),
            Err(e) => {
                warn!("Could not list logs to rotate: {}", e);
                return RotationSummary::default();
            }
        };

        self.logs.retain_locks(&ids);

        if ids.is_empty() {
            debug!("No logs to rotate");
            return RotationSummary::default();
        }

        let results = join_all(ids.iter().map(|id| self.rotate(id))).await;

        let mut summary = RotationSummary::default();
        for (id, result) in ids.into_iter().zip(results) {
            match result {
                Ok(archive_id) => summary.rotated.push(archive_id),
                Err(e) => {
                    warn!(log_id = %id, "Error rotating log: {}", e);
                    summary.failed.push(id);
                }
            }
        }

        info!("Log rotation finished: {} rotated, {} failed", summary.rotated.len(), summary.failed.len());
        summary
    }

    /// Compress one log into `<id>-<epoch ms>` and truncate it.
    ///
    /// The per-file lock is held from read to truncate, so appends land
    /// either in the archive or in the emptied log, never in neither.
    pub async fn rotate(&self, id: &str) -> Result<String, AuditError> {
        let lock = self.logs.file_lock(id);
        let _guard = lock.lock().await;

        let stamp = chrono::Utc::now().timestamp_millis();
        let mut archive_id = None;
        for offset in 0..MAX_NAME_ATTEMPTS {
            let candidate = format!("{}-{}", id, stamp + offset);
            match self.logs.compress_locked(id, &candidate).await {
                Ok(()) => {
                    archive_id = Some(candidate);
                    break;
                }
                Err(AuditError::ArchiveExists(_)) => continue,
                Err(e) => return Err(e),
            }
        }
        let archive_id = archive_id.ok_or_else(|| AuditError::ArchiveExists(format!("{id}-{stamp}")))?;

        self.logs.truncate_locked(id).await?;
        debug!(log_id = %id, %archive_id, "Log rotated");
        Ok(archive_id)
    }
}
