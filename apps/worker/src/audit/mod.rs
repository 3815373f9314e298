//! Append-only audit logs of probe outcomes.
//!
//! Each check writes to `<logs_dir>/<check_id>.log`, one JSON document per
//! line. Rotation compresses a log into `<logs_dir>/<archive_id>.gz.b64`
//! (gzip, then base64) and truncates the live file in place.
//!
//! Appends and rotation of the same log are serialized with a per-file
//! lock so an in-flight append can never be lost to a truncate.

pub mod rotation;

pub use rotation::{LogRotator, RotationSummary};

use std::collections::HashMap;
use std::io::{ErrorKind, Read, Write};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use base64::{Engine, engine::general_purpose::STANDARD};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use crate::monitoring::types::LogEntry;

pub const LOG_EXTENSION: &str = ".log";
pub const ARCHIVE_EXTENSION: &str = ".gz.b64";

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("log entry could not be serialized: {0}")]
    Json(#[from] serde_json::Error),
    #[error("archive is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
    #[error("archive {0} already exists")]
    ArchiveExists(String),
    #[error("invalid log id: {0:?}")]
    InvalidId(String),
    #[error("compression task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// Names found in the logs directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogName {
    Live(String),
    Archive(String),
}

impl LogName {
    pub fn id(&self) -> &str {
        match self {
            LogName::Live(id) | LogName::Archive(id) => id,
        }
    }
}

/// Directory of append-only logs
#[derive(Debug)]
pub struct AuditLog {
    dir: PathBuf,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), locks: Mutex::new(HashMap::new()) }
    }

    fn checked_id(id: &str) -> Result<&str, AuditError> {
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(AuditError::InvalidId(id.to_string()));
        }
        Ok(id)
    }

    pub fn log_path(&self, id: &str) -> Result<PathBuf, AuditError> {
        Ok(self.dir.join(format!("{}{LOG_EXTENSION}", Self::checked_id(id)?)))
    }

    pub fn archive_path(&self, archive_id: &str) -> Result<PathBuf, AuditError> {
        Ok(self.dir.join(format!("{}{ARCHIVE_EXTENSION}", Self::checked_id(archive_id)?)))
    }

    /// Lock guarding one live log file
    pub(crate) fn file_lock(&self, id: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(id.to_string()).or_default().clone()
    }

    /// Forget the locks of logs that no longer exist.
    ///
    /// A lock still held or awaited by someone is kept whatever its id.
    pub(crate) fn retain_locks(&self, live_ids: &[String]) {
        let mut locks = self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.retain(|id, lock| Arc::strong_count(lock) > 1 || live_ids.contains(id));
    }

    #[cfg(test)]
    fn tracked_locks(&self) -> usize {
        self.locks.lock().unwrap().len()
    }

    /// Append one line to a log, creating the file (and directory) if needed
    pub async fn append(&self, id: &str, line: &str) -> Result<(), AuditError> {
        let path = self.log_path(id)?;
        let lock = self.file_lock(id);
        let _guard = lock.lock().await;

        fs::create_dir_all(&self.dir).await?;
        let mut file = fs::OpenOptions::new().create(true).append(true).open(&path).await?;

        let mut buf = String::with_capacity(line.len() + 1);
        buf.push_str(line);
        buf.push('\n');
        file.write_all(buf.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Serialize and append a probe outcome to its check's log
    pub async fn append_entry(&self, entry: &LogEntry) -> Result<(), AuditError> {
        let line = serde_json::to_string(entry)?;
        self.append(&entry.check.id, &line).await
    }

    /// Live logs, plus archives when `include_compressed` is set
    pub async fn list(&self, include_compressed: bool) -> Result<Vec<LogName>, AuditError> {
        let mut entries = match fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let Ok(file_name) = entry.file_name().into_string() else {
                continue;
            };
            if let Some(id) = file_name.strip_suffix(LOG_EXTENSION) {
                names.push(LogName::Live(id.to_string()));
            } else if let Some(id) = file_name.strip_suffix(ARCHIVE_EXTENSION) {
                if include_compressed {
                    names.push(LogName::Archive(id.to_string()));
                }
            }
        }
        names.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(names)
    }

    /// Compress the current contents of a live log into a new archive.
    ///
    /// Fails with [`AuditError::ArchiveExists`] rather than overwrite an
    /// existing archive. The live log is left untouched.
    pub async fn compress(&self, id: &str, archive_id: &str) -> Result<(), AuditError> {
        let lock = self.file_lock(id);
        let _guard = lock.lock().await;
        self.compress_locked(id, archive_id).await
    }

    pub(crate) async fn compress_locked(&self, id: &str, archive_id: &str) -> Result<(), AuditError> {
        let source = self.log_path(id)?;
        let dest = self.archive_path(archive_id)?;

        let contents = fs::read(&source).await?;
        let encoded = tokio::task::spawn_blocking(move || gzip_base64(&contents)).await??;

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&dest).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(AuditError::ArchiveExists(archive_id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        file.write_all(encoded.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Contents of an archive as they were before compression
    pub async fn decompress(&self, archive_id: &str) -> Result<String, AuditError> {
        let encoded = fs::read_to_string(self.archive_path(archive_id)?).await?;
        let decoded = tokio::task::spawn_blocking(move || gunzip_base64(&encoded)).await??;
        Ok(decoded)
    }

    /// Empty a live log in place, keeping the file
    pub async fn truncate(&self, id: &str) -> Result<(), AuditError> {
        let lock = self.file_lock(id);
        let _guard = lock.lock().await;
        self.truncate_locked(id).await
    }

    pub(crate) async fn truncate_locked(&self, id: &str) -> Result<(), AuditError> {
        let file = fs::OpenOptions::new().write(true).open(self.log_path(id)?).await?;
        file.set_len(0).await?;
        file.sync_all().await?;
        Ok(())
    }
}

fn gzip_base64(contents: &[u8]) -> Result<String, AuditError> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(contents)?;
    Ok(STANDARD.encode(encoder.finish()?))
}

fn gunzip_base64(encoded: &str) -> Result<String, AuditError> {
    let compressed = STANDARD.decode(encoded.trim())?;
    let mut decoded = String::new();
    GzDecoder::new(compressed.as_slice()).read_to_string(&mut decoded)?;
    Ok(decoded)
}
