use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use super::{RecordStore, StoreError};

const EXTENSION: &str = "json";

/// Record store backed by one JSON file per record:
/// `<base_dir>/<collection>/<id>.json`
#[derive(Debug, Clone)]
pub struct FileStore {
    base_dir: PathBuf,
}

impl FileStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self { base_dir: base_dir.into() }
    }

    fn record_path(&self, collection: &str, id: &str) -> Result<PathBuf, StoreError> {
        // Ids become file names; refuse anything that could escape the collection
        if id.is_empty() || id.contains(['/', '\\']) || id.starts_with('.') {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.base_dir.join(collection).join(format!("{id}.{EXTENSION}")))
    }

    /// Write a new record, failing if one already exists under that id
    pub async fn create(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError> {
        let path = self.record_path(collection, id)?;
        fs::create_dir_all(self.base_dir.join(collection)).await?;

        let mut file = match fs::OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists {
                    collection: collection.to_string(),
                    id: id.to_string(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        file.write_all(&serde_json::to_vec(record)?).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn delete(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let path = self.record_path(collection, id)?;
        fs::remove_file(&path).await.map_err(|e| not_found_or_io(e, collection, id))
    }
}

fn not_found_or_io(error: std::io::Error, collection: &str, id: &str) -> StoreError {
    if error.kind() == ErrorKind::NotFound {
        StoreError::NotFound { collection: collection.to_string(), id: id.to_string() }
    } else {
        StoreError::Io(error)
    }
}

#[async_trait]
impl RecordStore for FileStore {
    async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError> {
        let mut entries = match fs::read_dir(self.base_dir.join(collection)).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == EXTENSION) {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn read(&self, collection: &str, id: &str) -> Result<Value, StoreError> {
        let path = self.record_path(collection, id)?;
        let raw = fs::read(&path).await.map_err(|e| not_found_or_io(e, collection, id))?;

        // Unparseable documents read as an empty object and fail validation later
        Ok(serde_json::from_slice(&raw).unwrap_or_else(|e| {
            debug!(%collection, %id, "Record is not valid JSON: {}", e);
            Value::Object(Default::default())
        }))
    }

    async fn update(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError> {
        let path = self.record_path(collection, id)?;
        let bytes = serde_json::to_vec(record)?;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&path)
            .await
            .map_err(|e| not_found_or_io(e, collection, id))?;
        file.write_all(&bytes).await?;
        file.flush().await?;
        Ok(())
    }
}
