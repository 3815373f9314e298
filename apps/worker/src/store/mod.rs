//! Record store abstraction
//!
//! The worker only lists, reads and updates records; creating and deleting
//! checks belongs to the CRUD layer that owns them.

pub mod file;

pub use file::FileStore;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub const CHECKS: &str = "checks";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {collection}/{id} not found")]
    NotFound { collection: String, id: String },
    #[error("record {collection}/{id} already exists")]
    AlreadyExists { collection: String, id: String },
    #[error("invalid record id: {0:?}")]
    InvalidId(String),
    #[error("record store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("record could not be serialized: {0}")]
    Json(#[from] serde_json::Error),
}

/// Key-value-by-collection storage of JSON records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Ids of every record in a collection
    async fn list(&self, collection: &str) -> Result<Vec<String>, StoreError>;

    /// Raw record, of whatever shape it was written with
    async fn read(&self, collection: &str, id: &str) -> Result<Value, StoreError>;

    /// Replace an existing record
    async fn update(&self, collection: &str, id: &str, record: &Value) -> Result<(), StoreError>;
}
