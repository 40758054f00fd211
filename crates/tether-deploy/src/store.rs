//! Deployment record persistence.
//!
//! The pipeline persists records after every transition so duplicate
//! deliveries replay the stored result. [`RecordStore`] is the seam; the
//! in-memory implementation backs the service and tests alike.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Mutex;

use tether_core::DeploymentRecord;

/// The record store could not serve a request.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing store is unavailable.
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Keyed storage for deployment records.
#[async_trait]
pub trait RecordStore: Send + Sync + std::fmt::Debug {
    /// Fetches the record for an idempotency key, if one exists.
    async fn find(&self, key: &str) -> Result<Option<DeploymentRecord>, StoreError>;

    /// Inserts or replaces the record under its key.
    async fn upsert(&self, record: &DeploymentRecord) -> Result<(), StoreError>;
}

/// In-memory record store.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: Mutex<HashMap<String, DeploymentRecord>>,
}

impl InMemoryRecordStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records currently held.
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    /// Whether the store holds no records.
    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn find(&self, key: &str) -> Result<Option<DeploymentRecord>, StoreError> {
        Ok(self.records.lock().await.get(key).cloned())
    }

    async fn upsert(&self, record: &DeploymentRecord) -> Result<(), StoreError> {
        self.records.lock().await.insert(record.key.clone(), record.clone());
        Ok(())
    }
}
