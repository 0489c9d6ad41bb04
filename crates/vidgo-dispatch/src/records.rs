//! Generation record store seam and in-memory implementation.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use vidgo_models::GenerationRecord;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Generation store backend error: {0}")]
    Backend(String),
}

/// Durable store for generation records.
///
/// Records are immutable after insert, except for soft-delete by the owner.
#[async_trait]
pub trait GenerationStore: Send + Sync {
    async fn insert(&self, record: &GenerationRecord) -> Result<(), StoreError>;

    async fn get(&self, id: &str) -> Result<Option<GenerationRecord>, StoreError>;

    /// Non-deleted records for a user, newest first.
    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<GenerationRecord>, StoreError>;

    /// Soft-delete a record the given user owns. Returns false when the
    /// record does not exist or belongs to someone else.
    async fn soft_delete(&self, id: &str, user_id: &str) -> Result<bool, StoreError>;
}

/// In-memory record store.
#[derive(Default)]
pub struct MemoryGenerationStore {
    records: RwLock<Vec<GenerationRecord>>,
}

impl MemoryGenerationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total records held, including soft-deleted (tests).
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }
}

#[async_trait]
impl GenerationStore for MemoryGenerationStore {
    async fn insert(&self, record: &GenerationRecord) -> Result<(), StoreError> {
        let mut records = self.records.write().await;
        records.push(record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<GenerationRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records.iter().find(|r| r.id == id).cloned())
    }

    async fn list_for_user(
        &self,
        user_id: &str,
        limit: usize,
    ) -> Result<Vec<GenerationRecord>, StoreError> {
        let records = self.records.read().await;
        Ok(records
            .iter()
            .rev()
            .filter(|r| r.user_id.as_deref() == Some(user_id) && !r.deleted)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn soft_delete(&self, id: &str, user_id: &str) -> Result<bool, StoreError> {
        let mut records = self.records.write().await;
        match records
            .iter_mut()
            .find(|r| r.id == id && r.user_id.as_deref() == Some(user_id))
        {
            Some(record) => {
                record.deleted = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
