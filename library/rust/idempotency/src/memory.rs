use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::store::IdempotencyStore;
use crate::{IdempotencyError, IdempotencyRecord};

type RecordKey = (String, String);

#[derive(Clone, Default)]
pub struct InMemoryIdempotencyStore {
    data: Arc<RwLock<HashMap<RecordKey, IdempotencyRecord>>>,
}

impl InMemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.data.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.data.read().await.is_empty()
    }
}

#[async_trait]
impl IdempotencyStore for InMemoryIdempotencyStore {
    async fn get(&self, key: &str, actor: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let map = self.data.read().await;
        Ok(map
            .get(&(key.to_string(), actor.to_string()))
            .filter(|record| !record.is_expired())
            .cloned())
    }

    async fn insert(&self, record: IdempotencyRecord) -> Result<(), IdempotencyError> {
        let mut map = self.data.write().await;
        let id = (record.key.clone(), record.actor.clone());
        // 期限切れのレコードは上書きしてよい
        if map.get(&id).is_some_and(|existing| !existing.is_expired()) {
            return Err(IdempotencyError::Duplicate {
                key: record.key,
                actor: record.actor,
            });
        }
        map.insert(id, record);
        Ok(())
    }

    async fn delete(&self, key: &str, actor: &str) -> Result<bool, IdempotencyError> {
        let mut map = self.data.write().await;
        Ok(map.remove(&(key.to_string(), actor.to_string())).is_some())
    }

    async fn purge_expired(&self) -> Result<u64, IdempotencyError> {
        let now = Utc::now();
        let mut map = self.data.write().await;
        let before = map.len();
        map.retain(|_, record| !record.is_expired_at(now));
        Ok(u64::try_from(before - map.len()).unwrap_or(u64::MAX))
    }
}
