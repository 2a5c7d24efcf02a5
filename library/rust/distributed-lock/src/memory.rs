use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::store::LockStore;
use crate::LockError;

struct LockEntry {
    token: String,
    expires_at: Instant,
}

impl LockEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

/// 単一プロセス内でのみ有効なロックストア。
///
/// テストおよびローカル開発用。複数インスタンス構成では Redis 実装を使うこと。
pub struct InMemoryLockStore {
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// 現在保持されているトークンを返す（期限切れは None）。
    pub async fn holder_token(&self, key: &str) -> Option<String> {
        let locks = self.locks.lock().await;
        locks
            .get(key)
            .filter(|e| !e.is_expired())
            .map(|e| e.token.clone())
    }
}

impl Default for InMemoryLockStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LockStore for InMemoryLockStore {
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut locks = self.locks.lock().await;
        if let Some(entry) = locks.get(key) {
            if !entry.is_expired() {
                return Ok(false);
            }
        }
        locks.insert(
            key.to_string(),
            LockEntry {
                token: token.to_string(),
                expires_at: Instant::now() + ttl,
            },
        );
        Ok(true)
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        let mut locks = self.locks.lock().await;
        match locks.get(key) {
            Some(entry) if entry.token == token => {
                locks.remove(key);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn extend(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut locks = self.locks.lock().await;
        match locks.get_mut(key) {
            Some(entry) if entry.token == token && !entry.is_expired() => {
                entry.expires_at = Instant::now() + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn is_locked(&self, key: &str) -> Result<bool, LockError> {
        let locks = self.locks.lock().await;
        Ok(locks.get(key).is_some_and(|e| !e.is_expired()))
    }
}
