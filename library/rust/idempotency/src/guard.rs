use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::store::IdempotencyStore;
use crate::{IdempotencyError, IdempotencyRecord, IdempotencyScope};

fn default_ttl_secs() -> Option<i64> {
    Some(86400)
}

/// IdempotencyGuard の設定
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyConfig {
    /// 保持期間（秒）。None の場合は無期限。
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: Option<i64>,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
        }
    }
}

/// IdempotencyGuard は冪等キー単位で操作結果を保存し、再送時に同じ結果を返す。
#[derive(Clone)]
pub struct IdempotencyGuard {
    store: Arc<dyn IdempotencyStore>,
    config: IdempotencyConfig,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn IdempotencyStore>) -> Self {
        Self {
            store,
            config: IdempotencyConfig::default(),
        }
    }

    pub fn with_config(store: Arc<dyn IdempotencyStore>, config: IdempotencyConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    /// 保存済みの結果を返す。未記録または期限切れなら None。
    ///
    /// 保存時のフィンガープリントと異なるリクエストで同じキーが使われた場合は
    /// `FingerprintMismatch` を返す。
    pub async fn check<T: DeserializeOwned>(
        &self,
        scope: &IdempotencyScope,
        fingerprint: Option<&str>,
    ) -> Result<Option<T>, IdempotencyError> {
        let Some(record) = self.lookup(scope, fingerprint).await? else {
            return Ok(None);
        };
        let value = serde_json::from_str(&record.response_body)?;
        tracing::info!(
            key = %scope.key(),
            actor = %scope.actor(),
            operation = %record.operation,
            "冪等キーに一致する保存済みの結果を返します"
        );
        Ok(Some(value))
    }

    /// 保存済みのレコードをそのまま返す。
    pub async fn lookup(
        &self,
        scope: &IdempotencyScope,
        fingerprint: Option<&str>,
    ) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let record = match self.store.get(scope.key(), scope.actor()).await? {
            Some(r) if !r.is_expired() => r,
            _ => return Ok(None),
        };
        if !record.matches_fingerprint(fingerprint) {
            tracing::warn!(
                key = %scope.key(),
                actor = %scope.actor(),
                operation = %record.operation,
                "冪等キーが異なるリクエストで再利用されました"
            );
            return Err(IdempotencyError::FingerprintMismatch {
                key: scope.key().to_string(),
            });
        }
        Ok(Some(record))
    }

    /// 成功した操作の結果を JSON で保存する。
    ///
    /// 並行実行が先に記録していた場合は `Duplicate` を返す。
    pub async fn record<T: Serialize + ?Sized>(
        &self,
        scope: &IdempotencyScope,
        operation: &str,
        fingerprint: Option<&str>,
        result: &T,
    ) -> Result<IdempotencyRecord, IdempotencyError> {
        let body = serde_json::to_string(result)?;
        let record = IdempotencyRecord::new(
            scope,
            operation,
            fingerprint.map(str::to_string),
            body,
            self.config.ttl_secs,
        );
        self.store.insert(record.clone()).await?;
        tracing::debug!(key = %scope.key(), actor = %scope.actor(), operation, "冪等レコードを保存しました");
        Ok(record)
    }

    pub async fn purge_expired(&self) -> Result<u64, IdempotencyError> {
        let purged = self.store.purge_expired().await?;
        if purged > 0 {
            tracing::info!(purged, "期限切れの冪等レコードを削除しました");
        }
        Ok(purged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MockIdempotencyStore;

    fn scope() -> IdempotencyScope {
        IdempotencyScope::new("w-001", "7").unwrap()
    }

    #[tokio::test]
    async fn test_check_miss_returns_none() {
        let mut store = MockIdempotencyStore::new();
        store.expect_get().returning(|_, _| Ok(None));
        let guard = IdempotencyGuard::new(Arc::new(store));

        let cached: Option<u64> = guard.check(&scope(), None).await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_check_ignores_expired_record() {
        let mut store = MockIdempotencyStore::new();
        store.expect_get().returning(|_, _| {
            let mut record =
                IdempotencyRecord::new(&scope(), "withdraw", None, "42".to_string(), None);
            record.expires_at = Some(chrono::Utc::now() - chrono::Duration::seconds(1));
            Ok(Some(record))
        });
        let guard = IdempotencyGuard::new(Arc::new(store));

        let cached: Option<u64> = guard.check(&scope(), None).await.unwrap();
        assert!(cached.is_none());
    }

    #[tokio::test]
    async fn test_check_storage_error_propagates() {
        let mut store = MockIdempotencyStore::new();
        store
            .expect_get()
            .returning(|_, _| Err(IdempotencyError::StorageError("down".to_string())));
        let guard = IdempotencyGuard::new(Arc::new(store));

        let result: Result<Option<u64>, _> = guard.check(&scope(), None).await;
        assert!(matches!(result, Err(IdempotencyError::StorageError(_))));
    }

    #[tokio::test]
    async fn test_record_uses_configured_ttl() {
        let mut store = MockIdempotencyStore::new();
        store
            .expect_insert()
            .withf(|r| r.key == "w-001" && r.actor == "7" && r.operation == "withdraw")
            .times(1)
            .returning(|_| Ok(()));
        let guard = IdempotencyGuard::with_config(
            Arc::new(store),
            IdempotencyConfig { ttl_secs: Some(60) },
        );

        let record = guard.record(&scope(), "withdraw", None, &42_u64).await.unwrap();
        assert_eq!(record.response_body, "42");
        let ttl = record.expires_at.unwrap() - record.created_at;
        assert_eq!(ttl.num_seconds(), 60);
    }

    #[test]
    fn test_config_default_is_one_day() {
        assert_eq!(IdempotencyConfig::default().ttl_secs, Some(86400));
        let parsed: IdempotencyConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(parsed, IdempotencyConfig::default());
    }
}
