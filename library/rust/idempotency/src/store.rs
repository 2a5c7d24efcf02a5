use async_trait::async_trait;

use crate::{IdempotencyError, IdempotencyRecord};

#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// レコードを取得する（期限切れは None を返す）
    async fn get(&self, key: &str, actor: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError>;
    /// 新規レコードを挿入する（(key, actor) の重複は Err(Duplicate)）
    async fn insert(&self, record: IdempotencyRecord) -> Result<(), IdempotencyError>;
    /// レコードを削除する
    async fn delete(&self, key: &str, actor: &str) -> Result<bool, IdempotencyError>;
    /// 期限切れレコードを削除し、削除件数を返す
    async fn purge_expired(&self) -> Result<u64, IdempotencyError>;
}
