use std::time::Duration;

use async_trait::async_trait;

use crate::LockError;

/// LockStore はプロセス間で共有されるロックストアのアトミック操作を表す。
///
/// すべての操作はストア側で単一のアトミック命令として実行されなければならない。
/// TTL はロック保持者がクラッシュした場合の安全網であり、期限切れのキーは
/// 他の保持者が取得できる。
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait LockStore: Send + Sync {
    /// キーが存在しない場合のみ `token` を TTL 付きで書き込む（set-if-absent-with-expiry）。
    /// 取得できた場合は true、他の保持者がいる場合は false を返す。
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError>;

    /// 保存されているトークンが一致する場合のみキーを削除する（delete-if-owner）。
    /// 削除した場合は true を返す。
    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError>;

    /// 保存されているトークンが一致する場合のみ TTL を延長する。
    async fn extend(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError>;

    /// 有効なロックが存在するかを返す。
    async fn is_locked(&self, key: &str) -> Result<bool, LockError>;
}
