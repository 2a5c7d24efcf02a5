use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::store::LockStore;
use crate::LockError;

/// LockHandle は取得済みロック 1 件を表す。
///
/// 明示的に [`LockHandle::release`] を呼ぶのが基本だが、解放されないまま drop された場合
/// （タスクのキャンセルや panic）は現在の tokio ランタイム上で解放処理を spawn する。
/// ランタイムが無い場合はストアの TTL に任せる。
pub struct LockHandle {
    key: String,
    token: String,
    holder: String,
    acquired_at: DateTime<Utc>,
    wait_timeout: Duration,
    ttl: Duration,
    degraded: bool,
    store: Option<Arc<dyn LockStore>>,
}

impl LockHandle {
    pub(crate) fn held(
        store: Arc<dyn LockStore>,
        key: String,
        token: String,
        holder: String,
        wait_timeout: Duration,
        ttl: Duration,
    ) -> Self {
        Self {
            key,
            token,
            holder,
            acquired_at: Utc::now(),
            wait_timeout,
            ttl,
            degraded: false,
            store: Some(store),
        }
    }

    /// ストア障害時にロック無しで続行するためのハンドル。
    pub(crate) fn degraded(key: String, holder: String, wait_timeout: Duration, ttl: Duration) -> Self {
        Self {
            key,
            token: String::new(),
            holder,
            acquired_at: Utc::now(),
            wait_timeout,
            ttl,
            degraded: true,
            store: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn holder(&self) -> &str {
        &self.holder
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    pub fn wait_timeout(&self) -> Duration {
        self.wait_timeout
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// ロックストアに到達できずロック無しで続行している場合 true。
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn is_held(&self) -> bool {
        !self.degraded && self.store.is_some()
    }

    /// ロックの TTL を延長する。長時間のクリティカルセクション向け。
    pub async fn extend(&self, ttl: Duration) -> Result<(), LockError> {
        if self.degraded {
            return Ok(());
        }
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| LockError::NotHeld(self.key.clone()))?;
        if store.extend(&self.key, &self.token, ttl).await? {
            Ok(())
        } else {
            Err(LockError::NotHeld(self.key.clone()))
        }
    }

    /// ロックを解放する。
    ///
    /// トークンが一致しない（期限切れ後に別の保持者が取得した）場合は何もしない。
    pub async fn release(mut self) -> Result<(), LockError> {
        let Some(store) = self.store.take() else {
            return Ok(());
        };
        let released = store.release(&self.key, &self.token).await?;
        if released {
            tracing::debug!(key = %self.key, holder = %self.holder, "ロックを解放しました");
        } else {
            tracing::debug!(
                key = %self.key,
                holder = %self.holder,
                "ロックは期限切れか別の保持者のものなので解放をスキップしました"
            );
        }
        Ok(())
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        let Some(store) = self.store.take() else {
            return;
        };
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(key = %self.key, "tokio ランタイム外で破棄されたため TTL 満了を待ちます");
            return;
        };
        tracing::warn!(key = %self.key, holder = %self.holder, "解放されずに破棄されたためバックグラウンドで解放します");
        let key = std::mem::take(&mut self.key);
        let token = std::mem::take(&mut self.token);
        runtime.spawn(async move {
            if let Err(e) = store.release(&key, &token).await {
                tracing::warn!(key = %key, error = %e, "バックグラウンドでの解放に失敗したため TTL 満了を待ちます");
            }
        });
    }
}

impl std::fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("key", &self.key)
            .field("holder", &self.holder)
            .field("acquired_at", &self.acquired_at)
            .field("degraded", &self.degraded)
            .field("held", &self.is_held())
            .finish_non_exhaustive()
    }
}

/// LockSet は順序付きで取得した複数のロックをまとめて保持する。
/// 解放は取得と逆順に行う。
#[derive(Debug, Default)]
pub struct LockSet {
    handles: Vec<LockHandle>,
}

impl LockSet {
    pub(crate) fn new(handles: Vec<LockHandle>) -> Self {
        Self { handles }
    }

    pub fn keys(&self) -> Vec<&str> {
        self.handles.iter().map(LockHandle::key).collect()
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn is_degraded(&self) -> bool {
        self.handles.iter().any(LockHandle::is_degraded)
    }

    /// すべてのロックを解放する。途中で失敗しても残りの解放は続け、最初のエラーを返す。
    pub async fn release(mut self) -> Result<(), LockError> {
        let mut first_error = None;
        while let Some(handle) = self.handles.pop() {
            let key = handle.key().to_string();
            if let Err(e) = handle.release().await {
                tracing::warn!(key = %key, error = %e, "ロックの解放に失敗しました");
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

impl Drop for LockSet {
    fn drop(&mut self) {
        // 逆順に drop して各 LockHandle の解放処理に委ねる
        while let Some(handle) = self.handles.pop() {
            drop(handle);
        }
    }
}
