use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use uuid::Uuid;

use crate::handle::{LockHandle, LockSet};
use crate::store::LockStore;
use crate::LockError;

/// ロックストアに到達できない場合の振る舞い。
///
/// 金融系の操作では必ず `FailClosed` を使うこと。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FallbackPolicy {
    /// 操作自体を失敗させる。
    #[default]
    FailClosed,
    /// ロック無しで続行し、error レベルでログを出す。
    ProceedUnlocked,
}

/// ロック取得時のオプション。呼び出し箇所ごとに明示する。
#[derive(Debug, Clone)]
pub struct LockOptions {
    /// ストア上のロックの有効期限。保持者がクラッシュした場合の安全網。
    pub ttl: Duration,
    /// 取得を待つ最大時間。ゼロの場合は 1 回だけ試行する。
    pub wait_timeout: Duration,
    /// 再試行の間隔。
    pub poll_interval: Duration,
    pub fallback: FallbackPolicy,
}

impl Default for LockOptions {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(10),
            wait_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(50),
            fallback: FallbackPolicy::FailClosed,
        }
    }
}

impl LockOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_fallback(mut self, fallback: FallbackPolicy) -> Self {
        self.fallback = fallback;
        self
    }

    /// 待機せず 1 回だけ取得を試みる。
    pub fn fail_fast(mut self) -> Self {
        self.wait_timeout = Duration::ZERO;
        self
    }
}

/// LockManager は共有ロックストア上の名前付きロックを取得・解放する。
///
/// 取得待ちのあいだ呼び出し元タスクは `poll_interval` ごとにサスペンドする。
/// 待機中に future が drop された場合、各試行はアトミックなので何も保持されない。
#[derive(Clone)]
pub struct LockManager {
    store: Arc<dyn LockStore>,
    holder_id: String,
}

impl LockManager {
    pub fn new(store: Arc<dyn LockStore>) -> Self {
        Self {
            store,
            holder_id: format!("holder-{}", Uuid::new_v4()),
        }
    }

    /// 保持者 ID を設定する（ホスト名やインスタンス ID など）。
    pub fn with_holder_id(mut self, holder_id: impl Into<String>) -> Self {
        self.holder_id = holder_id.into();
        self
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    /// ロックを取得する。`wait_timeout` 内に取得できなければ `LockError::Timeout`。
    pub async fn acquire(&self, key: &str, options: &LockOptions) -> Result<LockHandle, LockError> {
        let deadline = Instant::now() + options.wait_timeout;
        self.acquire_until(key, options, deadline).await
    }

    /// 複数のロックをキーのソート順に取得する。
    ///
    /// 取得順を固定することで、同じリソース集合を扱う操作同士のデッドロックを防ぐ。
    /// 待機時間は全キー合計で `wait_timeout` まで。途中で失敗した場合は取得済みのロックを解放する。
    pub async fn acquire_many<I, K>(&self, keys: I, options: &LockOptions) -> Result<LockSet, LockError>
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        let mut keys: Vec<String> = keys.into_iter().map(Into::into).collect();
        keys.sort();
        keys.dedup();

        let deadline = Instant::now() + options.wait_timeout;
        let mut handles = Vec::with_capacity(keys.len());
        for key in &keys {
            match self.acquire_until(key, options, deadline).await {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    let partial = LockSet::new(handles);
                    if let Err(release_err) = partial.release().await {
                        tracing::warn!(error = %release_err, "取得途中のロックの解放に失敗しました");
                    }
                    return Err(e);
                }
            }
        }
        Ok(LockSet::new(handles))
    }

    /// ロックを解放する。所有権が失われている場合は何もしない。
    pub async fn release(&self, handle: LockHandle) -> Result<(), LockError> {
        handle.release().await
    }

    pub async fn is_locked(&self, key: &str) -> Result<bool, LockError> {
        self.store.is_locked(key).await
    }

    /// ロックを保持したまま `body` を 1 回だけ実行する。
    ///
    /// `body` のエラーはロック解放後にそのまま返す。解放の失敗はログに残し、
    /// `body` の結果を上書きしない。
    pub async fn with_lock<F, Fut, T, E>(
        &self,
        key: &str,
        options: &LockOptions,
        body: F,
    ) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<LockError>,
    {
        let handle = self.acquire(key, options).await?;
        let result = body().await;
        if let Err(e) = handle.release().await {
            tracing::warn!(key = %key, error = %e, "クリティカルセクション後のロック解放に失敗しました");
        }
        result
    }

    async fn acquire_until(
        &self,
        key: &str,
        options: &LockOptions,
        deadline: Instant,
    ) -> Result<LockHandle, LockError> {
        let token = format!("{}:{}", self.holder_id, Uuid::new_v4());
        tracing::debug!(key = %key, holder = %self.holder_id, "ロックを取得します");

        loop {
            match self.store.try_acquire(key, &token, options.ttl).await {
                Ok(true) => {
                    tracing::debug!(key = %key, holder = %self.holder_id, "ロックを取得しました");
                    return Ok(LockHandle::held(
                        self.store.clone(),
                        key.to_string(),
                        token,
                        self.holder_id.clone(),
                        options.wait_timeout,
                        options.ttl,
                    ));
                }
                Ok(false) => {
                    let now = Instant::now();
                    if now >= deadline {
                        tracing::warn!(key = %key, timeout = ?options.wait_timeout, "ロックの取得がタイムアウトしました");
                        return Err(LockError::Timeout {
                            key: key.to_string(),
                            timeout: options.wait_timeout,
                        });
                    }
                    tokio::time::sleep(options.poll_interval.min(deadline - now)).await;
                }
                Err(LockError::StoreUnavailable(reason)) => {
                    return match options.fallback {
                        FallbackPolicy::FailClosed => {
                            tracing::error!(key = %key, reason = %reason, "ロックストアに接続できません");
                            Err(LockError::StoreUnavailable(reason))
                        }
                        FallbackPolicy::ProceedUnlocked => {
                            tracing::error!(
                                key = %key,
                                reason = %reason,
                                "ロックストアに接続できないため、ロックなしで続行します"
                            );
                            Ok(LockHandle::degraded(
                                key.to_string(),
                                self.holder_id.clone(),
                                options.wait_timeout,
                                options.ttl,
                            ))
                        }
                    };
                }
                Err(e) => return Err(e),
            }
        }
    }
}
