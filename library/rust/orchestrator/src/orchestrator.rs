use std::future::Future;

use tonmart_distributed_lock::{LockManager, LockOptions};
use tonmart_idempotency::{IdempotencyGuard, IdempotencyScope};
use tonmart_retry::{with_retry_classified, RetryConfig, RetryError, Retryable};
use tonmart_unit_of_work::UnitOfWorkFactory;

use crate::error::OrchestratorError;
use crate::operation::Operation;

/// 実行結果と、それが保存済みの結果の再生だったかどうか。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completed<T> {
    pub output: T,
    /// true なら今回の呼び出しでは何も実行していない
    pub replayed: bool,
}

impl<T> Completed<T> {
    fn executed(output: T) -> Self {
        Self {
            output,
            replayed: false,
        }
    }

    fn replayed(output: T) -> Self {
        Self {
            output,
            replayed: true,
        }
    }
}

/// OperationOrchestrator は冪等キー、分散ロック、トランザクションを 1 つの業務操作の
/// 周りに組み合わせる。
///
/// 処理順は 冪等キー確認 → ロック取得 → 冪等キー再確認 → トランザクション開始 →
/// 業務処理 → コミット（失敗時はロールバック） → 冪等レコード保存 → ロック解放。
pub struct OperationOrchestrator<F: UnitOfWorkFactory> {
    locks: LockManager,
    idempotency: IdempotencyGuard,
    factory: F,
    lock_options: LockOptions,
    retry: RetryConfig,
}

impl<F: UnitOfWorkFactory> OperationOrchestrator<F> {
    pub fn new(locks: LockManager, idempotency: IdempotencyGuard, factory: F) -> Self {
        Self {
            locks,
            idempotency,
            factory,
            lock_options: LockOptions::default(),
            retry: RetryConfig::network(),
        }
    }

    pub fn with_lock_options(mut self, options: LockOptions) -> Self {
        self.lock_options = options;
        self
    }

    pub fn with_retry_config(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }

    pub fn factory(&self) -> &F {
        &self.factory
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    pub fn idempotency_guard(&self) -> &IdempotencyGuard {
        &self.idempotency
    }

    pub fn lock_options(&self) -> &LockOptions {
        &self.lock_options
    }

    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// 業務操作を実行する。
    ///
    /// `scope` が Some で保存済みの結果があれば、ロックもトランザクションも取らずに
    /// その結果を返す。ロックはどの経路で終了しても解放される。
    pub async fn run<O>(
        &self,
        op: O,
        scope: Option<IdempotencyScope>,
    ) -> Result<O::Output, OrchestratorError<O::Error>>
    where
        O: Operation<F::Session>,
    {
        self.run_detailed(op, scope).await.map(|c| c.output)
    }

    /// [`run`](Self::run) と同じだが、結果が再生かどうかも返す。
    ///
    /// コミット後に外部へ通知する呼び出し側が、再生時の重複通知を避けるために使う。
    pub async fn run_detailed<O>(
        &self,
        op: O,
        scope: Option<IdempotencyScope>,
    ) -> Result<Completed<O::Output>, OrchestratorError<O::Error>>
    where
        O: Operation<F::Session>,
    {
        let fingerprint = op.fingerprint();

        if let Some(scope) = &scope {
            if let Some(cached) = self
                .idempotency
                .check::<O::Output>(scope, fingerprint.as_deref())
                .await
                .map_err(OrchestratorError::Idempotency)?
            {
                tracing::info!(operation = op.name(), key = %scope.key(), "保存済みの結果を返します");
                return Ok(Completed::replayed(cached));
            }
        }

        let lock_options = match op.fallback() {
            Some(fallback) => self.lock_options.clone().with_fallback(fallback),
            None => self.lock_options.clone(),
        };
        let locks = self
            .locks
            .acquire_many(op.lock_keys(), &lock_options)
            .await
            .map_err(OrchestratorError::Lock)?;
        if locks.is_degraded() {
            tracing::error!(operation = op.name(), "ロックなしで操作を実行します");
        }

        let result = self
            .run_locked(&op, scope.as_ref(), fingerprint.as_deref())
            .await;

        if let Err(e) = locks.release().await {
            tracing::warn!(operation = op.name(), error = %e, "ロックの解放に失敗しました");
        }
        result
    }

    async fn run_locked<O>(
        &self,
        op: &O,
        scope: Option<&IdempotencyScope>,
        fingerprint: Option<&str>,
    ) -> Result<Completed<O::Output>, OrchestratorError<O::Error>>
    where
        O: Operation<F::Session>,
    {
        // ロック待ちの間に同じキーの並行リクエストが完了している場合がある
        if let Some(scope) = scope {
            if let Some(cached) = self
                .idempotency
                .check::<O::Output>(scope, fingerprint)
                .await
                .map_err(OrchestratorError::Idempotency)?
            {
                tracing::info!(
                    operation = op.name(),
                    key = %scope.key(),
                    "ロック取得後に保存済みの結果が見つかりました"
                );
                return Ok(Completed::replayed(cached));
            }
        }

        let mut uow = self
            .factory
            .begin()
            .await
            .map_err(OrchestratorError::UnitOfWork)?;

        let output = match op.execute(uow.session_mut()).await {
            Ok(output) => output,
            Err(e) => {
                tracing::warn!(operation = op.name(), error = %e, "操作が失敗したためロールバックします");
                if let Err(rollback_err) = uow.rollback().await {
                    tracing::error!(operation = op.name(), error = %rollback_err, "ロールバックに失敗しました");
                }
                return Err(OrchestratorError::Operation(e));
            }
        };

        uow.commit().await.map_err(OrchestratorError::UnitOfWork)?;
        tracing::info!(operation = op.name(), "操作をコミットしました");

        if let Some(scope) = scope {
            if let Err(e) = self
                .idempotency
                .record(scope, op.name(), fingerprint, &output)
                .await
            {
                tracing::error!(
                    operation = op.name(),
                    key = %scope.key(),
                    error = %e,
                    "コミット済みの結果を冪等キーに保存できませんでした"
                );
                return Err(OrchestratorError::IdempotencyRecord(e));
            }
        }
        Ok(Completed::executed(output))
    }

    /// 外部システムへの呼び出しを、ロックとトランザクションの外でリトライ付きで実行する。
    ///
    /// 送金のようにトランスポートレベルで冪等でない呼び出しは、取引参照などで
    /// 重複実行が安全になっている場合に限って渡すこと。
    pub async fn call_outbound<Fun, Fut, T, E>(&self, call: Fun) -> Result<T, RetryError<E>>
    where
        Fun: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::error::Error + Retryable + 'static,
    {
        with_retry_classified(&self.retry, call).await
    }
}
