use thiserror::Error;
use tonmart_distributed_lock::LockError;
use tonmart_idempotency::IdempotencyError;
use tonmart_unit_of_work::UnitOfWorkError;

/// 失敗した操作の状態変更が確定しているかどうか。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// 状態は変更されていない。同じリクエストを再送してよい。
    NotApplied,
    /// 変更がコミットされた可能性がある。再送前に冪等キーで結果を確認すること。
    Uncertain,
}

#[derive(Debug, Error)]
pub enum OrchestratorError<E>
where
    E: std::error::Error + 'static,
{
    #[error("ロックを取得できません: {0}")]
    Lock(#[source] LockError),

    #[error("冪等キーの確認に失敗しました: {0}")]
    Idempotency(#[source] IdempotencyError),

    #[error("トランザクションエラー: {0}")]
    UnitOfWork(#[source] UnitOfWorkError),

    /// コミット後に冪等レコードを保存できなかった。
    #[error("コミット済みの結果を冪等キーに保存できませんでした: {0}")]
    IdempotencyRecord(#[source] IdempotencyError),

    #[error("{0}")]
    Operation(#[source] E),
}

impl<E> OrchestratorError<E>
where
    E: std::error::Error + 'static,
{
    pub fn disposition(&self) -> Disposition {
        match self {
            // コミットの応答が失われた場合はコミット済みの可能性がある
            OrchestratorError::UnitOfWork(UnitOfWorkError::Transaction { .. })
            | OrchestratorError::IdempotencyRecord(_) => Disposition::Uncertain,
            OrchestratorError::Lock(_)
            | OrchestratorError::Idempotency(_)
            | OrchestratorError::UnitOfWork(_)
            | OrchestratorError::Operation(_) => Disposition::NotApplied,
        }
    }

    /// REST 層で返すエラーコード
    pub fn error_code(&self) -> &'static str {
        match self {
            OrchestratorError::Lock(e) if e.is_timeout() => "LOCK_TIMEOUT",
            OrchestratorError::Lock(LockError::StoreUnavailable(_)) => "LOCK_UNAVAILABLE",
            OrchestratorError::Lock(_) => "LOCK_ERROR",
            OrchestratorError::Idempotency(IdempotencyError::FingerprintMismatch { .. }) => {
                "IDEMPOTENCY_KEY_REUSED"
            }
            OrchestratorError::Idempotency(IdempotencyError::InvalidKey { .. }) => {
                "INVALID_IDEMPOTENCY_KEY"
            }
            OrchestratorError::Idempotency(_) => "IDEMPOTENCY_ERROR",
            OrchestratorError::UnitOfWork(UnitOfWorkError::Begin { .. }) => "DATABASE_UNAVAILABLE",
            OrchestratorError::UnitOfWork(_) => "TRANSACTION_FAILED",
            OrchestratorError::IdempotencyRecord(_) => "RESULT_UNCERTAIN",
            OrchestratorError::Operation(_) => "OPERATION_FAILED",
        }
    }

    /// 業務エラーであれば取り出す。
    pub fn operation_error(&self) -> Option<&E> {
        match self {
            OrchestratorError::Operation(e) => Some(e),
            _ => None,
        }
    }

    pub fn into_operation_error(self) -> Option<E> {
        match self {
            OrchestratorError::Operation(e) => Some(e),
            _ => None,
        }
    }
}
