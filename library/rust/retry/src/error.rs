use thiserror::Error;

#[derive(Debug, Error)]
pub enum RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// すべての試行が一時的エラーで失敗した。最後のエラーを source として保持する。
    #[error("すべてのリトライが失敗しました ({attempts} 回): {last_error}")]
    ExhaustedRetries {
        attempts: u32,
        #[source]
        last_error: E,
    },
    /// リトライ対象外のエラー。残りの試行は消費せずに即座に返す。
    #[error("リトライ対象外のエラーです (試行 {attempt} 回目): {error}")]
    NonRetryable {
        attempt: u32,
        #[source]
        error: E,
    },
}

impl<E> RetryError<E>
where
    E: std::error::Error + 'static,
{
    /// 内部のエラーを取り出す。
    pub fn into_inner(self) -> E {
        match self {
            RetryError::ExhaustedRetries { last_error, .. } => last_error,
            RetryError::NonRetryable { error, .. } => error,
        }
    }

    pub fn inner(&self) -> &E {
        match self {
            RetryError::ExhaustedRetries { last_error, .. } => last_error,
            RetryError::NonRetryable { error, .. } => error,
        }
    }

    /// 実際に行われた試行回数。
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::ExhaustedRetries { attempts, .. } => *attempts,
            RetryError::NonRetryable { attempt, .. } => *attempt,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::ExhaustedRetries { .. })
    }
}
