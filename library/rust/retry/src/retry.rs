use std::future::Future;
use std::time::Duration;

use crate::error::RetryError;
use crate::policy::RetryConfig;

/// Retryable はエラー型自身が一時的かどうかを判定するためのトレイト。
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// 1 回のリトライ実行の状態。呼び出しの外には持ち出さない。
#[derive(Debug)]
struct RetryState {
    attempt: u32,
    current_delay: Duration,
}

/// すべてのエラーを一時的とみなしてリトライする。
///
/// トランスポートレベルで冪等でない操作（送金の送信など）をそのまま渡してはならない。
/// 冪等キーやトランザクション参照で重複実行が安全になっている場合に限って使うこと。
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, operation: F) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
{
    with_retry_if(config, |_| true, operation).await
}

/// エラー型の [`Retryable`] 実装で分類してリトライする。
pub async fn with_retry_classified<F, Fut, T, E>(
    config: &RetryConfig,
    operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + Retryable + 'static,
{
    with_retry_if(config, |e: &E| e.is_retryable(), operation).await
}

/// `is_retryable` が true を返すエラーだけをリトライする。
///
/// 1 回目は即座に実行し、`n` 回目の失敗後は `compute_delay(n - 1)` だけ待ってから
/// 次を試行する。試行は合計 `max_attempts` 回まで。
pub async fn with_retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    is_retryable: P,
    mut operation: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::error::Error + 'static,
    P: Fn(&E) -> bool,
{
    let max_attempts = config.max_attempts.max(1);
    let mut state = RetryState {
        attempt: 0,
        current_delay: Duration::ZERO,
    };

    loop {
        state.attempt += 1;
        match operation().await {
            Ok(result) => {
                if state.attempt > 1 {
                    tracing::info!(attempts = state.attempt, "リトライ後に成功しました");
                }
                return Ok(result);
            }
            Err(e) if !is_retryable(&e) => {
                tracing::warn!(attempt = state.attempt, error = %e, "リトライ対象外のエラーです");
                return Err(RetryError::NonRetryable {
                    attempt: state.attempt,
                    error: e,
                });
            }
            Err(e) => {
                if state.attempt >= max_attempts {
                    tracing::error!(
                        attempts = state.attempt,
                        error = %e,
                        error_debug = ?e,
                        "すべてのリトライが失敗しました"
                    );
                    return Err(RetryError::ExhaustedRetries {
                        attempts: state.attempt,
                        last_error: e,
                    });
                }
                state.current_delay = config.compute_delay(state.attempt - 1);
                tracing::warn!(
                    attempt = state.attempt,
                    max_attempts,
                    delay_ms = u64::try_from(state.current_delay.as_millis()).unwrap_or(u64::MAX),
                    error = %e,
                    "リトライ試行 {}/{} が失敗しました",
                    state.attempt,
                    max_attempts
                );
                tokio::time::sleep(state.current_delay).await;
            }
        }
    }
}
