use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::error::UnitOfWorkError;
use crate::session::TransactionalSession;
use crate::unit::UnitOfWork;

/// セッションを借用する非同期処理の戻り値。
pub type SessionFuture<'s, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 's>>;

/// UnitOfWorkFactory は新しいトランザクションを開始する。
#[async_trait]
pub trait UnitOfWorkFactory: Send + Sync {
    type Session: TransactionalSession + 'static;

    /// 独立したトランザクションコンテキストを取得する。
    /// 接続を確保できない場合は `UnitOfWorkError::Begin` を返す。
    async fn begin(&self) -> Result<UnitOfWork<Self::Session>, UnitOfWorkError>;
}

/// `f` を 1 つのトランザクション内で実行する。
///
/// `Ok` ならコミットし、`Err` ならロールバックしてからそのエラーを返す。
/// ロールバック自体の失敗はログに残し、元のエラーを優先する。
///
/// ```ignore
/// let moved = run_in_unit_of_work(&factory, |session| {
///     Box::pin(async move {
///         session.put(key, value);
///         Ok::<_, UnitOfWorkError>(())
///     })
/// })
/// .await?;
/// ```
pub async fn run_in_unit_of_work<F, T, E, Fun>(factory: &F, f: Fun) -> Result<T, E>
where
    F: UnitOfWorkFactory,
    E: From<UnitOfWorkError>,
    Fun: for<'s> FnOnce(&'s mut F::Session) -> SessionFuture<'s, T, E>,
{
    let mut uow = factory.begin().await?;
    match f(uow.session_mut()).await {
        Ok(value) => {
            uow.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback_err) = uow.rollback().await {
                tracing::error!(error = %rollback_err, "ロールバックに失敗しました");
            }
            Err(e)
        }
    }
}
