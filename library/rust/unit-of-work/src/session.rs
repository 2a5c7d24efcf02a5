use async_trait::async_trait;

use crate::error::SessionError;

/// TransactionalSession はトランザクションを 1 つ保持するストレージセッション。
///
/// `UnitOfWork` だけがこのトレイトのメソッドを呼び出す。
#[cfg_attr(any(test, feature = "mock"), mockall::automock)]
#[async_trait]
pub trait TransactionalSession: Send {
    /// 変更を永続化する。
    async fn commit(&mut self) -> Result<(), SessionError>;

    /// 未コミットの変更を破棄する。
    async fn rollback(&mut self) -> Result<(), SessionError>;

    /// コミットせずに保留中の書き込みをストアへ送る。即時送信のバックエンドでは何もしない。
    async fn flush(&mut self) -> Result<(), SessionError> {
        Ok(())
    }

    /// Drop 時に呼ばれる同期版の破棄。await できない場面で未コミットの変更を捨てる。
    fn discard(&mut self);
}
