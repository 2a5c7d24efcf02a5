use crate::error::UnitOfWorkError;
use crate::session::TransactionalSession;

/// UnitOfWork はトランザクション境界を表す。
///
/// 明示的に `commit` されなかった変更は残らない。`commit` も `rollback` も
/// 呼ばれないままスコープを抜けた場合（キャンセル、panic、コミット忘れ）、
/// Drop で警告を出してセッションを破棄する。
pub struct UnitOfWork<S: TransactionalSession> {
    session: S,
    committed: bool,
    rolled_back: bool,
}

impl<S: TransactionalSession> UnitOfWork<S> {
    pub fn new(session: S) -> Self {
        Self {
            session,
            committed: false,
            rolled_back: false,
        }
    }

    pub fn session(&self) -> &S {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut S {
        &mut self.session
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    /// コミットもロールバックもされていない。
    pub fn is_active(&self) -> bool {
        !self.committed && !self.rolled_back
    }

    /// すべての変更を永続化する。
    ///
    /// 永続化に失敗した場合はロールバックしてから `Transaction` を返す。
    pub async fn commit(&mut self) -> Result<(), UnitOfWorkError> {
        if self.rolled_back {
            tracing::error!("ロールバック後にコミットが試行されました");
            return Err(UnitOfWorkError::AlreadyRolledBack);
        }
        if self.committed {
            return Err(UnitOfWorkError::AlreadyCommitted);
        }

        match self.session.commit().await {
            Ok(()) => {
                self.committed = true;
                tracing::debug!("トランザクションをコミットしました");
                Ok(())
            }
            Err(source) => {
                tracing::error!(error = %source, "コミットに失敗しました");
                if let Err(rollback_err) = self.rollback().await {
                    tracing::error!(error = %rollback_err, "コミット失敗後のロールバックにも失敗しました");
                }
                Err(UnitOfWorkError::Transaction { source })
            }
        }
    }

    /// 未コミットの変更を破棄する。2 回目以降とコミット後の呼び出しは何もしない。
    pub async fn rollback(&mut self) -> Result<(), UnitOfWorkError> {
        if !self.is_active() {
            return Ok(());
        }
        // 失敗しても以後のコミットは許可しない
        self.rolled_back = true;
        match self.session.rollback().await {
            Ok(()) => {
                tracing::debug!("トランザクションをロールバックしました");
                Ok(())
            }
            Err(source) => {
                tracing::error!(error = %source, "ロールバックに失敗しました");
                self.session.discard();
                Err(UnitOfWorkError::Rollback { source })
            }
        }
    }

    pub async fn flush(&mut self) -> Result<(), UnitOfWorkError> {
        if self.rolled_back {
            return Err(UnitOfWorkError::AlreadyRolledBack);
        }
        if self.committed {
            return Err(UnitOfWorkError::AlreadyCommitted);
        }
        self.session
            .flush()
            .await
            .map_err(|source| UnitOfWorkError::Flush { source })
    }

    /// スコープを明示的に終了する。未コミットならロールバックする。
    pub async fn finish(mut self) -> Result<(), UnitOfWorkError> {
        if self.is_active() {
            tracing::warn!("UnitOfWork がコミットされずに終了したためロールバックします");
            self.rollback().await?;
        }
        Ok(())
    }
}

impl<S: TransactionalSession> Drop for UnitOfWork<S> {
    fn drop(&mut self) {
        if self.is_active() {
            tracing::warn!("UnitOfWork がコミットもロールバックもされずに破棄されました。変更を破棄します");
            self.rolled_back = true;
            self.session.discard();
        }
    }
}

impl<S: TransactionalSession> std::fmt::Debug for UnitOfWork<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("committed", &self.committed)
            .field("rolled_back", &self.rolled_back)
            .finish_non_exhaustive()
    }
}
