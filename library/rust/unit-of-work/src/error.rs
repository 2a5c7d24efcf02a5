use thiserror::Error;

/// セッション実装が返すエラー。バックエンドごとの型を区別せずに保持する。
pub type SessionError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum UnitOfWorkError {
    /// ロールバック後のコミット。呼び出し側のプログラミングエラー。
    #[error("ロールバック済みのトランザクションはコミットできません")]
    AlreadyRolledBack,

    #[error("トランザクションは既にコミット済みです")]
    AlreadyCommitted,

    #[error("トランザクションを開始できません: {source}")]
    Begin { source: SessionError },

    /// コミットに失敗した。ロールバックは適用済み。
    #[error("コミットに失敗しました: {source}")]
    Transaction { source: SessionError },

    #[error("ロールバックに失敗しました: {source}")]
    Rollback { source: SessionError },

    #[error("フラッシュに失敗しました: {source}")]
    Flush { source: SessionError },
}

impl UnitOfWorkError {
    pub fn begin(source: impl Into<SessionError>) -> Self {
        UnitOfWorkError::Begin {
            source: source.into(),
        }
    }
}
