use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LockError {
    /// 待機時間内にロックを取得できなかった。何も変更されていないため再試行してよい。
    #[error("ロックの取得がタイムアウトしました: key={key}, timeout={timeout:?}")]
    Timeout { key: String, timeout: Duration },
    /// ロックストアに到達できない。
    #[error("ロックストアに接続できません: {0}")]
    StoreUnavailable(String),
    #[error("ロックを保持していません: {0}")]
    NotHeld(String),
    #[error("内部エラー: {0}")]
    Internal(String),
}

impl LockError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, LockError::Timeout { .. })
    }
}
