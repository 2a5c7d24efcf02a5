use thiserror::Error;

#[derive(Debug, Error)]
pub enum IdempotencyError {
    /// 同じ (key, actor) のレコードが既に存在する。並行実行との競合に負けた場合に返る。
    #[error("重複リクエストです: key={key}, actor={actor}")]
    Duplicate { key: String, actor: String },
    #[error("無効な冪等キーです: {reason}")]
    InvalidKey { reason: String },
    /// 同じキーが別内容のリクエストに再利用された。
    #[error("冪等キーが別のリクエストで使用済みです: key={key}")]
    FingerprintMismatch { key: String },
    #[error("シリアライズエラー: {0}")]
    SerializationError(#[from] serde_json::Error),
    #[error("ストレージエラー: {0}")]
    StorageError(String),
}

impl IdempotencyError {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, IdempotencyError::Duplicate { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_message_contains_key_and_actor() {
        let err = IdempotencyError::Duplicate {
            key: "w-001".to_string(),
            actor: "1001".to_string(),
        };
        assert!(err.is_duplicate());
        let msg = err.to_string();
        assert!(msg.contains("w-001"));
        assert!(msg.contains("1001"));
    }

    #[test]
    fn test_storage_error_is_not_duplicate() {
        let err = IdempotencyError::StorageError("connection refused".to_string());
        assert!(!err.is_duplicate());
        assert!(err.to_string().contains("connection refused"));
    }
}
