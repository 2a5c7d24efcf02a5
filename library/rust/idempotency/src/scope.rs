use serde::{Deserialize, Serialize};

use crate::IdempotencyError;

/// 冪等キーの最大長（バイト）
pub const MAX_KEY_LEN: usize = 255;

/// IdempotencyScope は冪等キーとその所有者の組。
///
/// 一意性は `(key, actor)` 単位で判定されるため、別ユーザーが同じキー文字列を
/// 使っても互いの結果は返らない。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyScope {
    key: String,
    actor: String,
}

impl IdempotencyScope {
    pub fn new(key: impl Into<String>, actor: impl Into<String>) -> Result<Self, IdempotencyError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(IdempotencyError::InvalidKey {
                reason: "キーが空です".to_string(),
            });
        }
        if key.len() > MAX_KEY_LEN {
            return Err(IdempotencyError::InvalidKey {
                reason: format!("キー長 {} バイトが上限 {MAX_KEY_LEN} を超えています", key.len()),
            });
        }
        Ok(Self {
            key,
            actor: actor.into(),
        })
    }

    /// 呼び出し側から渡された任意のキーからスコープを作る。
    ///
    /// キーが無い、または空白のみの場合は `Ok(None)` を返し、重複排除を行わない。
    pub fn from_optional(
        key: Option<String>,
        actor: impl Into<String>,
    ) -> Result<Option<Self>, IdempotencyError> {
        match key {
            Some(k) if !k.trim().is_empty() => Self::new(k, actor).map(Some),
            _ => Ok(None),
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn actor(&self) -> &str {
        &self.actor
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_optional_none_disables_dedup() {
        assert!(IdempotencyScope::from_optional(None, "7").unwrap().is_none());
        assert!(IdempotencyScope::from_optional(Some("   ".to_string()), "7")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_from_optional_with_key() {
        let scope = IdempotencyScope::from_optional(Some("w-001".to_string()), "7")
            .unwrap()
            .unwrap();
        assert_eq!(scope.key(), "w-001");
        assert_eq!(scope.actor(), "7");
    }

    #[test]
    fn test_key_length_limit() {
        assert!(IdempotencyScope::new("a".repeat(MAX_KEY_LEN), "7").is_ok());
        let err = IdempotencyScope::new("a".repeat(MAX_KEY_LEN + 1), "7").unwrap_err();
        assert!(matches!(err, IdempotencyError::InvalidKey { .. }));
    }

    #[test]
    fn test_blank_key_rejected_by_new() {
        assert!(matches!(
            IdempotencyScope::new("", "7"),
            Err(IdempotencyError::InvalidKey { .. })
        ));
    }
}
