use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::IdempotencyScope;

/// 完了した操作の結果。作成後は変更されない。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    pub actor: String,
    pub operation: String,
    /// リクエスト内容の SHA-256（16 進）。記録時に指定されなければ None。
    pub request_hash: Option<String>,
    /// 操作結果の JSON。再送時はこの文字列をそのまま返す。
    pub response_body: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    pub fn new(
        scope: &IdempotencyScope,
        operation: impl Into<String>,
        request_hash: Option<String>,
        response_body: String,
        ttl_secs: Option<i64>,
    ) -> Self {
        let now = Utc::now();
        Self {
            key: scope.key().to_string(),
            actor: scope.actor().to_string(),
            operation: operation.into(),
            request_hash,
            response_body,
            created_at: now,
            expires_at: ttl_secs.map(|s| now + chrono::Duration::seconds(s)),
        }
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    /// 双方にフィンガープリントがあり、かつ異なる場合のみ false。
    pub fn matches_fingerprint(&self, fingerprint: Option<&str>) -> bool {
        match (self.request_hash.as_deref(), fingerprint) {
            (Some(stored), Some(presented)) => stored == presented,
            _ => true,
        }
    }
}
