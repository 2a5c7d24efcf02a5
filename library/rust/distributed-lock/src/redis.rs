use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, Script};

use crate::store::LockStore;
use crate::LockError;

const DEFAULT_PREFIX: &str = "lock";

/// Redis を共有ストアに使う LockStore。
///
/// 取得は `SET key token NX PX ttl` の 1 命令で行う。解放と延長は保存済みトークンを
/// 比較する Lua スクリプトで行うため、期限切れ後に別の保持者が取得したロックを
/// 元の保持者が削除・延長することはない。
#[derive(Clone)]
pub struct RedisLockStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisLockStore {
    /// URL（例: `redis://127.0.0.1:6379`）から接続する。
    pub async fn new(url: &str) -> Result<Self, LockError> {
        let client = Client::open(url).map_err(map_redis_error)?;
        let conn = ConnectionManager::new(client).await.map_err(map_redis_error)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// ロックキーの接頭辞を変更する。既定は `lock`。
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn storage_key(&self, key: &str) -> String {
        format_lock_key(&self.key_prefix, key)
    }

    /// トークンを比較してから `script` を実行し、1 が返れば true。
    async fn run_if_owner(&self, script: &str, key: &str, token: &str, ttl: Option<Duration>) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let script = Script::new(script);
        let mut invocation = script.key(self.storage_key(key));
        invocation.arg(token);
        if let Some(ttl) = ttl {
            invocation.arg(ttl_millis(ttl));
        }
        let affected: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        Ok(affected == 1)
    }
}

// KEYS[1] = ロックキー, ARGV[1] = トークン
const RELEASE_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("del", KEYS[1])
end
return 0
"#;

// KEYS[1] = ロックキー, ARGV[1] = トークン, ARGV[2] = TTL（ミリ秒）
const EXTEND_SCRIPT: &str = r#"
if redis.call("get", KEYS[1]) == ARGV[1] then
    return redis.call("pexpire", KEYS[1], ARGV[2])
end
return 0
"#;

#[async_trait]
impl LockStore for RedisLockStore {
    async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.storage_key(key))
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;
        // NX で書き込めなかった場合は nil が返る
        Ok(reply.is_some())
    }

    async fn release(&self, key: &str, token: &str) -> Result<bool, LockError> {
        self.run_if_owner(RELEASE_SCRIPT, key, token, None).await
    }

    async fn extend(&self, key: &str, token: &str, ttl: Duration) -> Result<bool, LockError> {
        self.run_if_owner(EXTEND_SCRIPT, key, token, Some(ttl)).await
    }

    async fn is_locked(&self, key: &str) -> Result<bool, LockError> {
        let mut conn = self.conn.clone();
        conn.exists(self.storage_key(key))
            .await
            .map_err(map_redis_error)
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 は Redis がエラーにするため最低 1ms
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

/// 接続系の障害は StoreUnavailable に分類し、LockManager のフォールバック判定に使う。
fn map_redis_error(err: RedisError) -> LockError {
    let unreachable = err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout();
    if unreachable {
        LockError::StoreUnavailable(err.to_string())
    } else {
        LockError::Internal(err.to_string())
    }
}

/// Redis 上のキー名。接続なしでテストできるよう公開している。
pub fn format_lock_key(prefix: &str, key: &str) -> String {
    format!("{prefix}:{key}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_key_uses_prefix() {
        assert_eq!(format_lock_key(DEFAULT_PREFIX, "nft:buy:42"), "lock:nft:buy:42");
        assert_eq!(
            format_lock_key("tonmart:lock", "user:balance:7"),
            "tonmart:lock:user:balance:7"
        );
    }

    #[test]
    fn test_connection_failure_is_store_unavailable() {
        let err = map_redis_error(RedisError::from((redis::ErrorKind::IoError, "connection refused")));
        assert!(matches!(err, LockError::StoreUnavailable(msg) if msg.contains("connection refused")));
    }

    #[test]
    fn test_protocol_failure_is_internal() {
        let err = map_redis_error(RedisError::from((redis::ErrorKind::TypeError, "unexpected reply")));
        assert!(matches!(err, LockError::Internal(_)));
    }

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_millis(1500)), 1500);
    }

    #[test]
    fn test_scripts_compare_token_first() {
        for (script, command) in [(RELEASE_SCRIPT, "del"), (EXTEND_SCRIPT, "pexpire")] {
            let get = script.find("redis.call(\"get\"").unwrap();
            let mutate = script.find(&format!("redis.call(\"{command}\"")).unwrap();
            assert!(get < mutate);
        }
    }
}
