//! tonmart-idempotency: 冪等キーによる操作結果の重複排除。
//!
//! 成功した操作の結果を `(key, actor)` 単位で保存し、同じキーでの再送には
//! 副作用を再実行せずに保存済みの結果を返す。

pub mod error;
pub mod fingerprint;
pub mod guard;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod record;
pub mod scope;
pub mod store;

pub use error::IdempotencyError;
pub use fingerprint::fingerprint;
pub use guard::{IdempotencyConfig, IdempotencyGuard};
pub use memory::InMemoryIdempotencyStore;
#[cfg(feature = "postgres")]
pub use postgres::PostgresIdempotencyStore;
pub use record::IdempotencyRecord;
pub use scope::{IdempotencyScope, MAX_KEY_LEN};
pub use store::IdempotencyStore;

#[cfg(feature = "mock")]
pub use store::MockIdempotencyStore;
