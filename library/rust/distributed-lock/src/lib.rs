//! tonmart-distributed-lock: 共有ストアを使った分散ロック。
//!
//! 同じリソースキーを対象とするクリティカルセクションを、ストアを共有する
//! すべてのプロセスにわたって直列化する。

pub mod error;
pub mod handle;
pub mod manager;
pub mod memory;
#[cfg(feature = "redis")]
pub mod redis;
pub mod store;

pub use error::LockError;
pub use handle::{LockHandle, LockSet};
pub use manager::{FallbackPolicy, LockManager, LockOptions};
pub use memory::InMemoryLockStore;
#[cfg(feature = "redis")]
pub use self::redis::RedisLockStore;
pub use store::LockStore;

#[cfg(feature = "mock")]
pub use store::MockLockStore;
