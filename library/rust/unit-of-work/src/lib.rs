//! tonmart-unit-of-work: トランザクション境界の管理。
//!
//! `UnitOfWork` は明示的なコミットと、コミットされなかった場合の確実な
//! ロールバックを提供する。ストレージごとの差は `TransactionalSession` で吸収する。

pub mod error;
pub mod factory;
pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod session;
pub mod unit;

pub use error::{SessionError, UnitOfWorkError};
pub use factory::{run_in_unit_of_work, SessionFuture, UnitOfWorkFactory};
pub use memory::{InMemoryDatabase, InMemorySession, InMemoryStoreError};
#[cfg(feature = "postgres")]
pub use postgres::{PgSession, PgUnitOfWorkFactory};
pub use session::TransactionalSession;
pub use unit::UnitOfWork;

#[cfg(feature = "mock")]
pub use session::MockTransactionalSession;
