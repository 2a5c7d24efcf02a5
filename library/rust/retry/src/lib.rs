//! tonmart-retry: 外部呼び出し向けの指数バックオフ付きリトライ。
//!
//! ロックやトランザクションのスコープとは独立に、ネットワーク越しの呼び出しを包む。
//! 冪等でない変更系の呼び出しは、冪等キーなどで安全性が保証されている場合を除きリトライしないこと。

pub mod error;
pub mod policy;
pub mod retry;

pub use error::RetryError;
pub use policy::RetryConfig;
pub use retry::{with_retry, with_retry_classified, with_retry_if, Retryable};
