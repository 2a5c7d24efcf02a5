//! tonmart-orchestrator: 冪等キー、分散ロック、Unit of Work、リトライを
//! 1 つの業務操作の周りに組み合わせる。

pub mod error;
pub mod operation;
pub mod orchestrator;

pub use error::{Disposition, OrchestratorError};
pub use operation::Operation;
pub use orchestrator::{Completed, OperationOrchestrator};
