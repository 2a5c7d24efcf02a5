use tonmart_idempotency::IdempotencyError;
use tonmart_orchestrator::{Disposition, OrchestratorError};
use tonmart_retry::RetryError;

use crate::domain::MarketError;
use crate::infrastructure::ton_gateway::GatewayError;

/// UseCaseError はマーケットのユースケースが返すエラー。
#[derive(Debug, thiserror::Error)]
pub enum UseCaseError {
    #[error(transparent)]
    Orchestrator(#[from] OrchestratorError<MarketError>),

    #[error("wallet address could not be resolved: {0}")]
    WalletResolution(#[source] RetryError<GatewayError>),

    /// 残高の引き落としはコミット済みだが、送金の受付を確認できなかった。
    /// 同じ冪等キーで再送すると同じ取引参照で送金を再依頼する。
    #[error("transfer {reference} was not confirmed: {source}")]
    TransferUnconfirmed {
        reference: String,
        #[source]
        source: RetryError<GatewayError>,
    },
}

impl From<IdempotencyError> for UseCaseError {
    fn from(e: IdempotencyError) -> Self {
        UseCaseError::Orchestrator(OrchestratorError::Idempotency(e))
    }
}

impl UseCaseError {
    pub fn disposition(&self) -> Disposition {
        match self {
            UseCaseError::Orchestrator(e) => e.disposition(),
            UseCaseError::WalletResolution(_) => Disposition::NotApplied,
            UseCaseError::TransferUnconfirmed { .. } => Disposition::Uncertain,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            UseCaseError::Orchestrator(OrchestratorError::Operation(e)) => e.error_code(),
            UseCaseError::Orchestrator(e) => e.error_code(),
            UseCaseError::WalletResolution(e) => match e.inner() {
                GatewayError::Rejected(_) => "INVALID_WALLET",
                GatewayError::Unavailable(_) | GatewayError::Timeout(_) => "GATEWAY_UNAVAILABLE",
            },
            UseCaseError::TransferUnconfirmed { .. } => "TRANSFER_UNCONFIRMED",
        }
    }

    /// 業務エラーであれば取り出す。
    pub fn market_error(&self) -> Option<&MarketError> {
        match self {
            UseCaseError::Orchestrator(e) => e.operation_error(),
            _ => None,
        }
    }
}
