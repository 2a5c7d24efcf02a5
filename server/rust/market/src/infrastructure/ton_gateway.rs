use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tonmart_retry::Retryable;

/// GatewayError は外部連携（TON ゲートウェイ、Telegram 通知）の呼び出しエラー。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway unavailable: {0}")]
    Unavailable(String),
    #[error("gateway timed out: {0}")]
    Timeout(String),
    #[error("rejected by gateway: {0}")]
    Rejected(String),
}

impl Retryable for GatewayError {
    fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Unavailable(_) | GatewayError::Timeout(_))
    }
}

/// TransferRequest は TON 送金の依頼。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    /// 取引参照。同じ参照での依頼は 1 回の送金として扱われる。
    pub reference: String,
    pub destination: String,
    pub amount_nanotons: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferReceipt {
    pub reference: String,
    pub tx_hash: String,
}

/// TonGateway は TON ブロックチェーンへの送金を担うトレイト。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TonGateway: Send + Sync {
    /// ウォレットアドレスを検証し、正規化したアドレスを返す。
    async fn resolve_wallet(&self, address: &str) -> Result<String, GatewayError>;

    /// 送金を依頼する。同じ `reference` の再送では既存の受付結果を返し、二重に送金しないこと。
    async fn submit_transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, GatewayError>;
}
