use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::entity::DealKind;
use crate::infrastructure::ton_gateway::GatewayError;

/// SaleNotice は売り手に送る成約通知。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaleNotice {
    pub deal_id: Uuid,
    pub seller_id: i64,
    pub kind: DealKind,
    pub resource_id: i64,
    pub price_nanotons: u64,
}

/// SellerNotifier は売り手への Telegram 通知トレイト。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SellerNotifier: Send + Sync {
    async fn notify_sale(&self, notice: &SaleNotice) -> Result<(), GatewayError>;
}
