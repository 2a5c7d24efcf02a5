use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tonmart_distributed_lock::FallbackPolicy;
use tonmart_idempotency::IdempotencyScope;
use tonmart_orchestrator::{Operation, OperationOrchestrator};
use tonmart_unit_of_work::UnitOfWorkFactory;
use uuid::Uuid;

use crate::domain::entity::{Deal, DealKind};
use crate::domain::repository::MarketRepository;
use crate::domain::MarketError;
use crate::infrastructure::notifier::{SaleNotice, SellerNotifier};
use crate::usecase::error::UseCaseError;
use crate::usecase::load_account;
use crate::usecase::notify::notify_seller;

/// TransferChannel は売りに出ている Telegram チャンネルの購入と所有権移転。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferChannel {
    pub channel_id: i64,
    pub buyer_id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelTransfer {
    pub deal_id: Uuid,
    pub channel_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub price_nanotons: u64,
}

#[async_trait]
impl<S> Operation<S> for TransferChannel
where
    S: MarketRepository + Send,
{
    type Output = ChannelTransfer;
    type Error = MarketError;

    fn name(&self) -> &'static str {
        "transfer_channel"
    }

    fn lock_keys(&self) -> Vec<String> {
        vec![
            format!("channel:transfer:{}", self.channel_id),
            format!("user:balance:{}", self.buyer_id),
        ]
    }

    fn fallback(&self) -> Option<FallbackPolicy> {
        Some(FallbackPolicy::FailClosed)
    }

    fn fingerprint(&self) -> Option<String> {
        tonmart_idempotency::fingerprint(self).ok()
    }

    async fn execute(&self, repo: &mut S) -> Result<ChannelTransfer, MarketError> {
        let mut channel = repo
            .find_channel(self.channel_id)
            .await?
            .ok_or(MarketError::ChannelNotFound(self.channel_id))?;
        let price = channel
            .price_nanotons
            .ok_or(MarketError::ChannelNotForSale(self.channel_id))?;
        if channel.owner_id == self.buyer_id {
            return Err(MarketError::CannotBuyOwn(self.channel_id));
        }
        let seller_id = channel.owner_id;

        let mut buyer = load_account(repo, self.buyer_id).await?;
        buyer.debit(price)?;
        let mut seller = load_account(repo, seller_id).await?;
        seller.credit(price)?;
        channel.transfer_to(self.buyer_id);
        let deal = Deal::new(DealKind::Channel, self.channel_id, seller_id, self.buyer_id, price);

        repo.save_account(&buyer).await?;
        repo.save_account(&seller).await?;
        repo.save_channel(&channel).await?;
        repo.insert_deal(&deal).await?;

        tracing::info!(
            channel_id = self.channel_id,
            buyer_id = self.buyer_id,
            seller_id,
            price_nanotons = price,
            deal_id = %deal.id,
            "channel transferred"
        );
        Ok(ChannelTransfer {
            deal_id: deal.id,
            channel_id: self.channel_id,
            buyer_id: self.buyer_id,
            seller_id,
            price_nanotons: price,
        })
    }
}

/// TransferChannelUseCase はチャンネル売買を担う。
pub struct TransferChannelUseCase<F: UnitOfWorkFactory> {
    orchestrator: Arc<OperationOrchestrator<F>>,
    notifier: Arc<dyn SellerNotifier>,
}

impl<F> TransferChannelUseCase<F>
where
    F: UnitOfWorkFactory,
    F::Session: MarketRepository,
{
    pub fn new(orchestrator: Arc<OperationOrchestrator<F>>, notifier: Arc<dyn SellerNotifier>) -> Self {
        Self {
            orchestrator,
            notifier,
        }
    }

    pub async fn execute(
        &self,
        input: TransferChannel,
        idempotency_key: Option<String>,
    ) -> Result<ChannelTransfer, UseCaseError> {
        let scope = IdempotencyScope::from_optional(idempotency_key, input.buyer_id.to_string())?;
        let completed = self.orchestrator.run_detailed(input, scope).await?;
        let transfer = completed.output;

        if !completed.replayed {
            let notice = SaleNotice {
                deal_id: transfer.deal_id,
                seller_id: transfer.seller_id,
                kind: DealKind::Channel,
                resource_id: transfer.channel_id,
                price_nanotons: transfer.price_nanotons,
            };
            notify_seller(&self.orchestrator, self.notifier.as_ref(), &notice).await;
        }
        Ok(transfer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entity::{Account, Channel};
    use crate::domain::repository::market_repository::MockMarketRepository;

    #[tokio::test]
    async fn test_transfer_channel() {
        let mut repo = MockMarketRepository::new();
        repo.expect_find_channel()
            .returning(|_| Ok(Some(Channel::new(9, 1, "tonmart_news").listed(2_000))));
        repo.expect_find_account()
            .returning(|id| Ok(Some(Account::new(id, 3_000))));
        repo.expect_save_account().times(2).returning(|_| Ok(()));
        repo.expect_save_channel()
            .withf(|c| c.owner_id == 2 && c.price_nanotons.is_none())
            .times(1)
            .returning(|_| Ok(()));
        repo.expect_insert_deal()
            .withf(|d| d.kind == DealKind::Channel && d.resource_id == 9)
            .times(1)
            .returning(|_| Ok(()));

        let transfer = TransferChannel {
            channel_id: 9,
            buyer_id: 2,
        }
        .execute(&mut repo)
        .await
        .unwrap();
        assert_eq!(transfer.seller_id, 1);
        assert_eq!(transfer.price_nanotons, 2_000);
    }

    #[tokio::test]
    async fn test_channel_not_for_sale() {
        let mut repo = MockMarketRepository::new();
        repo.expect_find_channel()
            .returning(|_| Ok(Some(Channel::new(9, 1, "tonmart_news"))));

        let result = TransferChannel {
            channel_id: 9,
            buyer_id: 2,
        }
        .execute(&mut repo)
        .await;
        assert!(matches!(result, Err(MarketError::ChannelNotForSale(9))));
    }

    #[tokio::test]
    async fn test_repository_failure_is_internal() {
        let mut repo = MockMarketRepository::new();
        repo.expect_find_channel()
            .returning(|_| Err(anyhow::anyhow!("connection reset")));

        let result = TransferChannel {
            channel_id: 9,
            buyer_id: 2,
        }
        .execute(&mut repo)
        .await;
        assert!(matches!(result, Err(MarketError::Internal(_))));
    }
}
