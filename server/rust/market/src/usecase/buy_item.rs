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

/// BuyItem は出品中の NFT ギフトの購入。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyItem {
    pub item_id: i64,
    pub buyer_id: i64,
}

/// Purchase は購入結果。冪等キーで保存され、再送時はこの値がそのまま返る。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Purchase {
    pub deal_id: Uuid,
    pub item_id: i64,
    pub buyer_id: i64,
    pub seller_id: i64,
    pub price_nanotons: u64,
}

#[async_trait]
impl<S> Operation<S> for BuyItem
where
    S: MarketRepository + Send,
{
    type Output = Purchase;
    type Error = MarketError;

    fn name(&self) -> &'static str {
        "buy_item"
    }

    fn lock_keys(&self) -> Vec<String> {
        vec![
            format!("nft:buy:{}", self.item_id),
            format!("user:balance:{}", self.buyer_id),
        ]
    }

    fn fallback(&self) -> Option<FallbackPolicy> {
        Some(FallbackPolicy::FailClosed)
    }

    fn fingerprint(&self) -> Option<String> {
        tonmart_idempotency::fingerprint(self).ok()
    }

    async fn execute(&self, repo: &mut S) -> Result<Purchase, MarketError> {
        let mut item = repo
            .find_item(self.item_id)
            .await?
            .ok_or(MarketError::ItemNotFound(self.item_id))?;
        let price = item
            .price_nanotons
            .ok_or(MarketError::ItemNotAvailable(self.item_id))?;
        if item.owner_id == self.buyer_id {
            return Err(MarketError::CannotBuyOwn(self.item_id));
        }
        let seller_id = item.owner_id;

        let mut buyer = load_account(repo, self.buyer_id).await?;
        buyer.debit(price)?;
        let mut seller = load_account(repo, seller_id).await?;
        seller.credit(price)?;
        item.transfer_to(self.buyer_id);
        let deal = Deal::new(DealKind::Item, self.item_id, seller_id, self.buyer_id, price);

        repo.save_account(&buyer).await?;
        repo.save_account(&seller).await?;
        repo.save_item(&item).await?;
        repo.insert_deal(&deal).await?;

        tracing::info!(
            item_id = self.item_id,
            buyer_id = self.buyer_id,
            seller_id,
            price_nanotons = price,
            deal_id = %deal.id,
            "item purchased"
        );
        Ok(Purchase {
            deal_id: deal.id,
            item_id: self.item_id,
            buyer_id: self.buyer_id,
            seller_id,
            price_nanotons: price,
        })
    }
}

/// BuyItemUseCase は NFT ギフトの購入を担う。
pub struct BuyItemUseCase<F: UnitOfWorkFactory> {
    orchestrator: Arc<OperationOrchestrator<F>>,
    notifier: Arc<dyn SellerNotifier>,
}

impl<F> BuyItemUseCase<F>
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

    /// 購入する。売り手への通知はコミット後に行い、再送時には行わない。
    pub async fn execute(
        &self,
        input: BuyItem,
        idempotency_key: Option<String>,
    ) -> Result<Purchase, UseCaseError> {
        let scope = IdempotencyScope::from_optional(idempotency_key, input.buyer_id.to_string())?;
        let completed = self.orchestrator.run_detailed(input, scope).await?;
        let purchase = completed.output;

        if !completed.replayed {
            let notice = SaleNotice {
                deal_id: purchase.deal_id,
                seller_id: purchase.seller_id,
                kind: DealKind::Item,
                resource_id: purchase.item_id,
                price_nanotons: purchase.price_nanotons,
            };
            notify_seller(&self.orchestrator, self.notifier.as_ref(), &notice).await;
        }
        Ok(purchase)
    }
}
