use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tonmart_distributed_lock::FallbackPolicy;
use tonmart_idempotency::IdempotencyScope;
use tonmart_orchestrator::{Operation, OperationOrchestrator};
use tonmart_unit_of_work::UnitOfWorkFactory;

use crate::domain::entity::Bid;
use crate::domain::repository::MarketRepository;
use crate::domain::MarketError;
use crate::usecase::error::UseCaseError;
use crate::usecase::load_account;

/// PlaceBid はオークションへの入札。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceBid {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount_nanotons: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BidPlaced {
    pub auction_id: i64,
    pub bidder_id: i64,
    pub amount_nanotons: u64,
    /// 拘束を解除した直前の最高入札
    pub outbid: Option<Bid>,
}

#[async_trait]
impl<S> Operation<S> for PlaceBid
where
    S: MarketRepository + Send,
{
    type Output = BidPlaced;
    type Error = MarketError;

    fn name(&self) -> &'static str {
        "place_bid"
    }

    fn lock_keys(&self) -> Vec<String> {
        vec![
            format!("auction:bid:{}", self.auction_id),
            format!("user:balance:{}", self.bidder_id),
        ]
    }

    fn fallback(&self) -> Option<FallbackPolicy> {
        Some(FallbackPolicy::FailClosed)
    }

    fn fingerprint(&self) -> Option<String> {
        tonmart_idempotency::fingerprint(self).ok()
    }

    async fn execute(&self, repo: &mut S) -> Result<BidPlaced, MarketError> {
        let mut auction = repo
            .find_auction(self.auction_id)
            .await?
            .ok_or(MarketError::AuctionNotFound(self.auction_id))?;
        auction.validate_bid(self.bidder_id, self.amount_nanotons, Utc::now())?;

        let bid = Bid {
            bidder_id: self.bidder_id,
            amount_nanotons: self.amount_nanotons,
        };
        let outbid = auction.place(bid);

        // 入札者が自分の最高入札を更新する場合に備え、返金を先に保存してから読み直す
        if let Some(previous) = outbid {
            let mut account = load_account(repo, previous.bidder_id).await?;
            account.unfreeze(previous.amount_nanotons)?;
            repo.save_account(&account).await?;
        }
        let mut bidder = load_account(repo, self.bidder_id).await?;
        bidder.freeze(self.amount_nanotons)?;
        repo.save_account(&bidder).await?;
        repo.save_auction(&auction).await?;

        tracing::info!(
            auction_id = self.auction_id,
            bidder_id = self.bidder_id,
            amount_nanotons = self.amount_nanotons,
            outbid_bidder_id = outbid.map(|b| b.bidder_id),
            "bid placed"
        );
        Ok(BidPlaced {
            auction_id: self.auction_id,
            bidder_id: self.bidder_id,
            amount_nanotons: self.amount_nanotons,
            outbid,
        })
    }
}

/// PlaceBidUseCase はオークション入札を担う。
pub struct PlaceBidUseCase<F: UnitOfWorkFactory> {
    orchestrator: Arc<OperationOrchestrator<F>>,
}

impl<F> PlaceBidUseCase<F>
where
    F: UnitOfWorkFactory,
    F::Session: MarketRepository,
{
    pub fn new(orchestrator: Arc<OperationOrchestrator<F>>) -> Self {
        Self { orchestrator }
    }

    pub async fn execute(
        &self,
        input: PlaceBid,
        idempotency_key: Option<String>,
    ) -> Result<BidPlaced, UseCaseError> {
        let scope = IdempotencyScope::from_optional(idempotency_key, input.bidder_id.to_string())?;
        Ok(self.orchestrator.run(input, scope).await?)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::domain::entity::{Account, Auction};
    use crate::domain::repository::market_repository::MockMarketRepository;

    fn auction(highest_bid: Option<Bid>) -> Auction {
        Auction {
            id: 7,
            item_id: 42,
            owner_id: 1,
            start_bid_nanotons: 1_000,
            step_percent: 10,
            highest_bid,
            ends_at: Utc::now() + Duration::hours(1),
        }
    }

    #[tokio::test]
    async fn test_first_bid_freezes_funds() {
        let mut repo = MockMarketRepository::new();
        repo.expect_find_auction()
            .returning(|_| Ok(Some(auction(None))));
        repo.expect_find_account()
            .returning(|id| Ok(Some(Account::new(id, 5_000))));
        repo.expect_save_account()
            .withf(|a| a.user_id == 2 && a.balance_nanotons == 4_000 && a.frozen_nanotons == 1_000)
            .times(1)
            .returning(|_| Ok(()));
        repo.expect_save_auction()
            .withf(|a| a.highest_bid.map(|b| b.bidder_id) == Some(2))
            .times(1)
            .returning(|_| Ok(()));

        let placed = PlaceBid {
            auction_id: 7,
            bidder_id: 2,
            amount_nanotons: 1_000,
        }
        .execute(&mut repo)
        .await
        .unwrap();
        assert!(placed.outbid.is_none());
    }

    #[tokio::test]
    async fn test_outbid_bidder_is_refunded() {
        let previous = Bid {
            bidder_id: 3,
            amount_nanotons: 1_000,
        };
        let mut repo = MockMarketRepository::new();
        repo.expect_find_auction()
            .returning(move |_| Ok(Some(auction(Some(previous)))));
        repo.expect_find_account().returning(|id| {
            let mut account = Account::new(id, 5_000);
            if id == 3 {
                account.frozen_nanotons = 1_000;
            }
            Ok(Some(account))
        });
        repo.expect_save_account()
            .withf(|a| a.user_id == 3 && a.balance_nanotons == 6_000 && a.frozen_nanotons == 0)
            .times(1)
            .returning(|_| Ok(()));
        repo.expect_save_account()
            .withf(|a| a.user_id == 2 && a.frozen_nanotons == 1_100)
            .times(1)
            .returning(|_| Ok(()));
        repo.expect_save_auction().times(1).returning(|_| Ok(()));

        let placed = PlaceBid {
            auction_id: 7,
            bidder_id: 2,
            amount_nanotons: 1_100,
        }
        .execute(&mut repo)
        .await
        .unwrap();
        assert_eq!(placed.outbid, Some(previous));
    }

    #[tokio::test]
    async fn test_bid_exceeding_available_balance_fails() {
        let mut repo = MockMarketRepository::new();
        repo.expect_find_auction()
            .returning(|_| Ok(Some(auction(None))));
        repo.expect_find_account()
            .returning(|id| Ok(Some(Account::new(id, 500))));
        repo.expect_save_auction().never();

        let result = PlaceBid {
            auction_id: 7,
            bidder_id: 2,
            amount_nanotons: 1_000,
        }
        .execute(&mut repo)
        .await;
        assert!(matches!(result, Err(MarketError::InsufficientBalance { .. })));
    }

    #[tokio::test]
    async fn test_missing_auction() {
        let mut repo = MockMarketRepository::new();
        repo.expect_find_auction().returning(|_| Ok(None));

        let result = PlaceBid {
            auction_id: 7,
            bidder_id: 2,
            amount_nanotons: 1_000,
        }
        .execute(&mut repo)
        .await;
        assert!(matches!(result, Err(MarketError::AuctionNotFound(7))));
    }
}
