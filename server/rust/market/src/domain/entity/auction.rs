use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::MarketError;

/// Bid はオークションの最高入札。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bid {
    pub bidder_id: i64,
    pub amount_nanotons: u64,
}

/// Auction は NFT ギフトのオークション。
///
/// 最高入札者の入札額はその入札者の残高から拘束されている。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Auction {
    pub id: i64,
    pub item_id: i64,
    pub owner_id: i64,
    pub start_bid_nanotons: u64,
    /// 直前の入札額に対する最低上乗せ率（%）
    pub step_percent: u32,
    pub highest_bid: Option<Bid>,
    pub ends_at: DateTime<Utc>,
}

impl Auction {
    pub fn is_open_at(&self, now: DateTime<Utc>) -> bool {
        now < self.ends_at
    }

    /// 次の入札で必要な最低額。
    ///
    /// 初回は開始価格、以降は直前の入札額に `step_percent` を上乗せした額。
    /// 上乗せが 1 nanoton 未満に丸められる場合でも直前の額以下は受け付けない。
    pub fn minimum_next_bid(&self) -> u64 {
        match self.highest_bid {
            None => self.start_bid_nanotons,
            Some(bid) => {
                let step = u128::from(bid.amount_nanotons) * u128::from(self.step_percent) / 100;
                let step = u64::try_from(step).unwrap_or(u64::MAX).max(1);
                bid.amount_nanotons.saturating_add(step)
            }
        }
    }

    /// 入札が受け付け可能かを検証する。残高の検証は呼び出し側で行う。
    pub fn validate_bid(&self, bidder_id: i64, amount: u64, now: DateTime<Utc>) -> Result<(), MarketError> {
        if !self.is_open_at(now) {
            return Err(MarketError::AuctionClosed(self.id));
        }
        if bidder_id == self.owner_id {
            return Err(MarketError::CannotBidOwnAuction(self.id));
        }
        let minimum = self.minimum_next_bid();
        if amount < minimum {
            return Err(MarketError::BidTooLow {
                minimum,
                offered: amount,
            });
        }
        Ok(())
    }

    /// 最高入札を置き換え、直前の最高入札を返す。
    pub fn place(&mut self, bid: Bid) -> Option<Bid> {
        self.highest_bid.replace(bid)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn auction() -> Auction {
        Auction {
            id: 7,
            item_id: 42,
            owner_id: 1,
            start_bid_nanotons: 1_000,
            step_percent: 10,
            highest_bid: None,
            ends_at: Utc::now() + Duration::hours(1),
        }
    }

    #[test]
    fn test_first_bid_must_reach_start_bid() {
        let a = auction();
        assert!(a.validate_bid(2, 1_000, Utc::now()).is_ok());
        assert!(matches!(
            a.validate_bid(2, 999, Utc::now()),
            Err(MarketError::BidTooLow { minimum: 1_000, offered: 999 })
        ));
    }

    #[test]
    fn test_next_bid_requires_step() {
        let mut a = auction();
        a.place(Bid {
            bidder_id: 2,
            amount_nanotons: 2_000,
        });
        assert_eq!(a.minimum_next_bid(), 2_200);
        assert!(a.validate_bid(3, 2_199, Utc::now()).is_err());
        assert!(a.validate_bid(3, 2_200, Utc::now()).is_ok());
    }

    #[test]
    fn test_zero_step_still_requires_higher_bid() {
        let mut a = auction();
        a.step_percent = 0;
        a.place(Bid {
            bidder_id: 2,
            amount_nanotons: 2_000,
        });
        assert_eq!(a.minimum_next_bid(), 2_001);
    }

    #[test]
    fn test_owner_cannot_bid() {
        let a = auction();
        assert!(matches!(
            a.validate_bid(1, 5_000, Utc::now()),
            Err(MarketError::CannotBidOwnAuction(7))
        ));
    }

    #[test]
    fn test_closed_auction_rejects_bids() {
        let a = auction();
        let later = a.ends_at + Duration::seconds(1);
        assert!(matches!(
            a.validate_bid(2, 5_000, later),
            Err(MarketError::AuctionClosed(7))
        ));
    }

    #[test]
    fn test_place_returns_previous_bid() {
        let mut a = auction();
        let first = Bid {
            bidder_id: 2,
            amount_nanotons: 1_000,
        };
        assert_eq!(a.place(first), None);
        assert_eq!(
            a.place(Bid {
                bidder_id: 3,
                amount_nanotons: 1_100,
            }),
            Some(first)
        );
    }
}
