use serde::{Deserialize, Serialize};

use crate::domain::MarketError;

/// Account はユーザーのマーケット残高。
///
/// `balance_nanotons` は利用可能残高、`frozen_nanotons` はオークション入札で
/// 拘束中の金額。金額はすべて nanoton 単位の整数で扱う。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub user_id: i64,
    pub balance_nanotons: u64,
    pub frozen_nanotons: u64,
}

impl Account {
    pub fn new(user_id: i64, balance_nanotons: u64) -> Self {
        Self {
            user_id,
            balance_nanotons,
            frozen_nanotons: 0,
        }
    }

    /// 利用可能残高から差し引く。
    pub fn debit(&mut self, amount: u64) -> Result<(), MarketError> {
        self.balance_nanotons = self.balance_nanotons.checked_sub(amount).ok_or(
            MarketError::InsufficientBalance {
                required: amount,
                available: self.balance_nanotons,
            },
        )?;
        Ok(())
    }

    pub fn credit(&mut self, amount: u64) -> Result<(), MarketError> {
        self.balance_nanotons = self
            .balance_nanotons
            .checked_add(amount)
            .ok_or_else(|| MarketError::InvalidAmount(format!("balance overflow for user {}", self.user_id)))?;
        Ok(())
    }

    /// 入札額を利用可能残高から拘束額へ移す。
    pub fn freeze(&mut self, amount: u64) -> Result<(), MarketError> {
        let frozen = self
            .frozen_nanotons
            .checked_add(amount)
            .ok_or_else(|| MarketError::InvalidAmount(format!("frozen overflow for user {}", self.user_id)))?;
        self.debit(amount)?;
        self.frozen_nanotons = frozen;
        Ok(())
    }

    /// 拘束額を利用可能残高へ戻す。
    pub fn unfreeze(&mut self, amount: u64) -> Result<(), MarketError> {
        let frozen = self.frozen_nanotons.checked_sub(amount).ok_or_else(|| {
            MarketError::Internal(anyhow::anyhow!(
                "frozen balance of user {} is smaller than {}",
                self.user_id,
                amount
            ))
        })?;
        self.credit(amount)?;
        self.frozen_nanotons = frozen;
        Ok(())
    }
}
