use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// WithdrawalStatus は出金の状態を表す。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WithdrawalStatus {
    /// 残高は引き落とし済みで、送金は未確認
    Pending,
    /// ゲートウェイが送金を受け付けた
    Submitted,
}

impl std::fmt::Display for WithdrawalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Submitted => write!(f, "SUBMITTED"),
        }
    }
}

impl WithdrawalStatus {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "SUBMITTED" => Ok(Self::Submitted),
            _ => anyhow::bail!("invalid withdrawal status: {}", s),
        }
    }
}

/// Withdrawal は TON ウォレットへの出金。
///
/// `reference` は送金の取引参照で、ゲートウェイはこの値で重複送金を排除する。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Withdrawal {
    pub id: Uuid,
    pub user_id: i64,
    pub amount_nanotons: u64,
    pub destination: String,
    pub reference: String,
    pub status: WithdrawalStatus,
    pub tx_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Withdrawal {
    pub fn new(user_id: i64, amount_nanotons: u64, destination: String) -> Self {
        let id = Uuid::new_v4();
        let now = Utc::now();
        Self {
            id,
            user_id,
            amount_nanotons,
            destination,
            reference: format!("wd-{}", id.simple()),
            status: WithdrawalStatus::Pending,
            tx_hash: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// 送金の受付を記録する。
    pub fn mark_submitted(&mut self, tx_hash: String) {
        self.status = WithdrawalStatus::Submitted;
        self.tx_hash = Some(tx_hash);
        self.updated_at = Utc::now();
    }
}
