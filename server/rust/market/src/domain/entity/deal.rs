use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// DealKind は成立した取引の対象。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DealKind {
    Item,
    Channel,
}

impl std::fmt::Display for DealKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Item => write!(f, "ITEM"),
            Self::Channel => write!(f, "CHANNEL"),
        }
    }
}

impl DealKind {
    pub fn from_str_value(s: &str) -> anyhow::Result<Self> {
        match s {
            "ITEM" => Ok(Self::Item),
            "CHANNEL" => Ok(Self::Channel),
            _ => anyhow::bail!("invalid deal kind: {}", s),
        }
    }
}

/// Deal は成立した売買の記録。作成後に変更されることはない。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deal {
    pub id: Uuid,
    pub kind: DealKind,
    pub resource_id: i64,
    pub seller_id: i64,
    pub buyer_id: i64,
    pub price_nanotons: u64,
    pub created_at: DateTime<Utc>,
}

impl Deal {
    pub fn new(kind: DealKind, resource_id: i64, seller_id: i64, buyer_id: i64, price_nanotons: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            resource_id,
            seller_id,
            buyer_id,
            price_nanotons,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deal_kind_roundtrip() {
        for kind in [DealKind::Item, DealKind::Channel] {
            assert_eq!(DealKind::from_str_value(&kind.to_string()).unwrap(), kind);
        }
        assert!(DealKind::from_str_value("BUNDLE").is_err());
    }
}
