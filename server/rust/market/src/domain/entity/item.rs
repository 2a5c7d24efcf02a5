use serde::{Deserialize, Serialize};

/// Item はマーケットに出品される NFT ギフト。
///
/// `price_nanotons` が Some の間だけ購入できる。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Item {
    pub id: i64,
    pub owner_id: i64,
    pub price_nanotons: Option<u64>,
}

impl Item {
    pub fn new(id: i64, owner_id: i64) -> Self {
        Self {
            id,
            owner_id,
            price_nanotons: None,
        }
    }

    pub fn listed(mut self, price_nanotons: u64) -> Self {
        self.price_nanotons = Some(price_nanotons);
        self
    }

    pub fn is_for_sale(&self) -> bool {
        self.price_nanotons.is_some()
    }

    /// 所有者を移し、出品を取り下げる。
    pub fn transfer_to(&mut self, new_owner_id: i64) {
        self.owner_id = new_owner_id;
        self.price_nanotons = None;
    }
}
