use serde::{Deserialize, Serialize};

/// Channel は売買される Telegram チャンネル。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: i64,
    pub owner_id: i64,
    pub username: String,
    pub price_nanotons: Option<u64>,
}

impl Channel {
    pub fn new(id: i64, owner_id: i64, username: impl Into<String>) -> Self {
        Self {
            id,
            owner_id,
            username: username.into(),
            price_nanotons: None,
        }
    }

    pub fn listed(mut self, price_nanotons: u64) -> Self {
        self.price_nanotons = Some(price_nanotons);
        self
    }

    pub fn transfer_to(&mut self, new_owner_id: i64) {
        self.owner_id = new_owner_id;
        self.price_nanotons = None;
    }
}
