/// MarketError はマーケット操作の業務エラーを型安全に表現する。
///
/// 業務エラーで失敗した操作はロールバックされ、冪等キーにも記録されない。
#[derive(Debug, thiserror::Error)]
pub enum MarketError {
    #[error("account not found: {0}")]
    AccountNotFound(i64),
    #[error("item not found: {0}")]
    ItemNotFound(i64),
    #[error("item is not available for purchase: {0}")]
    ItemNotAvailable(i64),
    #[error("cannot buy own item or channel: {0}")]
    CannotBuyOwn(i64),
    #[error("insufficient balance: required={required}, available={available}")]
    InsufficientBalance { required: u64, available: u64 },
    #[error("auction not found: {0}")]
    AuctionNotFound(i64),
    #[error("auction is closed: {0}")]
    AuctionClosed(i64),
    #[error("cannot bid on own auction: {0}")]
    CannotBidOwnAuction(i64),
    #[error("bid too low: minimum={minimum}, offered={offered}")]
    BidTooLow { minimum: u64, offered: u64 },
    #[error("channel not found: {0}")]
    ChannelNotFound(i64),
    #[error("channel is not for sale: {0}")]
    ChannelNotForSale(i64),
    #[error("withdrawal not found: {0}")]
    WithdrawalNotFound(uuid::Uuid),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("{0}")]
    Internal(#[from] anyhow::Error),
}

impl MarketError {
    /// REST 層で返すエラーコード
    pub fn error_code(&self) -> &'static str {
        match self {
            MarketError::AccountNotFound(_)
            | MarketError::ItemNotFound(_)
            | MarketError::AuctionNotFound(_)
            | MarketError::ChannelNotFound(_)
            | MarketError::WithdrawalNotFound(_) => "NOT_FOUND",
            MarketError::ItemNotAvailable(_) | MarketError::ChannelNotForSale(_) => "NOT_AVAILABLE",
            MarketError::CannotBuyOwn(_) | MarketError::CannotBidOwnAuction(_) => "OWN_RESOURCE",
            MarketError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            MarketError::AuctionClosed(_) => "AUCTION_CLOSED",
            MarketError::BidTooLow { .. } => "BID_TOO_LOW",
            MarketError::InvalidAmount(_) => "INVALID_AMOUNT",
            MarketError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}
