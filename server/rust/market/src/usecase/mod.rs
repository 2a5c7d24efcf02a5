pub mod buy_item;
pub mod error;
pub mod place_bid;
pub mod transfer_channel;
pub mod withdraw;

mod notify;

pub use buy_item::{BuyItem, BuyItemUseCase, Purchase};
pub use error::UseCaseError;
pub use place_bid::{BidPlaced, PlaceBid, PlaceBidUseCase};
pub use transfer_channel::{ChannelTransfer, TransferChannel, TransferChannelUseCase};
pub use withdraw::{Withdraw, WithdrawUseCase, WithdrawalCompleted, WithdrawalReceipt};

use crate::domain::entity::Account;
use crate::domain::repository::MarketRepository;
use crate::domain::MarketError;

async fn load_account<S>(repo: &mut S, user_id: i64) -> Result<Account, MarketError>
where
    S: MarketRepository + ?Sized,
{
    repo.find_account(user_id)
        .await?
        .ok_or(MarketError::AccountNotFound(user_id))
}
