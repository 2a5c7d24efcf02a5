pub mod account;
pub mod auction;
pub mod channel;
pub mod deal;
pub mod item;
pub mod ton;
pub mod withdrawal;

pub use account::Account;
pub use auction::{Auction, Bid};
pub use channel::Channel;
pub use deal::{Deal, DealKind};
pub use item::Item;
pub use ton::{parse_ton_amount, NANOTONS_PER_TON};
pub use withdrawal::{Withdrawal, WithdrawalStatus};
