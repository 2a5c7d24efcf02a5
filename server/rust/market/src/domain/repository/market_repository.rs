use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::entity::{Account, Auction, Channel, Deal, Item, Withdrawal};

/// MarketRepository はトランザクション内でマーケットの状態を読み書きするトレイト。
///
/// 実装はトランザクションのセッション自身で、読み書きはコミットされるまで他の
/// トランザクションからは見えない。
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketRepository: Send {
    /// 残高を取得する。PostgreSQL 実装では行ロックを取る。
    async fn find_account(&mut self, user_id: i64) -> anyhow::Result<Option<Account>>;

    async fn save_account(&mut self, account: &Account) -> anyhow::Result<()>;

    async fn find_item(&mut self, item_id: i64) -> anyhow::Result<Option<Item>>;

    async fn save_item(&mut self, item: &Item) -> anyhow::Result<()>;

    async fn find_channel(&mut self, channel_id: i64) -> anyhow::Result<Option<Channel>>;

    async fn save_channel(&mut self, channel: &Channel) -> anyhow::Result<()>;

    async fn find_auction(&mut self, auction_id: i64) -> anyhow::Result<Option<Auction>>;

    async fn save_auction(&mut self, auction: &Auction) -> anyhow::Result<()>;

    /// 成立した取引を記録する。
    async fn insert_deal(&mut self, deal: &Deal) -> anyhow::Result<()>;

    async fn find_withdrawal(&mut self, id: Uuid) -> anyhow::Result<Option<Withdrawal>>;

    /// 出金を作成または更新する。
    async fn save_withdrawal(&mut self, withdrawal: &Withdrawal) -> anyhow::Result<()>;
}
