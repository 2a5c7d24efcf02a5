//! PgSession 上の MarketRepository 実装。feature = "postgres" で有効化される。
//!
//! 読み取りは `SELECT ... FOR UPDATE` で行ロックを取り、同じ行を更新する他の
//! トランザクションをコミットまで待たせる。

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgConnection;
use tonmart_unit_of_work::PgSession;
use uuid::Uuid;

use crate::domain::entity::{Account, Auction, Bid, Channel, Deal, Item, Withdrawal, WithdrawalStatus};
use crate::domain::repository::MarketRepository;

fn connection(session: &mut PgSession) -> anyhow::Result<&mut PgConnection> {
    session
        .connection()
        .context("transaction is already finished")
}

fn to_db(amount: u64) -> anyhow::Result<i64> {
    i64::try_from(amount).with_context(|| format!("amount {amount} does not fit in BIGINT"))
}

fn from_db(amount: i64) -> anyhow::Result<u64> {
    u64::try_from(amount).with_context(|| format!("negative amount in database: {amount}"))
}

fn opt_to_db(amount: Option<u64>) -> anyhow::Result<Option<i64>> {
    amount.map(to_db).transpose()
}

fn opt_from_db(amount: Option<i64>) -> anyhow::Result<Option<u64>> {
    amount.map(from_db).transpose()
}

#[async_trait]
impl MarketRepository for PgSession {
    async fn find_account(&mut self, user_id: i64) -> anyhow::Result<Option<Account>> {
        let row = sqlx::query_as::<_, AccountRow>(
            r#"SELECT user_id, balance_nanotons, frozen_nanotons
               FROM market.accounts WHERE user_id = $1 FOR UPDATE"#,
        )
        .bind(user_id)
        .fetch_optional(connection(self)?)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn save_account(&mut self, account: &Account) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market.accounts (user_id, balance_nanotons, frozen_nanotons, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (user_id) DO UPDATE
            SET balance_nanotons = EXCLUDED.balance_nanotons,
                frozen_nanotons = EXCLUDED.frozen_nanotons,
                updated_at = NOW()
            "#,
        )
        .bind(account.user_id)
        .bind(to_db(account.balance_nanotons)?)
        .bind(to_db(account.frozen_nanotons)?)
        .execute(connection(self)?)
        .await?;
        Ok(())
    }

    async fn find_item(&mut self, item_id: i64) -> anyhow::Result<Option<Item>> {
        let row = sqlx::query_as::<_, ItemRow>(
            "SELECT id, owner_id, price_nanotons FROM market.items WHERE id = $1 FOR UPDATE",
        )
        .bind(item_id)
        .fetch_optional(connection(self)?)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn save_item(&mut self, item: &Item) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market.items (id, owner_id, price_nanotons, updated_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (id) DO UPDATE
            SET owner_id = EXCLUDED.owner_id,
                price_nanotons = EXCLUDED.price_nanotons,
                updated_at = NOW()
            "#,
        )
        .bind(item.id)
        .bind(item.owner_id)
        .bind(opt_to_db(item.price_nanotons)?)
        .execute(connection(self)?)
        .await?;
        Ok(())
    }

    async fn find_channel(&mut self, channel_id: i64) -> anyhow::Result<Option<Channel>> {
        let row = sqlx::query_as::<_, ChannelRow>(
            "SELECT id, owner_id, username, price_nanotons FROM market.channels WHERE id = $1 FOR UPDATE",
        )
        .bind(channel_id)
        .fetch_optional(connection(self)?)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn save_channel(&mut self, channel: &Channel) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market.channels (id, owner_id, username, price_nanotons, updated_at)
            VALUES ($1, $2, $3, $4, NOW())
            ON CONFLICT (id) DO UPDATE
            SET owner_id = EXCLUDED.owner_id,
                username = EXCLUDED.username,
                price_nanotons = EXCLUDED.price_nanotons,
                updated_at = NOW()
            "#,
        )
        .bind(channel.id)
        .bind(channel.owner_id)
        .bind(&channel.username)
        .bind(opt_to_db(channel.price_nanotons)?)
        .execute(connection(self)?)
        .await?;
        Ok(())
    }

    async fn find_auction(&mut self, auction_id: i64) -> anyhow::Result<Option<Auction>> {
        let row = sqlx::query_as::<_, AuctionRow>(
            r#"SELECT id, item_id, owner_id, start_bid_nanotons, step_percent,
                      highest_bidder_id, highest_bid_nanotons, ends_at
               FROM market.auctions WHERE id = $1 FOR UPDATE"#,
        )
        .bind(auction_id)
        .fetch_optional(connection(self)?)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn save_auction(&mut self, auction: &Auction) -> anyhow::Result<()> {
        let step_percent =
            i32::try_from(auction.step_percent).context("step_percent does not fit in INTEGER")?;
        sqlx::query(
            r#"
            INSERT INTO market.auctions
                (id, item_id, owner_id, start_bid_nanotons, step_percent,
                 highest_bidder_id, highest_bid_nanotons, ends_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, NOW())
            ON CONFLICT (id) DO UPDATE
            SET highest_bidder_id = EXCLUDED.highest_bidder_id,
                highest_bid_nanotons = EXCLUDED.highest_bid_nanotons,
                updated_at = NOW()
            "#,
        )
        .bind(auction.id)
        .bind(auction.item_id)
        .bind(auction.owner_id)
        .bind(to_db(auction.start_bid_nanotons)?)
        .bind(step_percent)
        .bind(auction.highest_bid.map(|b| b.bidder_id))
        .bind(opt_to_db(auction.highest_bid.map(|b| b.amount_nanotons))?)
        .bind(auction.ends_at)
        .execute(connection(self)?)
        .await?;
        Ok(())
    }

    async fn insert_deal(&mut self, deal: &Deal) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market.deals
                (id, kind, resource_id, seller_id, buyer_id, price_nanotons, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(deal.id)
        .bind(deal.kind.to_string())
        .bind(deal.resource_id)
        .bind(deal.seller_id)
        .bind(deal.buyer_id)
        .bind(to_db(deal.price_nanotons)?)
        .bind(deal.created_at)
        .execute(connection(self)?)
        .await?;
        Ok(())
    }

    async fn find_withdrawal(&mut self, id: Uuid) -> anyhow::Result<Option<Withdrawal>> {
        let row = sqlx::query_as::<_, WithdrawalRow>(
            r#"SELECT id, user_id, amount_nanotons, destination, reference, status, tx_hash,
                      created_at, updated_at
               FROM market.withdrawals WHERE id = $1 FOR UPDATE"#,
        )
        .bind(id)
        .fetch_optional(connection(self)?)
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn save_withdrawal(&mut self, withdrawal: &Withdrawal) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market.withdrawals
                (id, user_id, amount_nanotons, destination, reference, status, tx_hash, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ON CONFLICT (id) DO UPDATE
            SET status = EXCLUDED.status,
                tx_hash = EXCLUDED.tx_hash,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(withdrawal.id)
        .bind(withdrawal.user_id)
        .bind(to_db(withdrawal.amount_nanotons)?)
        .bind(&withdrawal.destination)
        .bind(&withdrawal.reference)
        .bind(withdrawal.status.to_string())
        .bind(&withdrawal.tx_hash)
        .bind(withdrawal.created_at)
        .bind(withdrawal.updated_at)
        .execute(connection(self)?)
        .await?;
        Ok(())
    }
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    user_id: i64,
    balance_nanotons: i64,
    frozen_nanotons: i64,
}

impl TryFrom<AccountRow> for Account {
    type Error = anyhow::Error;

    fn try_from(row: AccountRow) -> anyhow::Result<Self> {
        Ok(Account {
            user_id: row.user_id,
            balance_nanotons: from_db(row.balance_nanotons)?,
            frozen_nanotons: from_db(row.frozen_nanotons)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ItemRow {
    id: i64,
    owner_id: i64,
    price_nanotons: Option<i64>,
}

impl TryFrom<ItemRow> for Item {
    type Error = anyhow::Error;

    fn try_from(row: ItemRow) -> anyhow::Result<Self> {
        Ok(Item {
            id: row.id,
            owner_id: row.owner_id,
            price_nanotons: opt_from_db(row.price_nanotons)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ChannelRow {
    id: i64,
    owner_id: i64,
    username: String,
    price_nanotons: Option<i64>,
}

impl TryFrom<ChannelRow> for Channel {
    type Error = anyhow::Error;

    fn try_from(row: ChannelRow) -> anyhow::Result<Self> {
        Ok(Channel {
            id: row.id,
            owner_id: row.owner_id,
            username: row.username,
            price_nanotons: opt_from_db(row.price_nanotons)?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AuctionRow {
    id: i64,
    item_id: i64,
    owner_id: i64,
    start_bid_nanotons: i64,
    step_percent: i32,
    highest_bidder_id: Option<i64>,
    highest_bid_nanotons: Option<i64>,
    ends_at: DateTime<Utc>,
}

impl TryFrom<AuctionRow> for Auction {
    type Error = anyhow::Error;

    fn try_from(row: AuctionRow) -> anyhow::Result<Self> {
        let highest_bid = match (row.highest_bidder_id, row.highest_bid_nanotons) {
            (Some(bidder_id), Some(amount)) => Some(Bid {
                bidder_id,
                amount_nanotons: from_db(amount)?,
            }),
            (None, None) => None,
            _ => anyhow::bail!("auction {} has a partial highest bid", row.id),
        };
        Ok(Auction {
            id: row.id,
            item_id: row.item_id,
            owner_id: row.owner_id,
            start_bid_nanotons: from_db(row.start_bid_nanotons)?,
            step_percent: u32::try_from(row.step_percent).context("negative step_percent")?,
            highest_bid,
            ends_at: row.ends_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct WithdrawalRow {
    id: Uuid,
    user_id: i64,
    amount_nanotons: i64,
    destination: String,
    reference: String,
    status: String,
    tx_hash: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WithdrawalRow> for Withdrawal {
    type Error = anyhow::Error;

    fn try_from(row: WithdrawalRow) -> anyhow::Result<Self> {
        Ok(Withdrawal {
            id: row.id,
            user_id: row.user_id,
            amount_nanotons: from_db(row.amount_nanotons)?,
            destination: row.destination,
            reference: row.reference,
            status: WithdrawalStatus::from_str_value(&row.status)?,
            tx_hash: row.tx_hash,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
