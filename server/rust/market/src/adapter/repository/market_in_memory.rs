use async_trait::async_trait;
use tonmart_unit_of_work::{InMemoryDatabase, InMemorySession};
use uuid::Uuid;

use crate::domain::entity::{Account, Auction, Channel, Deal, Item, Withdrawal};
use crate::domain::repository::MarketRepository;

/// インメモリストア上の行のキー。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MarketKey {
    Account(i64),
    Item(i64),
    Channel(i64),
    Auction(i64),
    Deal(Uuid),
    Withdrawal(Uuid),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarketRow {
    Account(Account),
    Item(Item),
    Channel(Channel),
    Auction(Auction),
    Deal(Deal),
    Withdrawal(Withdrawal),
}

impl MarketRow {
    pub fn key(&self) -> MarketKey {
        match self {
            MarketRow::Account(a) => MarketKey::Account(a.user_id),
            MarketRow::Item(i) => MarketKey::Item(i.id),
            MarketRow::Channel(c) => MarketKey::Channel(c.id),
            MarketRow::Auction(a) => MarketKey::Auction(a.id),
            MarketRow::Deal(d) => MarketKey::Deal(d.id),
            MarketRow::Withdrawal(w) => MarketKey::Withdrawal(w.id),
        }
    }
}

macro_rules! row_conversions {
    ($($variant:ident),* $(,)?) => {
        $(
            impl From<$variant> for MarketRow {
                fn from(value: $variant) -> Self {
                    MarketRow::$variant(value)
                }
            }

            impl TryFrom<MarketRow> for $variant {
                type Error = anyhow::Error;

                fn try_from(row: MarketRow) -> anyhow::Result<Self> {
                    match row {
                        MarketRow::$variant(value) => Ok(value),
                        other => anyhow::bail!(
                            "expected {} row, found {:?}",
                            stringify!($variant),
                            other.key()
                        ),
                    }
                }
            }
        )*
    };
}

row_conversions!(Account, Item, Channel, Auction, Deal, Withdrawal);

/// テストとローカル実行で使うインメモリのマーケットデータベース。
pub type MarketDatabase = InMemoryDatabase<MarketKey, MarketRow>;
pub type MarketSession = InMemorySession<MarketKey, MarketRow>;

/// MarketDatabaseExt はコミット済みの状態を型付きで読み書きするヘルパー。
pub trait MarketDatabaseExt {
    /// トランザクションを介さずに行を投入する。
    fn insert_row(&self, row: impl Into<MarketRow>);
    fn account(&self, user_id: i64) -> Option<Account>;
    fn item(&self, item_id: i64) -> Option<Item>;
    fn channel(&self, channel_id: i64) -> Option<Channel>;
    fn auction(&self, auction_id: i64) -> Option<Auction>;
    fn deals(&self) -> Vec<Deal>;
    fn withdrawals(&self) -> Vec<Withdrawal>;
}

impl MarketDatabaseExt for MarketDatabase {
    fn insert_row(&self, row: impl Into<MarketRow>) {
        let row = row.into();
        self.seed(row.key(), row);
    }

    fn account(&self, user_id: i64) -> Option<Account> {
        committed(self, &MarketKey::Account(user_id))
    }

    fn item(&self, item_id: i64) -> Option<Item> {
        committed(self, &MarketKey::Item(item_id))
    }

    fn channel(&self, channel_id: i64) -> Option<Channel> {
        committed(self, &MarketKey::Channel(channel_id))
    }

    fn auction(&self, auction_id: i64) -> Option<Auction> {
        committed(self, &MarketKey::Auction(auction_id))
    }

    fn deals(&self) -> Vec<Deal> {
        scan_committed(self, |k| matches!(k, MarketKey::Deal(_)))
    }

    fn withdrawals(&self) -> Vec<Withdrawal> {
        scan_committed(self, |k| matches!(k, MarketKey::Withdrawal(_)))
    }
}

fn committed<T: TryFrom<MarketRow>>(db: &MarketDatabase, key: &MarketKey) -> Option<T> {
    db.get(key).and_then(|row| T::try_from(row).ok())
}

fn scan_committed<T, P>(db: &MarketDatabase, mut predicate: P) -> Vec<T>
where
    T: TryFrom<MarketRow>,
    P: FnMut(&MarketKey) -> bool,
{
    // コミットしない読み取り専用セッション
    db.session()
        .scan(|k, _| predicate(k))
        .into_iter()
        .filter_map(|(_, row)| T::try_from(row).ok())
        .collect()
}

fn typed<T>(row: Option<MarketRow>) -> anyhow::Result<Option<T>>
where
    T: TryFrom<MarketRow, Error = anyhow::Error>,
{
    row.map(T::try_from).transpose()
}

#[async_trait]
impl MarketRepository for MarketSession {
    async fn find_account(&mut self, user_id: i64) -> anyhow::Result<Option<Account>> {
        typed(self.get(&MarketKey::Account(user_id)))
    }

    async fn save_account(&mut self, account: &Account) -> anyhow::Result<()> {
        self.put(MarketKey::Account(account.user_id), account.clone().into());
        Ok(())
    }

    async fn find_item(&mut self, item_id: i64) -> anyhow::Result<Option<Item>> {
        typed(self.get(&MarketKey::Item(item_id)))
    }

    async fn save_item(&mut self, item: &Item) -> anyhow::Result<()> {
        self.put(MarketKey::Item(item.id), item.clone().into());
        Ok(())
    }

    async fn find_channel(&mut self, channel_id: i64) -> anyhow::Result<Option<Channel>> {
        typed(self.get(&MarketKey::Channel(channel_id)))
    }

    async fn save_channel(&mut self, channel: &Channel) -> anyhow::Result<()> {
        self.put(MarketKey::Channel(channel.id), channel.clone().into());
        Ok(())
    }

    async fn find_auction(&mut self, auction_id: i64) -> anyhow::Result<Option<Auction>> {
        typed(self.get(&MarketKey::Auction(auction_id)))
    }

    async fn save_auction(&mut self, auction: &Auction) -> anyhow::Result<()> {
        self.put(MarketKey::Auction(auction.id), auction.clone().into());
        Ok(())
    }

    async fn insert_deal(&mut self, deal: &Deal) -> anyhow::Result<()> {
        let key = MarketKey::Deal(deal.id);
        if self.get(&key).is_some() {
            anyhow::bail!("deal {} already exists", deal.id);
        }
        self.put(key, deal.clone().into());
        Ok(())
    }

    async fn find_withdrawal(&mut self, id: Uuid) -> anyhow::Result<Option<Withdrawal>> {
        typed(self.get(&MarketKey::Withdrawal(id)))
    }

    async fn save_withdrawal(&mut self, withdrawal: &Withdrawal) -> anyhow::Result<()> {
        self.put(MarketKey::Withdrawal(withdrawal.id), withdrawal.clone().into());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tonmart_unit_of_work::TransactionalSession;

    use super::*;
    use crate::domain::entity::DealKind;

    #[tokio::test]
    async fn test_session_reads_own_writes_and_commits() {
        let db = MarketDatabase::new();
        db.insert_row(Account::new(1, 100));

        let mut session = db.session();
        let mut account = session.find_account(1).await.unwrap().unwrap();
        account.debit(40).unwrap();
        session.save_account(&account).await.unwrap();

        assert_eq!(session.find_account(1).await.unwrap().unwrap().balance_nanotons, 60);
        assert_eq!(db.account(1).unwrap().balance_nanotons, 100);

        session.commit().await.unwrap();
        assert_eq!(db.account(1).unwrap().balance_nanotons, 60);
    }

    #[tokio::test]
    async fn test_duplicate_deal_is_rejected() {
        let db = MarketDatabase::new();
        let deal = Deal::new(DealKind::Item, 42, 1, 2, 500);
        db.insert_row(deal.clone());

        let mut session = db.session();
        assert!(session.insert_deal(&deal).await.is_err());
    }

    #[test]
    fn test_typed_rejects_mismatched_row() {
        let row = Some(MarketRow::from(Item::new(1, 1)));
        let result: anyhow::Result<Option<Account>> = typed(row);
        assert!(result.is_err());
    }

    #[test]
    fn test_deals_lists_committed_deals() {
        let db = MarketDatabase::new();
        db.insert_row(Deal::new(DealKind::Item, 42, 1, 2, 500));
        db.insert_row(Account::new(1, 0));
        assert_eq!(db.deals().len(), 1);
        assert!(db.withdrawals().is_empty());
    }
}
