//! テストと単一プロセス構成向けのインメモリ実装。
//!
//! 書き込みはセッション内に溜め、コミット時に一括で反映する。
//! セッションが読んだ行がコミットまでに他のセッションに更新されていた場合、
//! コミットは `Conflict` で失敗する（楽観的同時実行制御）。

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;

use crate::error::{SessionError, UnitOfWorkError};
use crate::factory::UnitOfWorkFactory;
use crate::session::TransactionalSession;
use crate::unit::UnitOfWork;

#[derive(Debug, thiserror::Error)]
pub enum InMemoryStoreError {
    #[error("コミットが失敗するよう設定されています")]
    InjectedCommitFailure,
    #[error("データベースに接続できません")]
    Unavailable,
    #[error("読み取り後に他のトランザクションが行を更新しました")]
    Conflict,
}

struct Versioned<V> {
    version: u64,
    value: V,
}

struct Shared<K, V> {
    data: RwLock<HashMap<K, Versioned<V>>>,
    next_version: AtomicU64,
    failing_commits: AtomicU32,
    available: AtomicBool,
    commits: AtomicU64,
    rollbacks: AtomicU64,
    discards: AtomicU64,
}

/// InMemoryDatabase はコミット済みのデータを保持する共有ストア。
pub struct InMemoryDatabase<K, V> {
    shared: Arc<Shared<K, V>>,
}

impl<K, V> Clone for InMemoryDatabase<K, V> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<K, V> Default for InMemoryDatabase<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> InMemoryDatabase<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                data: RwLock::new(HashMap::new()),
                next_version: AtomicU64::new(1),
                failing_commits: AtomicU32::new(0),
                available: AtomicBool::new(true),
                commits: AtomicU64::new(0),
                rollbacks: AtomicU64::new(0),
                discards: AtomicU64::new(0),
            }),
        }
    }

    /// セッションを介さずにコミット済みデータへ直接書き込む（初期データ投入用）。
    pub fn seed(&self, key: K, value: V) {
        let version = self.bump_version();
        self.write_data().insert(key, Versioned { version, value });
    }

    /// コミット済みの値を読む。
    pub fn get(&self, key: &K) -> Option<V> {
        self.read_data().get(key).map(|v| v.value.clone())
    }

    pub fn len(&self) -> usize {
        self.read_data().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_data().is_empty()
    }

    /// 次の `n` 回のコミットを失敗させる。
    pub fn fail_next_commits(&self, n: u32) {
        self.shared.failing_commits.store(n, Ordering::SeqCst);
    }

    /// false にすると `begin` が `Begin` エラーを返す。
    pub fn set_available(&self, available: bool) {
        self.shared.available.store(available, Ordering::SeqCst);
    }

    pub fn commit_count(&self) -> u64 {
        self.shared.commits.load(Ordering::SeqCst)
    }

    pub fn rollback_count(&self) -> u64 {
        self.shared.rollbacks.load(Ordering::SeqCst)
    }

    pub fn discard_count(&self) -> u64 {
        self.shared.discards.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> InMemorySession<K, V> {
        InMemorySession {
            db: self.clone(),
            staged: HashMap::new(),
            reads: HashMap::new(),
        }
    }

    fn read_data(&self) -> std::sync::RwLockReadGuard<'_, HashMap<K, Versioned<V>>> {
        self.shared.data.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_data(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<K, Versioned<V>>> {
        self.shared.data.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump_version(&self) -> u64 {
        self.shared.next_version.fetch_add(1, Ordering::SeqCst)
    }

    fn take_injected_failure(&self) -> bool {
        self.shared
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// InMemorySession は 1 トランザクション分の書き込みを保持する。
///
/// 読み取りは自セッションの未コミット書き込みを優先し、無ければコミット済みデータを返す。
pub struct InMemorySession<K, V> {
    db: InMemoryDatabase<K, V>,
    // None は削除
    staged: HashMap<K, Option<V>>,
    // 最初に読んだ時点のバージョン。None は行が存在しなかった
    reads: HashMap<K, Option<u64>>,
}

impl<K, V> InMemorySession<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    pub fn get(&mut self, key: &K) -> Option<V> {
        if let Some(staged) = self.staged.get(key) {
            return staged.clone();
        }
        let committed = self.db.read_data();
        let entry = committed.get(key);
        self.reads
            .entry(key.clone())
            .or_insert_with(|| entry.map(|e| e.version));
        entry.map(|e| e.value.clone())
    }

    pub fn put(&mut self, key: K, value: V) {
        self.staged.insert(key, Some(value));
    }

    pub fn remove(&mut self, key: &K) {
        self.staged.insert(key.clone(), None);
    }

    /// 条件に一致する値を、未コミットの書き込みを反映した状態で返す。
    pub fn scan<P>(&mut self, mut predicate: P) -> Vec<(K, V)>
    where
        P: FnMut(&K, &V) -> bool,
    {
        let committed = self.db.read_data();
        let mut out = Vec::new();
        for (k, entry) in committed.iter() {
            if self.staged.contains_key(k) || !predicate(k, &entry.value) {
                continue;
            }
            self.reads.entry(k.clone()).or_insert(Some(entry.version));
            out.push((k.clone(), entry.value.clone()));
        }
        drop(committed);
        out.extend(
            self.staged
                .iter()
                .filter_map(|(k, v)| v.as_ref().map(|v| (k, v)))
                .filter(|(k, v)| predicate(*k, *v))
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        out
    }

    pub fn has_pending_writes(&self) -> bool {
        !self.staged.is_empty()
    }

    pub fn database(&self) -> &InMemoryDatabase<K, V> {
        &self.db
    }
}

#[async_trait]
impl<K, V> TransactionalSession for InMemorySession<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn commit(&mut self) -> Result<(), SessionError> {
        if self.db.take_injected_failure() {
            return Err(Box::new(InMemoryStoreError::InjectedCommitFailure));
        }
        let mut data = self.db.write_data();
        let conflicted = self
            .reads
            .iter()
            .any(|(key, read)| data.get(key).map(|e| e.version) != *read);
        if conflicted {
            return Err(Box::new(InMemoryStoreError::Conflict));
        }
        for (key, value) in std::mem::take(&mut self.staged) {
            match value {
                Some(value) => {
                    let version = self.db.bump_version();
                    data.insert(key, Versioned { version, value });
                }
                None => {
                    data.remove(&key);
                }
            }
        }
        drop(data);
        self.reads.clear();
        self.db.shared.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        self.staged.clear();
        self.reads.clear();
        self.db.shared.rollbacks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn discard(&mut self) {
        self.staged.clear();
        self.reads.clear();
        self.db.shared.discards.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl<K, V> UnitOfWorkFactory for InMemoryDatabase<K, V>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    type Session = InMemorySession<K, V>;

    async fn begin(&self) -> Result<UnitOfWork<Self::Session>, UnitOfWorkError> {
        if !self.shared.available.load(Ordering::SeqCst) {
            return Err(UnitOfWorkError::begin(InMemoryStoreError::Unavailable));
        }
        Ok(UnitOfWork::new(self.session()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_staged_writes_invisible_until_commit() {
        let db: InMemoryDatabase<&str, i64> = InMemoryDatabase::new();
        let mut session = db.session();
        session.put("balance", 100);
        assert_eq!(session.get(&"balance"), Some(100));
        assert_eq!(db.get(&"balance"), None);

        session.commit().await.unwrap();
        assert_eq!(db.get(&"balance"), Some(100));
        assert!(!session.has_pending_writes());
    }

    #[tokio::test]
    async fn test_remove_applied_on_commit() {
        let db: InMemoryDatabase<&str, i64> = InMemoryDatabase::new();
        db.seed("a", 1);
        let mut session = db.session();
        session.remove(&"a");
        assert_eq!(session.get(&"a"), None);
        assert_eq!(db.get(&"a"), Some(1));
        session.commit().await.unwrap();
        assert!(db.is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure_keeps_data_unchanged() {
        let db: InMemoryDatabase<&str, i64> = InMemoryDatabase::new();
        db.fail_next_commits(1);
        let mut session = db.session();
        session.put("a", 1);
        assert!(session.commit().await.is_err());
        assert!(db.is_empty());

        // 2 回目は成功する
        session.commit().await.unwrap();
        assert_eq!(db.get(&"a"), Some(1));
    }

    #[test]
    fn test_scan_merges_staged_and_committed() {
        let db: InMemoryDatabase<u32, &str> = InMemoryDatabase::new();
        db.seed(1, "one");
        db.seed(2, "two");
        let mut session = db.session();
        session.put(2, "TWO");
        session.put(3, "three");
        session.remove(&1);

        let mut found = session.scan(|_, _| true);
        found.sort_unstable();
        assert_eq!(found, vec![(2, "TWO"), (3, "three")]);
    }

    #[tokio::test]
    async fn test_concurrent_update_conflicts() {
        let db: InMemoryDatabase<&str, i64> = InMemoryDatabase::new();
        db.seed("balance", 100);

        let mut first = db.session();
        let mut second = db.session();
        let a = first.get(&"balance").unwrap();
        let b = second.get(&"balance").unwrap();
        first.put("balance", a - 30);
        second.put("balance", b - 50);

        first.commit().await.unwrap();
        let err = second.commit().await.unwrap_err();
        assert!(err.to_string().contains("他のトランザクション"));
        assert_eq!(db.get(&"balance"), Some(70));
    }

    #[tokio::test]
    async fn test_blind_write_does_not_conflict() {
        let db: InMemoryDatabase<&str, i64> = InMemoryDatabase::new();
        db.seed("a", 1);
        let mut first = db.session();
        let mut second = db.session();
        first.put("a", 2);
        second.put("b", 3);
        first.commit().await.unwrap();
        second.commit().await.unwrap();
        assert_eq!(db.get(&"a"), Some(2));
        assert_eq!(db.get(&"b"), Some(3));
    }

    #[tokio::test]
    async fn test_unavailable_database_fails_begin() {
        let db: InMemoryDatabase<u32, u32> = InMemoryDatabase::new();
        db.set_available(false);
        assert!(matches!(
            db.begin().await,
            Err(UnitOfWorkError::Begin { .. })
        ));
    }
}
