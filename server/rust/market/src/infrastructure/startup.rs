use std::sync::Arc;

use tonmart_distributed_lock::{InMemoryLockStore, LockManager, LockStore};
use tonmart_idempotency::{IdempotencyError, IdempotencyGuard, IdempotencyStore, InMemoryIdempotencyStore};
use tonmart_orchestrator::OperationOrchestrator;
use tonmart_unit_of_work::UnitOfWorkFactory;
use uuid::Uuid;

use crate::adapter::repository::MarketDatabase;
use crate::domain::repository::MarketRepository;
use crate::infrastructure::config::{Config, RedisConfig};
use crate::infrastructure::notifier::SellerNotifier;
use crate::infrastructure::ton_gateway::TonGateway;
use crate::usecase::{BuyItemUseCase, PlaceBidUseCase, TransferChannelUseCase, WithdrawUseCase};

/// Collaborators はユースケースが呼び出す外部システム。
#[derive(Clone)]
pub struct Collaborators {
    pub ton: Arc<dyn TonGateway>,
    pub notifier: Arc<dyn SellerNotifier>,
}

/// MarketService は組み立て済みのユースケース一式。
pub struct MarketService<F: UnitOfWorkFactory> {
    pub orchestrator: Arc<OperationOrchestrator<F>>,
    pub buy_item: BuyItemUseCase<F>,
    pub transfer_channel: TransferChannelUseCase<F>,
    pub place_bid: PlaceBidUseCase<F>,
    pub withdraw: WithdrawUseCase<F>,
}

impl<F> MarketService<F>
where
    F: UnitOfWorkFactory,
    F::Session: MarketRepository,
{
    pub fn new(orchestrator: Arc<OperationOrchestrator<F>>, collaborators: Collaborators) -> Self {
        Self {
            buy_item: BuyItemUseCase::new(orchestrator.clone(), collaborators.notifier.clone()),
            transfer_channel: TransferChannelUseCase::new(orchestrator.clone(), collaborators.notifier),
            place_bid: PlaceBidUseCase::new(orchestrator.clone()),
            withdraw: WithdrawUseCase::new(orchestrator.clone(), collaborators.ton),
            orchestrator,
        }
    }

    /// 保持期間を過ぎた冪等レコードを削除する。
    pub async fn purge_expired_idempotency_records(&self) -> Result<u64, IdempotencyError> {
        self.orchestrator.idempotency_guard().purge_expired().await
    }
}

/// 設定に従ってログ出力を初期化する。プロセスの起動時に一度だけ呼ぶ。
pub fn init_logging(cfg: &Config) -> anyhow::Result<()> {
    tonmart_telemetry::init_telemetry(&cfg.telemetry_config())?;
    Ok(())
}

/// ストアとトランザクションファクトリから OperationOrchestrator を組み立てる。
pub fn build_orchestrator<F: UnitOfWorkFactory>(
    cfg: &Config,
    lock_store: Arc<dyn LockStore>,
    idempotency_store: Arc<dyn IdempotencyStore>,
    factory: F,
) -> OperationOrchestrator<F> {
    let locks = LockManager::new(lock_store).with_holder_id(format!("{}-{}", cfg.app.name, Uuid::new_v4()));
    let guard = IdempotencyGuard::with_config(idempotency_store, cfg.idempotency_config());
    OperationOrchestrator::new(locks, guard, factory)
        .with_lock_options(cfg.lock_options())
        .with_retry_config(cfg.retry_config())
}

/// すべてのストアをインメモリで組み立てる。単一プロセスのテストとローカル実行用。
pub fn build_in_memory(cfg: &Config, db: MarketDatabase, collaborators: Collaborators) -> MarketService<MarketDatabase> {
    tracing::info!(app_name = %cfg.app.name, "building market service with in-memory stores");
    let orchestrator = build_orchestrator(
        cfg,
        Arc::new(InMemoryLockStore::new()),
        Arc::new(InMemoryIdempotencyStore::new()),
        db,
    );
    MarketService::new(Arc::new(orchestrator), collaborators)
}

/// 設定に応じたロックストアを作る。
///
/// 複数インスタンスで動かす前提のため、共有ストアを用意できない設定はエラーにする。
/// プロセス内のロックは `lock.allow_local_store: true` を明示した場合だけ使う。
pub async fn build_lock_store(cfg: &Config) -> anyhow::Result<Arc<dyn LockStore>> {
    if let Some(redis) = &cfg.redis {
        return connect_redis_lock_store(redis).await;
    }
    if cfg.lock.allow_local_store {
        tracing::warn!("no shared lock store configured, locks are local to this process");
        return Ok(Arc::new(InMemoryLockStore::new()));
    }
    anyhow::bail!("no shared lock store configured: set redis or lock.allow_local_store")
}

#[cfg(feature = "redis")]
async fn connect_redis_lock_store(redis: &RedisConfig) -> anyhow::Result<Arc<dyn LockStore>> {
    use secrecy::ExposeSecret;

    let store = tonmart_distributed_lock::RedisLockStore::new(redis.url.expose_secret())
        .await?
        .with_prefix(redis.key_prefix.clone());
    tracing::info!(key_prefix = %redis.key_prefix, "using redis lock store");
    Ok(Arc::new(store))
}

#[cfg(not(feature = "redis"))]
#[allow(clippy::unused_async)]
async fn connect_redis_lock_store(_redis: &RedisConfig) -> anyhow::Result<Arc<dyn LockStore>> {
    anyhow::bail!("redis is configured but this build does not include the redis feature")
}

/// PostgreSQL をトランザクションストアと冪等レコードのストアに使って組み立てる。
#[cfg(feature = "postgres")]
pub async fn build_postgres(
    cfg: &Config,
    pool: sqlx::PgPool,
    collaborators: Collaborators,
) -> anyhow::Result<MarketService<tonmart_unit_of_work::PgUnitOfWorkFactory>> {
    tracing::info!(app_name = %cfg.app.name, "building market service with postgres stores");
    let lock_store = build_lock_store(cfg).await?;
    let orchestrator = build_orchestrator(
        cfg,
        lock_store,
        Arc::new(tonmart_idempotency::PostgresIdempotencyStore::new(pool.clone())),
        tonmart_unit_of_work::PgUnitOfWorkFactory::new(pool),
    );
    Ok(MarketService::new(Arc::new(orchestrator), collaborators))
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::test_support::{FakeTonGateway, RecordingNotifier};

    fn config() -> Config {
        serde_yaml::from_str(
            r#"
app:
  name: "tonmart-market"
lock:
  wait_timeout_secs: 3
retry:
  max_attempts: 4
"#,
        )
        .unwrap()
    }

    fn collaborators() -> Collaborators {
        Collaborators {
            ton: Arc::new(FakeTonGateway::new()),
            notifier: Arc::new(RecordingNotifier::new()),
        }
    }

    #[test]
    fn test_build_in_memory_applies_config() {
        let service = build_in_memory(&config(), MarketDatabase::new(), collaborators());
        assert_eq!(
            service.orchestrator.lock_options().wait_timeout,
            Duration::from_secs(3)
        );
        assert_eq!(service.orchestrator.retry_config().max_attempts, 4);
        assert!(service
            .orchestrator
            .lock_manager()
            .holder_id()
            .starts_with("tonmart-market-"));
    }

    #[tokio::test]
    async fn test_purge_on_empty_store() {
        let service = build_in_memory(&config(), MarketDatabase::new(), collaborators());
        assert_eq!(service.purge_expired_idempotency_records().await.unwrap(), 0);
    }

    #[test]
    fn test_init_logging_twice_fails() {
        let cfg = config();
        let _ = init_logging(&cfg);
        assert!(init_logging(&cfg).is_err());
    }

    #[tokio::test]
    async fn test_lock_store_requires_shared_store_by_default() {
        let err = build_lock_store(&config()).await.err().unwrap();
        assert!(err.to_string().contains("no shared lock store"));
    }

    #[tokio::test]
    async fn test_local_lock_store_needs_explicit_opt_in() {
        let cfg: Config = serde_yaml::from_str(
            r#"
app:
  name: "tonmart-market"
lock:
  allow_local_store: true
"#,
        )
        .unwrap();
        let store = build_lock_store(&cfg).await.unwrap();
        assert!(!store.is_locked("nft:buy:42").await.unwrap());
    }

    #[cfg(not(feature = "redis"))]
    #[tokio::test]
    async fn test_configured_redis_without_feature_is_an_error() {
        let cfg: Config = serde_yaml::from_str(
            r#"
app:
  name: "tonmart-market"
redis:
  url: "redis://prod:6379"
lock:
  fallback: "fail_closed"
  allow_local_store: true
"#,
        )
        .unwrap();
        let err = build_lock_store(&cfg).await.err().unwrap();
        assert!(err.to_string().contains("redis feature"));
    }
}
