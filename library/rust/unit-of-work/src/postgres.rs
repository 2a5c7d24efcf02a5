//! PostgreSQL 実装。feature = "postgres" で有効化される。

use async_trait::async_trait;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};

use crate::error::{SessionError, UnitOfWorkError};
use crate::factory::UnitOfWorkFactory;
use crate::session::TransactionalSession;
use crate::unit::UnitOfWork;

/// PgUnitOfWorkFactory はプールから接続を借りてトランザクションを開始する。
#[derive(Clone)]
pub struct PgUnitOfWorkFactory {
    pool: PgPool,
}

impl PgUnitOfWorkFactory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl UnitOfWorkFactory for PgUnitOfWorkFactory {
    type Session = PgSession;

    async fn begin(&self) -> Result<UnitOfWork<PgSession>, UnitOfWorkError> {
        let tx = self.pool.begin().await.map_err(UnitOfWorkError::begin)?;
        Ok(UnitOfWork::new(PgSession { tx: Some(tx) }))
    }
}

/// PgSession は 1 つの sqlx トランザクションを保持する。
pub struct PgSession {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgSession {
    /// トランザクション内でクエリを実行するための接続。終了後は None。
    pub fn connection(&mut self) -> Option<&mut PgConnection> {
        self.tx.as_deref_mut()
    }
}

#[async_trait]
impl TransactionalSession for PgSession {
    async fn commit(&mut self) -> Result<(), SessionError> {
        match self.tx.take() {
            Some(tx) => tx.commit().await.map_err(Into::into),
            None => Ok(()),
        }
    }

    async fn rollback(&mut self) -> Result<(), SessionError> {
        match self.tx.take() {
            Some(tx) => tx.rollback().await.map_err(Into::into),
            None => Ok(()),
        }
    }

    fn discard(&mut self) {
        // sqlx は破棄されたトランザクションを接続の返却時にロールバックする
        drop(self.tx.take());
    }
}
