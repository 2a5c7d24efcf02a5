//! PostgresIdempotencyStore: sqlx を使用した IdempotencyStore 実装。
//! feature = "postgres" で有効化される。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::store::IdempotencyStore;
use crate::{IdempotencyError, IdempotencyRecord};

/// 一意制約違反の SQLSTATE
const UNIQUE_VIOLATION: &str = "23505";

/// PostgresIdempotencyStore は `(key, actor)` の主キーで一意性を保証する。
pub struct PostgresIdempotencyStore {
    pool: PgPool,
}

impl PostgresIdempotencyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdempotencyStore for PostgresIdempotencyStore {
    async fn get(&self, key: &str, actor: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        let row = sqlx::query_as::<_, IdempotencyRow>(
            r#"SELECT key, actor, operation, request_hash, response_body, created_at, expires_at
               FROM idempotency_records
               WHERE key = $1 AND actor = $2
               AND (expires_at IS NULL OR expires_at > NOW())"#,
        )
        .bind(key)
        .bind(actor)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IdempotencyError::StorageError(e.to_string()))?;

        Ok(row.map(Into::into))
    }

    async fn insert(&self, record: IdempotencyRecord) -> Result<(), IdempotencyError> {
        // 期限切れの同一キーは先に消しておく
        sqlx::query(
            r#"DELETE FROM idempotency_records
               WHERE key = $1 AND actor = $2 AND expires_at IS NOT NULL AND expires_at <= NOW()"#,
        )
        .bind(&record.key)
        .bind(&record.actor)
        .execute(&self.pool)
        .await
        .map_err(|e| IdempotencyError::StorageError(e.to_string()))?;

        sqlx::query(
            r#"INSERT INTO idempotency_records
               (key, actor, operation, request_hash, response_body, created_at, expires_at)
               VALUES ($1, $2, $3, $4, $5, $6, $7)"#,
        )
        .bind(&record.key)
        .bind(&record.actor)
        .bind(&record.operation)
        .bind(&record.request_hash)
        .bind(&record.response_body)
        .bind(record.created_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_insert_error(e, &record))?;
        Ok(())
    }

    async fn delete(&self, key: &str, actor: &str) -> Result<bool, IdempotencyError> {
        let result = sqlx::query("DELETE FROM idempotency_records WHERE key = $1 AND actor = $2")
            .bind(key)
            .bind(actor)
            .execute(&self.pool)
            .await
            .map_err(|e| IdempotencyError::StorageError(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> Result<u64, IdempotencyError> {
        let result = sqlx::query(
            "DELETE FROM idempotency_records WHERE expires_at IS NOT NULL AND expires_at <= NOW()",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| IdempotencyError::StorageError(e.to_string()))?;
        Ok(result.rows_affected())
    }
}

fn map_insert_error(err: sqlx::Error, record: &IdempotencyRecord) -> IdempotencyError {
    let is_unique_violation = err
        .as_database_error()
        .and_then(|db| db.code())
        .is_some_and(|code| code == UNIQUE_VIOLATION);
    if is_unique_violation {
        IdempotencyError::Duplicate {
            key: record.key.clone(),
            actor: record.actor.clone(),
        }
    } else {
        IdempotencyError::StorageError(err.to_string())
    }
}

/// DB行と IdempotencyRecord の変換用中間構造体。
#[derive(sqlx::FromRow)]
struct IdempotencyRow {
    key: String,
    actor: String,
    operation: String,
    request_hash: Option<String>,
    response_body: String,
    created_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl From<IdempotencyRow> for IdempotencyRecord {
    fn from(row: IdempotencyRow) -> Self {
        IdempotencyRecord {
            key: row.key,
            actor: row.actor,
            operation: row.operation,
            request_hash: row.request_hash,
            response_body: row.response_body,
            created_at: row.created_at,
            expires_at: row.expires_at,
        }
    }
}
