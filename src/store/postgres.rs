//! PostgreSQL-backed store.
//!
//! One `records` table keyed by `(id, kind)` with a `jsonb` payload and a
//! `version` column; conditional updates compare-and-swap on the version so
//! challenge consumption serializes across instances.

use super::{Record, RecordKind, Store, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{Connection, PgPool, Row, postgres::PgPoolOptions};
use std::time::Duration;

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    /// Connects to the database and ensures the `records` table exists.
    ///
    /// # Errors
    /// Returns an error if the connection or the schema setup fails.
    pub async fn connect(dsn: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(dsn)
            .await
            .map_err(backend)?;

        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS records (
                id      TEXT   NOT NULL,
                kind    TEXT   NOT NULL,
                version BIGINT NOT NULL,
                payload JSONB  NOT NULL,
                PRIMARY KEY (id, kind)
            )
            ",
        )
        .execute(&pool)
        .await
        .map_err(backend)?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn get(&self, id: &str, kind: RecordKind) -> Result<Option<Record>, StoreError> {
        let row = sqlx::query("SELECT version, payload FROM records WHERE id = $1 AND kind = $2")
            .bind(id)
            .bind(kind.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?;

        match row {
            Some(row) => Ok(Some(Record {
                id: id.to_string(),
                kind,
                version: row.try_get("version").map_err(backend)?,
                payload: row.try_get("payload").map_err(backend)?,
            })),
            None => Ok(None),
        }
    }

    async fn create(&self, record: Record) -> Result<(), StoreError> {
        let result =
            sqlx::query("INSERT INTO records (id, kind, version, payload) VALUES ($1, $2, 1, $3)")
                .bind(&record.id)
                .bind(record.kind.as_str())
                .bind(&record.payload)
                .execute(&self.pool)
                .await;

        match result {
            Ok(_) => Ok(()),
            Err(err) if is_unique_violation(&err) => Err(StoreError::AlreadyExists),
            Err(err) => Err(backend(err)),
        }
    }

    async fn update(
        &self,
        id: &str,
        kind: RecordKind,
        payload: Value,
        expected_version: Option<i64>,
    ) -> Result<Record, StoreError> {
        let row = if let Some(expected) = expected_version {
            sqlx::query(
                r"
                UPDATE records SET payload = $3, version = version + 1
                WHERE id = $1 AND kind = $2 AND version = $4
                RETURNING version
                ",
            )
            .bind(id)
            .bind(kind.as_str())
            .bind(&payload)
            .bind(expected)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
        } else {
            sqlx::query(
                r"
                UPDATE records SET payload = $3, version = version + 1
                WHERE id = $1 AND kind = $2
                RETURNING version
                ",
            )
            .bind(id)
            .bind(kind.as_str())
            .bind(&payload)
            .fetch_optional(&self.pool)
            .await
            .map_err(backend)?
        };

        match row {
            Some(row) => Ok(Record {
                id: id.to_string(),
                kind,
                version: row.try_get("version").map_err(backend)?,
                payload,
            }),
            // Distinguish a stale version from a missing record.
            None => match self.get(id, kind).await? {
                Some(_) => Err(StoreError::Conflict),
                None => Err(StoreError::NotFound),
            },
        }
    }

    async fn delete(&self, id: &str, kind: RecordKind) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM records WHERE id = $1 AND kind = $2")
            .bind(id)
            .bind(kind.as_str())
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.pool.acquire().await.map_err(backend)?;
        conn.ping().await.map_err(backend)
    }
}

fn backend(err: sqlx::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().is_some_and(|code| code.as_ref() == "23505"),
        _ => false,
    }
}
