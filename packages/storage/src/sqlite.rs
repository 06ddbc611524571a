// ABOUTME: SQLite-backed Store using a single records table
// ABOUTME: Table is created on connect; bodies are stored as JSON text

use async_trait::async_trait;
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::{debug, info};

use crate::{validate_id, RecordKind, Store, StorageError, StorageResult};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connect to a database URL, creating the file when missing
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;
        info!("Connected to record store at {}", database_url);
        Self::from_pool(pool).await
    }

    /// Wrap an existing pool and make sure the schema exists
    pub async fn from_pool(pool: SqlitePool) -> StorageResult<Self> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS records (
                kind TEXT NOT NULL,
                id TEXT NOT NULL,
                body TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                PRIMARY KEY (kind, id)
            )
            "#,
        )
        .execute(&pool)
        .await?;

        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn load(&self, kind: RecordKind, id: &str) -> StorageResult<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT body FROM records WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        match row {
            Some(row) => {
                let body: String = row.try_get("body")?;
                Ok(Some(serde_json::from_str(&body)?))
            }
            None => Ok(None),
        }
    }

    async fn save(&self, kind: RecordKind, id: &str, record: &serde_json::Value) -> StorageResult<()> {
        validate_id(id)?;
        let body = serde_json::to_string(record)?;

        sqlx::query(
            r#"
            INSERT INTO records (kind, id, body, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(kind, id) DO UPDATE SET
                body = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(kind.as_str())
        .bind(id)
        .bind(body)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(StorageError::Sqlx)?;

        debug!("Saved {} record {}", kind, id);
        Ok(())
    }

    async fn delete(&self, kind: RecordKind, id: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM records WHERE kind = ? AND id = ?")
            .bind(kind.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, kind: RecordKind) -> StorageResult<Vec<(String, serde_json::Value)>> {
        let rows = sqlx::query("SELECT id, body FROM records WHERE kind = ? ORDER BY id")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(StorageError::Sqlx)?;

        rows.into_iter()
            .map(|row| {
                let id: String = row.try_get("id")?;
                let body: String = row.try_get("body")?;
                Ok((id, serde_json::from_str(&body)?))
            })
            .collect()
    }
}
