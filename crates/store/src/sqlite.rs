//! SQLite-backed item store.
//!
//! One `items` row per source path. Metadata and content are stored as JSON
//! text; stage eligibility is evaluated in SQL with `json_extract`.

use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docflow_core::{Content, Item, ItemId, ItemMeta, Stage};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use tokio::sync::Mutex;
use tracing::info;

use crate::error::StoreError;
use crate::store::{reset_patch, InsertOutcome, ItemStore};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS items (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    path TEXT UNIQUE NOT NULL,
    meta TEXT NOT NULL,
    content TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const ITEM_COLUMNS: &str = "id, path, meta, content, created_at, updated_at";

#[derive(Debug, sqlx::FromRow)]
struct ItemRow {
    id: i64,
    path: String,
    meta: String,
    content: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ItemRow> for Item {
    type Error = StoreError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        let content = match row.content.as_deref() {
            Some(raw) if !raw.trim().is_empty() => Some(serde_json::from_str::<Content>(raw)?),
            _ => None,
        };
        Ok(Item {
            id: row.id,
            path: row.path,
            meta: ItemMeta::from_json(&row.meta)?,
            content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// SQL predicate selecting items waiting on `stage`.
fn eligibility_clause(stage: Stage) -> &'static str {
    match stage {
        Stage::Render => "COALESCE(json_extract(meta, '$.rendered'), 0) = 0",
        Stage::Extract => {
            "COALESCE(json_extract(meta, '$.rendered'), 0) = 1
             AND COALESCE(json_extract(meta, '$.extracted'), 0) = 0"
        }
        Stage::Analyze => {
            "COALESCE(json_extract(meta, '$.extracted'), 0) = 1
             AND COALESCE(json_extract(meta, '$.analyzed'), 0) = 0"
        }
    }
}

pub struct SqliteItemStore {
    pool: SqlitePool,
    /// Serializes read-modify-write cycles within this process.
    write_lock: Mutex<()>,
}

impl SqliteItemStore {
    /// Open (or create) the database file at `path`.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;
        info!(path = %path.display(), "item store opened");
        Self::with_pool(pool).await
    }

    /// Private in-memory database, mostly for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        // every connection to :memory: is a separate database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Self::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> Result<Self, StoreError> {
        sqlx::query(SCHEMA).execute(&pool).await?;
        Ok(Self {
            pool,
            write_lock: Mutex::new(()),
        })
    }

    async fn fetch_meta(
        tx: &mut sqlx::SqliteConnection,
        id: ItemId,
    ) -> Result<ItemMeta, StoreError> {
        let raw = sqlx::query_scalar::<_, String>("SELECT meta FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(StoreError::NotFound(id))?;
        Ok(ItemMeta::from_json(&raw)?)
    }
}

#[async_trait]
impl ItemStore for SqliteItemStore {
    async fn insert_if_absent(&self, path: &str, meta: ItemMeta) -> Result<InsertOutcome, StoreError> {
        let now = Utc::now();
        let inserted = sqlx::query_as::<_, ItemRow>(&format!(
            "INSERT INTO items (path, meta, created_at, updated_at) VALUES (?, ?, ?, ?)
             ON CONFLICT(path) DO NOTHING
             RETURNING {ITEM_COLUMNS}"
        ))
        .bind(path)
        .bind(meta.to_json()?)
        .bind(now)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = inserted {
            return Ok(InsertOutcome::Inserted(row.try_into()?));
        }

        let id = sqlx::query_scalar::<_, i64>("SELECT id FROM items WHERE path = ?")
            .bind(path)
            .fetch_one(&self.pool)
            .await?;
        Ok(InsertOutcome::AlreadyExists(id))
    }

    async fn query_eligible(&self, stage: Stage, limit: usize) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE {} ORDER BY updated_at ASC, id ASC LIMIT ?",
            eligibility_clause(stage)
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Item::try_from).collect()
    }

    async fn merge_metadata(&self, id: ItemId, patch: ItemMeta) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut meta = Self::fetch_meta(&mut tx, id).await?;
        meta.merge(patch);

        sqlx::query("UPDATE items SET meta = ?, updated_at = ? WHERE id = ?")
            .bind(meta.to_json()?)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn set_content(&self, id: ItemId, content: Content) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let result = sqlx::query("UPDATE items SET content = ?, updated_at = ? WHERE id = ?")
            .bind(serde_json::to_string(&content)?)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }

    async fn reset_for_reprocessing(&self, id: ItemId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;

        let mut meta = Self::fetch_meta(&mut tx, id).await?;
        meta.merge(reset_patch());

        sqlx::query("UPDATE items SET content = NULL, meta = ?, updated_at = ? WHERE id = ?")
            .bind(meta.to_json()?)
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Item::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query_as::<_, ItemRow>(&format!(
            "SELECT {ITEM_COLUMNS} FROM items ORDER BY id ASC"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Item::try_from).collect()
    }
}
