//! # Structured Queue Backend
//!
//! Per-origin SQLite database with one auto-increment keyed table per
//! action kind. Insertion order is the key order, so `all()` is ordered by
//! construction and `count()` only enumerates keys.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use punchqueue::client::store::structured::StructuredDatabase;
//! use punchqueue::shared::{ActionKind, FormPayload};
//!
//! # async fn example() -> Result<(), punchqueue::shared::StoreError> {
//! let db = StructuredDatabase::open("/tmp/offline-actions.db".as_ref()).await?;
//! let queue = db.queue(ActionKind::Punch);
//! let id = queue.add(&FormPayload::from_pairs([("action", "start_work")])).await?;
//! queue.remove(&id).await?;
//! # Ok(())
//! # }
//! ```

use crate::client::store::schema;
use crate::shared::{ActionId, ActionKind, FormPayload, PendingAction, StoreError};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Row, SqlitePool};
use std::path::Path;

/// Result type for structured backend operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Structured database connection manager
#[derive(Debug, Clone)]
pub struct StructuredDatabase {
    pool: SqlitePool,
}

impl StructuredDatabase {
    /// Open or create the database file
    ///
    /// Uses WAL mode so readers (badge counts) do not block a running flush.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Open a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        // A single connection, otherwise every connection sees its own empty database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::new().in_memory(true))
            .await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Create the migrations table and apply pending migrations
    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL
            )",
        )
        .execute(&self.pool)
        .await?;

        let current_version: (i32,) =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_one(&self.pool)
                .await?;

        if !schema::needs_migration(current_version.0) {
            return Ok(());
        }

        for version in schema::get_pending_migrations(current_version.0) {
            self.apply_migration(version).await?;
        }
        Ok(())
    }

    async fn apply_migration(&self, version: i32) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for statement in schema::migration_statements(version) {
            sqlx::query(*statement).execute(&mut *tx).await?;
        }
        sqlx::query("INSERT INTO schema_migrations (version, applied_at) VALUES (?, ?)")
            .bind(version)
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        tracing::info!("Applied queue schema migration {}", version);
        Ok(())
    }

    /// Queue handle for one action kind
    pub fn queue(&self, kind: ActionKind) -> StructuredQueue {
        StructuredQueue {
            pool: self.pool.clone(),
            kind,
        }
    }

    /// Get connection pool reference
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// One kind's record collection in the structured database
#[derive(Debug, Clone)]
pub struct StructuredQueue {
    pool: SqlitePool,
    kind: ActionKind,
}

impl StructuredQueue {
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Persist a payload; the database assigns the id
    pub async fn add(&self, payload: &FormPayload) -> Result<ActionId> {
        let data = serde_json::to_string(payload)?;
        let sql = format!(
            "INSERT INTO {} (created_at, payload) VALUES (?, ?)",
            self.kind.table()
        );

        let result = sqlx::query(&sql)
            .bind(Utc::now())
            .bind(&data)
            .execute(&self.pool)
            .await?;

        Ok(ActionId::from(result.last_insert_rowid()))
    }

    /// Every stored record in key order
    pub async fn all(&self) -> Result<Vec<PendingAction>> {
        let sql = format!(
            "SELECT id, created_at, payload FROM {} ORDER BY id ASC",
            self.kind.table()
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: i64 = row.try_get("id")?;
            let created_at: DateTime<Utc> = row.try_get("created_at")?;
            let data: String = row.try_get("payload")?;

            records.push(PendingAction {
                id: ActionId::from(id),
                created_at,
                kind: self.kind,
                payload: serde_json::from_str(&data)?,
            });
        }
        Ok(records)
    }

    /// Delete exactly one record; unknown ids are a no-op
    pub async fn remove(&self, id: &ActionId) -> Result<()> {
        let Ok(key) = id.as_str().parse::<i64>() else {
            tracing::debug!("Ignoring removal of foreign id {} from {}", id, self.kind);
            return Ok(());
        };

        let sql = format!("DELETE FROM {} WHERE id = ?", self.kind.table());
        sqlx::query(&sql).bind(key).execute(&self.pool).await?;
        Ok(())
    }

    /// Number of stored records (key enumeration only)
    pub async fn count(&self) -> Result<usize> {
        let sql = format!("SELECT COUNT(id) FROM {}", self.kind.table());
        let count: (i64,) = sqlx::query_as(&sql).fetch_one(&self.pool).await?;
        Ok(count.0 as usize)
    }
}
