//! # Cache Storage
//!
//! Named caches of stored responses, keyed by absolute request URL. This is
//! the only state the worker shares with anything else; the engine never
//! touches it.
//!
//! Each [`Cache`] is one generation of the app shell. Replacing a
//! generation means opening a new name and deleting the old one.
//!
//! [`CacheStorage::persistent`] keeps every generation in a per-origin
//! SQLite file so the shell survives a restart while offline. Writes go to
//! the database first and to memory only once they are committed.

use crate::shared::WorkerError;
use bytes::Bytes;
use chrono::Utc;
use reqwest::header::HeaderMap;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteExecutor, SqliteJournalMode, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Name of the persistent shell cache file
pub const SHELL_CACHE_FILE: &str = "shell-cache.db";

/// Headers that describe the connection rather than the resource
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "transfer-encoding",
    "content-length",
    "upgrade",
];

/// A stored (or freshly fetched) response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedResponse {
    /// URL the response was fetched from
    pub url: String,
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl CachedResponse {
    pub fn new(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            status,
            headers: Vec::new(),
            body: body.into(),
        }
    }

    /// Copy end-to-end headers, dropping hop-by-hop ones
    pub fn with_headers(mut self, headers: &HeaderMap) -> Self {
        self.headers = headers
            .iter()
            .filter(|(name, _)| !HOP_BY_HOP.contains(&name.as_str()))
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// One named cache
#[derive(Debug)]
pub struct Cache {
    name: String,
    entries: RwLock<HashMap<String, CachedResponse>>,
    db: Option<SqlitePool>,
}

impl Cache {
    fn new(name: &str, entries: HashMap<String, CachedResponse>, db: Option<SqlitePool>) -> Self {
        Self {
            name: name.to_string(),
            entries: RwLock::new(entries),
            db,
        }
    }

    pub async fn get(&self, url: &str) -> Option<CachedResponse> {
        self.entries.read().await.get(url).cloned()
    }

    pub async fn put(&self, url: &str, response: CachedResponse) -> Result<(), WorkerError> {
        let mut entries = self.entries.write().await;
        if let Some(pool) = &self.db {
            write_row(pool, &self.name, url, &response).await?;
        }
        entries.insert(url.to_string(), response);
        Ok(())
    }

    /// Store several responses in one transaction
    ///
    /// Either all of them are stored or none.
    pub async fn put_all(
        &self,
        responses: impl IntoIterator<Item = (String, CachedResponse)>,
    ) -> Result<(), WorkerError> {
        let responses: Vec<(String, CachedResponse)> = responses.into_iter().collect();
        let mut entries = self.entries.write().await;

        if let Some(pool) = &self.db {
            let mut tx = pool.begin().await?;
            for (url, response) in &responses {
                write_row(&mut *tx, &self.name, url, response).await?;
            }
            tx.commit().await?;
        }

        entries.extend(responses);
        Ok(())
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

async fn write_row<'e>(
    executor: impl SqliteExecutor<'e>,
    cache_name: &'e str,
    url: &'e str,
    response: &'e CachedResponse,
) -> Result<(), WorkerError> {
    sqlx::query(
        "INSERT OR REPLACE INTO shell_cache
            (cache_name, url, response_url, status, headers, body, stored_at)
         VALUES (?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(cache_name)
    .bind(url)
    .bind(response.url.as_str())
    .bind(i64::from(response.status))
    .bind(serde_json::to_string(&response.headers)?)
    .bind(response.body.as_ref())
    .bind(Utc::now().to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

fn read_row(row: &SqliteRow) -> Result<(String, String, CachedResponse), WorkerError> {
    let cache_name: String = row.try_get("cache_name")?;
    let url: String = row.try_get("url")?;
    let status: i64 = row.try_get("status")?;
    let headers: String = row.try_get("headers")?;
    let body: Vec<u8> = row.try_get("body")?;

    let response = CachedResponse {
        url: row.try_get("response_url")?,
        status: u16::try_from(status).map_err(|_| WorkerError::CorruptCache(url.clone()))?,
        headers: serde_json::from_str(&headers)?,
        body: Bytes::from(body),
    };
    Ok((cache_name, url, response))
}

/// All caches of one origin
#[derive(Debug, Clone, Default)]
pub struct CacheStorage {
    caches: Arc<RwLock<HashMap<String, Arc<Cache>>>>,
    db: Option<SqlitePool>,
}

impl CacheStorage {
    /// Storage that lives only as long as the process
    pub fn new() -> Self {
        Self::default()
    }

    /// Open or create the cache database and load every stored generation
    pub async fn persistent(path: &Path) -> Result<Self, WorkerError> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);
        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        sqlx::query(
            "CREATE TABLE IF NOT EXISTS shell_cache (
                cache_name TEXT NOT NULL,
                url TEXT NOT NULL,
                response_url TEXT NOT NULL,
                status INTEGER NOT NULL,
                headers TEXT NOT NULL,
                body BLOB NOT NULL,
                stored_at TEXT NOT NULL,
                PRIMARY KEY (cache_name, url)
            )",
        )
        .execute(&pool)
        .await?;

        let rows = sqlx::query(
            "SELECT cache_name, url, response_url, status, headers, body FROM shell_cache",
        )
        .fetch_all(&pool)
        .await?;

        let mut generations: HashMap<String, HashMap<String, CachedResponse>> = HashMap::new();
        for row in &rows {
            match read_row(row) {
                Ok((cache_name, url, response)) => {
                    generations.entry(cache_name).or_default().insert(url, response);
                }
                Err(e) => tracing::warn!("Skipping unreadable cached response: {}", e),
            }
        }

        tracing::info!(
            "Loaded {} cached responses in {} generations from {}",
            rows.len(),
            generations.len(),
            path.display()
        );

        let caches = generations
            .into_iter()
            .map(|(name, entries)| {
                let cache = Arc::new(Cache::new(&name, entries, Some(pool.clone())));
                (name, cache)
            })
            .collect();

        Ok(Self {
            caches: Arc::new(RwLock::new(caches)),
            db: Some(pool),
        })
    }

    /// Open a cache, creating it if it does not exist
    pub async fn open(&self, name: &str) -> Arc<Cache> {
        if let Some(cache) = self.caches.read().await.get(name) {
            return Arc::clone(cache);
        }
        let mut caches = self.caches.write().await;
        Arc::clone(
            caches
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(Cache::new(name, HashMap::new(), self.db.clone()))),
        )
    }

    pub async fn has(&self, name: &str) -> bool {
        self.caches.read().await.contains_key(name)
    }

    /// Delete a cache; returns whether it existed
    pub async fn delete(&self, name: &str) -> Result<bool, WorkerError> {
        let mut caches = self.caches.write().await;
        if let Some(pool) = &self.db {
            sqlx::query("DELETE FROM shell_cache WHERE cache_name = ?")
                .bind(name)
                .execute(pool)
                .await?;
        }
        Ok(caches.remove(name).is_some())
    }

    /// Cache names, sorted
    pub async fn keys(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// First stored response for `url` in any cache
    pub async fn match_any(&self, url: &str) -> Option<CachedResponse> {
        let caches: Vec<Arc<Cache>> = self.caches.read().await.values().cloned().collect();
        for cache in caches {
            if let Some(response) = cache.get(url).await {
                return Some(response);
            }
        }
        None
    }
}
