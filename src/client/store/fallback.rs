//! # Fallback Queue Backend
//!
//! Flat key-value storage used when the structured database is not
//! available. The whole storage is one JSON object file mapping keys to
//! serialized strings, and each queue kind keeps its records as a single
//! serialized list under a fixed key. Every operation round-trips the
//! whole list.
//!
//! ## Features
//!
//! - **Atomic Writes**: Write to a temp file, then rename over the original
//! - **Serialized Access**: Read-modify-write holds an in-process lock
//! - **Local Ids**: `<unix millis>-<random>` since there is no key generator

use crate::shared::{ActionId, ActionKind, FormPayload, PendingAction, StoreError};
use chrono::Utc;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

/// Result type for fallback backend operations
pub type Result<T> = std::result::Result<T, StoreError>;

/// Name of the key-value storage file
pub const STORAGE_FILE: &str = "local-storage.json";

/// Persistent string key-value storage backed by one file
#[derive(Debug)]
pub struct KeyValueStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl KeyValueStorage {
    /// Open the storage file, creating its directory if needed
    ///
    /// Fails if an existing file is not a valid key-value object.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let storage = Self {
            path: path.to_path_buf(),
            lock: Mutex::new(()),
        };
        storage.read_map().await?;
        Ok(storage)
    }

    async fn read_map(&self) -> Result<BTreeMap<String, String>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) if contents.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_map(&self, map: &BTreeMap<String, String>) -> Result<()> {
        let data = serde_json::to_vec(map)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &data).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    /// Read one value
    pub async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.read_map().await?.remove(key))
    }

    /// Store one value
    pub async fn set_item(&self, key: &str, value: String) -> Result<()> {
        self.update(key, |_| Ok((Some(value), ()))).await
    }

    /// Atomically replace the value under `key`
    ///
    /// `f` receives the current value and returns the new value (`None`
    /// deletes the key) plus a result handed back to the caller.
    pub async fn update<F, R>(&self, key: &str, f: F) -> Result<R>
    where
        F: FnOnce(Option<String>) -> Result<(Option<String>, R)>,
    {
        let _guard = self.lock.lock().await;
        let mut map = self.read_map().await?;

        let (next, result) = f(map.remove(key))?;
        if let Some(value) = next {
            map.insert(key.to_string(), value);
        }
        self.write_map(&map).await?;
        Ok(result)
    }
}

/// One kind's serialized list in the key-value storage
#[derive(Debug, Clone)]
pub struct FallbackQueue {
    storage: Arc<KeyValueStorage>,
    kind: ActionKind,
}

fn decode_list(blob: Option<&str>) -> Result<Vec<PendingAction>> {
    match blob {
        Some(data) if !data.trim().is_empty() => Ok(serde_json::from_str(data)?),
        _ => Ok(Vec::new()),
    }
}

fn generate_id() -> ActionId {
    let random = Uuid::new_v4().simple().to_string();
    ActionId::new(format!("{}-{}", Utc::now().timestamp_millis(), &random[..8]))
}

impl FallbackQueue {
    pub fn new(storage: Arc<KeyValueStorage>, kind: ActionKind) -> Self {
        Self { storage, kind }
    }

    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Append a record with a locally generated id
    pub async fn add(&self, payload: &FormPayload) -> Result<ActionId> {
        let kind = self.kind;
        let payload = payload.clone();

        self.storage
            .update(kind.storage_key(), move |blob| {
                let mut list = decode_list(blob.as_deref())?;
                let mut id = generate_id();
                while list.iter().any(|record| record.id == id) {
                    id = generate_id();
                }
                list.push(PendingAction {
                    id: id.clone(),
                    created_at: Utc::now(),
                    kind,
                    payload,
                });
                Ok((Some(serde_json::to_string(&list)?), id))
            })
            .await
    }

    /// Every stored record in list order
    pub async fn all(&self) -> Result<Vec<PendingAction>> {
        let blob = self.storage.get_item(self.kind.storage_key()).await?;
        decode_list(blob.as_deref())
    }

    /// Filter one record out of the list; unknown ids are a no-op
    pub async fn remove(&self, id: &ActionId) -> Result<()> {
        let id = id.clone();
        self.storage
            .update(self.kind.storage_key(), move |blob| {
                let Some(data) = blob else {
                    return Ok((None, ()));
                };
                let mut list = decode_list(Some(&data))?;
                let before = list.len();
                list.retain(|record| record.id != id);
                if list.len() == before {
                    return Ok((Some(data), ()));
                }
                Ok((Some(serde_json::to_string(&list)?), ()))
            })
            .await
    }

    /// Number of stored records
    pub async fn count(&self) -> Result<usize> {
        Ok(self.all().await?.len())
    }
}
