//! # Durable Queue Store
//!
//! Key-ordered persistent storage of pending actions with two
//! interchangeable backends:
//!
//! - **Structured**: per-origin SQLite database, one table per kind
//! - **Fallback**: one serialized list per kind in flat key-value storage
//!
//! The backend is chosen once by [`StoreBackend::detect`] and never
//! re-checked. Callers only see [`QueueStore`], whose four operations
//! behave identically on both variants.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use punchqueue::client::store::StoreBackend;
//! use punchqueue::shared::config::EngineConfig;
//! use punchqueue::shared::{ActionKind, FormPayload};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let backend = StoreBackend::detect(&EngineConfig::load()?).await?;
//! let stores = backend.queues();
//!
//! let id = stores.punch.add(&FormPayload::from_pairs([("action", "start_work")])).await?;
//! assert_eq!(stores.punch.count().await?, 1);
//! stores.punch.remove(&id).await?;
//! # Ok(())
//! # }
//! ```

pub mod fallback;
pub mod schema;
pub mod structured;

pub use fallback::{FallbackQueue, KeyValueStorage};
pub use structured::{StructuredDatabase, StructuredQueue};

use crate::shared::config::{EngineConfig, StorageBackend};
use crate::shared::{ActionId, ActionKind, FormPayload, PendingAction, StoreError};
use std::sync::Arc;

/// The storage backend selected at startup
#[derive(Debug, Clone)]
pub enum StoreBackend {
    /// Per-origin structured database
    Structured(StructuredDatabase),
    /// Flat key-value storage
    Fallback(Arc<KeyValueStorage>),
}

impl StoreBackend {
    /// Pick a backend by feature detection
    ///
    /// With `StorageBackend::Auto` the structured database is tried first;
    /// if it cannot be opened the fallback is used instead.
    pub async fn detect(config: &EngineConfig) -> Result<Self, StoreError> {
        let dir = config.origin_dir();

        match config.storage_backend {
            StorageBackend::Structured => Self::open_structured(&dir).await,
            StorageBackend::Fallback => Self::open_fallback(&dir).await,
            StorageBackend::Auto => match Self::open_structured(&dir).await {
                Ok(backend) => Ok(backend),
                Err(e) => {
                    tracing::warn!(
                        "Structured queue store unavailable ({}), using key-value fallback",
                        e
                    );
                    Self::open_fallback(&dir).await
                }
            },
        }
    }

    async fn open_structured(dir: &std::path::Path) -> Result<Self, StoreError> {
        let db = StructuredDatabase::open(&dir.join(schema::DATABASE_FILE)).await?;
        tracing::info!("Queue store: structured database in {}", dir.display());
        Ok(StoreBackend::Structured(db))
    }

    async fn open_fallback(dir: &std::path::Path) -> Result<Self, StoreError> {
        let storage = KeyValueStorage::open(&dir.join(fallback::STORAGE_FILE)).await?;
        tracing::info!("Queue store: key-value fallback in {}", dir.display());
        Ok(StoreBackend::Fallback(Arc::new(storage)))
    }

    /// Queue instance for one kind
    pub fn queue(&self, kind: ActionKind) -> QueueStore {
        match self {
            StoreBackend::Structured(db) => QueueStore::Structured(db.queue(kind)),
            StoreBackend::Fallback(storage) => {
                QueueStore::Fallback(FallbackQueue::new(Arc::clone(storage), kind))
            }
        }
    }

    /// Both queue instances
    pub fn queues(&self) -> QueueStores {
        QueueStores {
            punch: self.queue(ActionKind::Punch),
            vacation: self.queue(ActionKind::Vacation),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            StoreBackend::Structured(_) => "structured",
            StoreBackend::Fallback(_) => "fallback",
        }
    }
}

/// Queue of one action kind
#[derive(Debug, Clone)]
pub enum QueueStore {
    Structured(StructuredQueue),
    Fallback(FallbackQueue),
}

impl QueueStore {
    /// Persist a payload and return its id
    pub async fn add(&self, payload: &FormPayload) -> Result<ActionId, StoreError> {
        let id = match self {
            QueueStore::Structured(q) => q.add(payload).await?,
            QueueStore::Fallback(q) => q.add(payload).await?,
        };
        tracing::debug!("Queued {} action {}", self.kind(), id);
        Ok(id)
    }

    /// Every not-yet-removed record in insertion order
    pub async fn all(&self) -> Result<Vec<PendingAction>, StoreError> {
        match self {
            QueueStore::Structured(q) => q.all().await,
            QueueStore::Fallback(q) => q.all().await,
        }
    }

    /// Delete exactly the record with this id; unknown ids are a no-op
    pub async fn remove(&self, id: &ActionId) -> Result<(), StoreError> {
        match self {
            QueueStore::Structured(q) => q.remove(id).await,
            QueueStore::Fallback(q) => q.remove(id).await,
        }
    }

    /// Number of stored records
    pub async fn count(&self) -> Result<usize, StoreError> {
        match self {
            QueueStore::Structured(q) => q.count().await,
            QueueStore::Fallback(q) => q.count().await,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            QueueStore::Structured(q) => q.kind(),
            QueueStore::Fallback(q) => q.kind(),
        }
    }

    /// Active backend, for diagnostics only
    pub fn backend_name(&self) -> &'static str {
        match self {
            QueueStore::Structured(_) => "structured",
            QueueStore::Fallback(_) => "fallback",
        }
    }
}

/// The two queue instances, one per kind
#[derive(Debug, Clone)]
pub struct QueueStores {
    pub punch: QueueStore,
    pub vacation: QueueStore,
}

impl QueueStores {
    pub fn get(&self, kind: ActionKind) -> &QueueStore {
        match kind {
            ActionKind::Punch => &self.punch,
            ActionKind::Vacation => &self.vacation,
        }
    }

    /// Remaining records across both kinds
    pub async fn total_count(&self) -> Result<usize, StoreError> {
        Ok(self.punch.count().await? + self.vacation.count().await?)
    }
}
