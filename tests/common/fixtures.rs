//! Engine and store fixtures
//!
//! Every fixture lives in its own temporary directory so tests never share
//! a queue store.

use punchqueue::client::store::{QueueStores, StoreBackend};
use punchqueue::client::{OfflineEngine, SessionSeed};
use punchqueue::shared::config::{EngineConfig, StorageBackend};
use punchqueue::shared::{FormPayload, SyncStatus};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::broadcast;

/// Origin that refuses connections
pub const UNREACHABLE_ORIGIN: &str = "http://127.0.0.1:9";

/// Build a config for `origin` storing under `dir`
pub fn test_config(origin: &str, dir: &TempDir, backend: StorageBackend) -> EngineConfig {
    EngineConfig::builder()
        .origin(origin)
        .data_dir(dir.path())
        .storage_backend(backend)
        .build()
        .expect("Failed to build test config")
}

/// Open both queue stores on the given backend
pub async fn test_stores(dir: &TempDir, backend: StorageBackend) -> QueueStores {
    stores_for(&test_config(UNREACHABLE_ORIGIN, dir, backend)).await
}

/// Open the queue stores an engine built from `config` would use
pub async fn stores_for(config: &EngineConfig) -> QueueStores {
    StoreBackend::detect(config)
        .await
        .expect("Failed to open test store")
        .queues()
}

/// Open an engine for `origin` with an idle session
pub async fn test_engine(origin: &str, dir: &TempDir) -> OfflineEngine {
    test_engine_with(test_config(origin, dir, StorageBackend::Structured)).await
}

pub async fn test_engine_with(config: EngineConfig) -> OfflineEngine {
    OfflineEngine::open(config, SessionSeed::default())
        .await
        .expect("Failed to open test engine")
}

pub fn punch(action: &str) -> FormPayload {
    FormPayload::from_pairs([("action", action)])
}

pub fn vacation(start: &str, end: &str) -> FormPayload {
    FormPayload::from_pairs([("start_date", start), ("end_date", end), ("comment", "")])
}

/// Wait up to five seconds for a status matching `predicate`
pub async fn wait_for_status<F>(rx: &mut broadcast::Receiver<SyncStatus>, predicate: F) -> SyncStatus
where
    F: Fn(&SyncStatus) -> bool,
{
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match rx.recv().await {
                Ok(status) if predicate(&status) => return status,
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => panic!("Status channel closed"),
            }
        }
    })
    .await
    .expect("Timed out waiting for status")
}
