//! Both queue backends must agree on every sequence of operations

use proptest::prelude::*;
use punchqueue::client::store::{QueueStore, StoreBackend};
use punchqueue::shared::config::{EngineConfig, StorageBackend};
use punchqueue::shared::{ActionKind, FormPayload};

#[derive(Debug, Clone)]
enum Op {
    Add(String),
    /// Remove the n-th record (modulo length) if any
    Remove(usize),
}

fn op() -> impl Strategy<Value = Op> {
    prop_oneof![
        3 => "[a-z_]{1,12}".prop_map(Op::Add),
        1 => (0usize..8).prop_map(Op::Remove),
    ]
}

async fn open(dir: &tempfile::TempDir, backend: StorageBackend) -> QueueStore {
    let config = EngineConfig::builder()
        .origin("http://127.0.0.1:9")
        .data_dir(dir.path())
        .storage_backend(backend)
        .build()
        .unwrap();
    StoreBackend::detect(&config)
        .await
        .unwrap()
        .queue(ActionKind::Punch)
}

async fn run(store: &QueueStore, ops: &[Op]) -> (usize, Vec<String>) {
    for op in ops {
        match op {
            Op::Add(action) => {
                store
                    .add(&FormPayload::from_pairs([("action", action.as_str())]))
                    .await
                    .unwrap();
            }
            Op::Remove(n) => {
                let records = store.all().await.unwrap();
                if !records.is_empty() {
                    let id = records[n % records.len()].id.clone();
                    store.remove(&id).await.unwrap();
                }
            }
        }
    }

    let count = store.count().await.unwrap();
    let actions = store
        .all()
        .await
        .unwrap()
        .into_iter()
        .map(|record| record.payload.get("action").unwrap_or_default().to_string())
        .collect();
    (count, actions)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn test_backends_agree(ops in prop::collection::vec(op(), 0..24)) {
        let (structured, fallback) = tokio_test::block_on(async {
            let structured_dir = tempfile::tempdir().unwrap();
            let fallback_dir = tempfile::tempdir().unwrap();
            let structured = open(&structured_dir, StorageBackend::Structured).await;
            let fallback = open(&fallback_dir, StorageBackend::Fallback).await;
            (run(&structured, &ops).await, run(&fallback, &ops).await)
        });

        prop_assert_eq!(structured.0, structured.1.len());
        prop_assert_eq!(structured, fallback);
    }
}
