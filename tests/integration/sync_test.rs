//! Flush protocol tests

use crate::common::*;
use crate::{assert_ok, assert_queue_actions};
use pretty_assertions::assert_eq;
use punchqueue::client::store::QueueStores;
use punchqueue::client::{HttpTransport, StatusBroadcaster, SyncCoordinator};
use punchqueue::shared::config::{EngineConfig, StorageBackend};
use punchqueue::shared::status::MSG_SYNCED;
use punchqueue::shared::{ActionKind, StatusState, SyncStatus};
use std::time::Duration;
use tokio::sync::broadcast::error::TryRecvError;
use wiremock::MockServer;

fn coordinator(config: &EngineConfig, stores: &QueueStores) -> (SyncCoordinator, StatusBroadcaster) {
    let status = StatusBroadcaster::new();
    let transport = assert_ok!(HttpTransport::new(config));
    (
        SyncCoordinator::new(stores.clone(), transport, status.clone()),
        status,
    )
}

async fn queue_punches(stores: &QueueStores, actions: &[&str]) {
    for action in actions {
        assert_ok!(stores.punch.add(&punch(action)).await);
    }
}

const DAY: [&str; 5] = ["start_work", "start_break", "end_break", "start_company", "end_work"];

#[tokio::test]
async fn test_flush_delivers_in_queue_order() {
    let server = MockServer::start().await;
    mount_accept(&server, "/punch").await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), &dir, StorageBackend::Structured);
    let stores = test_stores(&dir, StorageBackend::Structured).await;
    queue_punches(&stores, &DAY).await;

    let (sync, _status) = coordinator(&config, &stores);
    let report = assert_ok!(sync.flush(ActionKind::Punch).await);

    assert_eq!(report.processed, 5);
    assert!(!report.failed);
    assert_eq!(report.remaining, 0);
    assert_eq!(received_punch_actions(&server).await, DAY.to_vec());
}

#[tokio::test]
async fn test_failure_stops_pass_and_keeps_tail_queued() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, "/punch", &[200, 200, 500]).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), &dir, StorageBackend::Structured);
    let stores = test_stores(&dir, StorageBackend::Structured).await;
    queue_punches(&stores, &DAY).await;

    let (sync, status) = coordinator(&config, &stores);
    let mut rx = status.subscribe();
    let report = assert_ok!(sync.flush(ActionKind::Punch).await);

    assert_eq!(report.processed, 2);
    assert!(report.failed);
    assert_eq!(report.remaining, 3);
    // The failed item was attempted once, nothing behind it was
    assert_eq!(received_punch_actions(&server).await.len(), 3);
    assert_queue_actions!(stores.punch, ["end_break", "start_company", "end_work"]);
    assert_eq!(assert_ok!(rx.recv().await), SyncStatus::blocked(3));
}

#[tokio::test]
async fn test_fallback_backend_flushes_the_same_way() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, "/punch", &[200, 503]).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), &dir, StorageBackend::Fallback);
    let stores = test_stores(&dir, StorageBackend::Fallback).await;
    assert_eq!(stores.punch.backend_name(), "fallback");
    queue_punches(&stores, &["start_work", "end_work"]).await;

    let (sync, _status) = coordinator(&config, &stores);
    let report = assert_ok!(sync.flush(ActionKind::Punch).await);

    assert_eq!(report.processed, 1);
    assert!(report.failed);
    assert_queue_actions!(stores.punch, ["end_work"]);
}

#[tokio::test]
async fn test_no_response_leaves_record_queued() {
    let server = MockServer::start().await;
    mount_slow(&server, "/punch", Duration::from_secs(5)).await;
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::builder()
        .origin(server.uri())
        .data_dir(dir.path())
        .storage_backend(StorageBackend::Structured)
        .request_timeout(Duration::from_millis(200))
        .build()
        .unwrap();
    let stores = test_stores(&dir, StorageBackend::Structured).await;
    queue_punches(&stores, &["start_work"]).await;

    let (sync, _status) = coordinator(&config, &stores);
    let report = assert_ok!(sync.flush(ActionKind::Punch).await);

    // The server saw the request but never answered in time
    assert_eq!(received_punch_actions(&server).await, vec!["start_work"]);
    assert!(report.failed);
    assert_eq!(report.processed, 0);
    assert_queue_actions!(stores.punch, ["start_work"]);
}

#[tokio::test]
async fn test_empty_flush_is_silent() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(UNREACHABLE_ORIGIN, &dir, StorageBackend::Structured);
    let stores = test_stores(&dir, StorageBackend::Structured).await;

    let (sync, status) = coordinator(&config, &stores);
    let mut rx = status.subscribe();

    for _ in 0..2 {
        let report = assert_ok!(sync.flush(ActionKind::Punch).await);
        assert_eq!(report.processed, 0);
        assert!(!report.failed);
    }
    let reports = assert_ok!(sync.flush_all().await);
    assert!(reports.iter().all(|r| r.processed == 0));

    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_flush_all_runs_punch_before_vacation() {
    let server = MockServer::start().await;
    mount_accept(&server, "/punch").await;
    mount_accept(&server, "/vacations").await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), &dir, StorageBackend::Structured);
    let stores = test_stores(&dir, StorageBackend::Structured).await;

    assert_ok!(stores.vacation.add(&vacation("2026-08-03", "2026-08-07")).await);
    queue_punches(&stores, &["start_work", "end_work"]).await;

    let (sync, status) = coordinator(&config, &stores);
    let mut rx = status.subscribe();
    let reports = assert_ok!(sync.flush_all().await);

    let kinds: Vec<_> = reports.iter().map(|r| r.kind).collect();
    assert_eq!(kinds, vec![Some(ActionKind::Punch), Some(ActionKind::Vacation)]);

    let paths: Vec<String> = server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| r.url.path().to_string())
        .collect();
    assert_eq!(paths, vec!["/punch", "/punch", "/vacations"]);

    // Punch pass leaves the vacation queued, vacation pass drains it
    assert_eq!(assert_ok!(rx.recv().await), SyncStatus::in_progress(1));
    let last = assert_ok!(rx.recv().await);
    assert_eq!(last.state, StatusState::Synced);
    assert_eq!(last.message, MSG_SYNCED);
}

#[tokio::test]
async fn test_failed_punch_pass_does_not_skip_vacation_pass() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, "/punch", &[500]).await;
    mount_accept(&server, "/vacations").await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), &dir, StorageBackend::Structured);
    let stores = test_stores(&dir, StorageBackend::Structured).await;

    queue_punches(&stores, &["start_work"]).await;
    assert_ok!(stores.vacation.add(&vacation("2026-08-03", "2026-08-07")).await);

    let (sync, _status) = coordinator(&config, &stores);
    let reports = assert_ok!(sync.flush_all().await);

    assert!(reports[0].failed);
    assert_eq!(reports[1].processed, 1);
    assert_eq!(assert_ok!(stores.total_count().await), 1);
}

#[tokio::test]
async fn test_two_vacations_first_call_fails() {
    let server = MockServer::start().await;
    mount_status_sequence(&server, "/vacations", &[500, 200, 500]).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), &dir, StorageBackend::Structured);
    let stores = test_stores(&dir, StorageBackend::Structured).await;

    assert_ok!(stores.vacation.add(&vacation("2026-08-03", "2026-08-07")).await);
    assert_ok!(stores.vacation.add(&vacation("2026-12-21", "2026-12-31")).await);

    let (sync, status) = coordinator(&config, &stores);
    let mut rx = status.subscribe();

    let first = assert_ok!(sync.flush(ActionKind::Vacation).await);
    assert_eq!(first.processed, 0);
    assert_eq!(first.remaining, 2);

    let second = assert_ok!(sync.flush(ActionKind::Vacation).await);
    assert_eq!(second.processed, 1);
    assert_eq!(assert_ok!(stores.vacation.count().await), 1);

    let remaining = assert_ok!(stores.vacation.all().await);
    assert_eq!(remaining[0].payload.get("start_date"), Some("2026-12-21"));

    assert_eq!(assert_ok!(rx.recv().await).state, StatusState::Error);
    let after_second = assert_ok!(rx.recv().await);
    assert_eq!(after_second.state, StatusState::Error);
    assert_eq!(after_second, SyncStatus::blocked(1));
}

#[tokio::test]
async fn test_rejected_vacation_is_removed_and_reported() {
    let server = MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/vacations"))
        .respond_with(wiremock::ResponseTemplate::new(303).insert_header(
            "location",
            "/records?error=Enddatum+darf+nicht+vor+dem+Startdatum+liegen&focus=vacations",
        ))
        .mount(&server)
        .await;
    mount_shell(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), &dir, StorageBackend::Structured);
    let stores = test_stores(&dir, StorageBackend::Structured).await;
    assert_ok!(stores.vacation.add(&vacation("2026-08-10", "2026-08-01")).await);

    let (sync, status) = coordinator(&config, &stores);
    let mut rx = status.subscribe();
    let report = assert_ok!(sync.flush(ActionKind::Vacation).await);

    assert_eq!(report.processed, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(
        assert_ok!(rx.recv().await),
        SyncStatus::error("Enddatum darf nicht vor dem Startdatum liegen")
    );
}

#[tokio::test]
async fn test_replayed_punch_error_notice_is_published() {
    let server = MockServer::start().await;
    wiremock::Mock::given(wiremock::matchers::method("POST"))
        .and(wiremock::matchers::path("/punch"))
        .respond_with(wiremock::ResponseTemplate::new(303).insert_header(
            "location",
            "/dashboard?error=Keine+laufende+Arbeitszeit+vorhanden.",
        ))
        .mount(&server)
        .await;
    mount_shell(&server).await;
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(&server.uri(), &dir, StorageBackend::Structured);
    let stores = stores_for(&config).await;
    queue_punches(&stores, &["end_work"]).await;

    let (sync, status) = coordinator(&config, &stores);
    let mut rx = status.subscribe();
    let report = assert_ok!(sync.flush(ActionKind::Punch).await);

    assert_eq!(report.processed, 1);
    assert_eq!(report.remaining, 0);
    assert_eq!(
        report.rejected,
        vec!["Keine laufende Arbeitszeit vorhanden.".to_string()]
    );
    assert_eq!(
        assert_ok!(rx.recv().await),
        SyncStatus::error("Keine laufende Arbeitszeit vorhanden.")
    );
}
