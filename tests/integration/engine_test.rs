//! Submission handler and sync trigger tests

use crate::common::*;
use crate::{assert_contains, assert_err, assert_ok};
use pretty_assertions::assert_eq;
use punchqueue::client::{SessionPhase, SubmitOutcome};
use punchqueue::shared::config::StorageBackend;
use punchqueue::shared::status::{MSG_STORE_FAILED, MSG_SYNCED};
use punchqueue::shared::{ActionKind, StatusState, SubmitError, SyncStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_offline_start_work_syncs_on_reconnect() {
    let server = MockServer::start().await;
    mount_accept(&server, "/punch").await;
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(&server.uri(), &dir).await;
    let mut status = engine.status().subscribe();

    engine.set_online(false);
    engine.start().await;

    let outcome = assert_ok!(engine.submit_punch(punch("start_work")).await);
    assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
    assert_eq!(assert_ok!(engine.pending_count().await), 1);

    let state = engine.snapshot().await;
    assert_eq!(state.phase(), SessionPhase::Working);
    let view = engine.view().borrow().clone();
    assert_eq!(view.punch_pending, 1);
    assert_ne!(view.start_label, "--:--");
    assert!(server.received_requests().await.unwrap().is_empty());

    engine.set_online(true);
    let synced = wait_for_status(&mut status, |s| s.state == StatusState::Synced).await;
    assert_eq!(synced.message, MSG_SYNCED);
    assert_eq!(assert_ok!(engine.pending_count().await), 0);
    assert_eq!(received_punch_actions(&server).await, vec!["start_work"]);

    engine.shutdown().await;
}

#[tokio::test]
async fn test_start_flushes_existing_queue_when_online() {
    let server = MockServer::start().await;
    mount_accept(&server, "/punch").await;
    let dir = tempfile::tempdir().unwrap();

    let config = test_config(&server.uri(), &dir, StorageBackend::Structured);
    let stores = stores_for(&config).await;
    assert_ok!(stores.punch.add(&punch("start_work")).await);
    assert_ok!(stores.punch.add(&punch("start_break")).await);
    drop(stores);

    let engine = test_engine_with(config).await;
    engine.start().await;

    assert_eq!(assert_ok!(engine.pending_count().await), 0);
    assert_eq!(
        received_punch_actions(&server).await,
        vec!["start_work", "start_break"]
    );
    assert_eq!(engine.view().borrow().punch_pending, 0);
    engine.shutdown().await;
}

#[tokio::test]
async fn test_online_submission_waits_behind_queued_actions() {
    let server = MockServer::start().await;
    mount_accept(&server, "/punch").await;
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(&server.uri(), &dir).await;
    let mut status = engine.status().subscribe();

    engine.set_online(false);
    assert_ok!(engine.submit_punch(punch("start_work")).await);

    // Back online, but nothing has flushed the backlog yet
    engine.set_online(true);
    let outcome = assert_ok!(engine.submit_punch(punch("start_break")).await);
    assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
    assert_eq!(engine.snapshot().await.phase(), SessionPhase::WorkingOnBreak);

    wait_for_status(&mut status, |s| s.state == StatusState::Synced).await;
    assert_eq!(assert_ok!(engine.pending_count().await), 0);
    assert_eq!(
        received_punch_actions(&server).await,
        vec!["start_work", "start_break"]
    );
}

#[tokio::test]
async fn test_failed_delivery_while_online_is_queued_and_retried() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(UNREACHABLE_ORIGIN, &dir).await;
    let mut status = engine.status().subscribe();

    let outcome = assert_ok!(engine.submit_punch(punch("start_work")).await);
    assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
    assert_eq!(engine.snapshot().await.phase(), SessionPhase::Working);

    assert_eq!(
        wait_for_status(&mut status, |_| true).await,
        SyncStatus::queued()
    );
    let blocked = wait_for_status(&mut status, |s| s.state == StatusState::Error).await;
    assert_eq!(blocked, SyncStatus::blocked(1));
    assert_eq!(assert_ok!(engine.pending_count().await), 1);
}

#[tokio::test]
async fn test_store_failure_is_reported_and_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let config = test_config(UNREACHABLE_ORIGIN, &dir, StorageBackend::Fallback);
    let engine = test_engine_with(config.clone()).await;
    engine.set_online(false);

    // Corrupt the punch list so the next add cannot decode it
    let storage = punchqueue::client::store::KeyValueStorage::open(
        &config
            .origin_dir()
            .join(punchqueue::client::store::fallback::STORAGE_FILE),
    )
    .await
    .unwrap();
    storage
        .set_item(ActionKind::Punch.storage_key(), "{broken".to_string())
        .await
        .unwrap();

    let mut status = engine.status().subscribe();
    let result = engine.submit_punch(punch("start_work")).await;

    assert_err!(result, SubmitError::Storage(_));
    assert_eq!(engine.snapshot().await.phase(), SessionPhase::Idle);
    let published = wait_for_status(&mut status, |_| true).await;
    assert_eq!(published.state, StatusState::Error);
    assert_eq!(published.message, MSG_STORE_FAILED);
}

#[tokio::test]
async fn test_punch_redirect_is_returned_for_navigation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/punch"))
        .respond_with(
            ResponseTemplate::new(303)
                .insert_header("location", "/dashboard?msg=Pause+gestartet."),
        )
        .mount(&server)
        .await;
    mount_shell(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(&server.uri(), &dir).await;
    assert_ok!(engine.submit_punch(punch("start_work")).await);

    match assert_ok!(engine.submit_punch(punch("start_break")).await) {
        SubmitOutcome::Delivered {
            navigate_to,
            notice,
        } => {
            let target = navigate_to.unwrap();
            assert_contains!(target, "/dashboard");
            assert_eq!(notice.as_deref(), Some("Pause gestartet."));
        }
        other => panic!("Expected delivery, got {:?}", other),
    }
    assert_eq!(engine.snapshot().await.phase(), SessionPhase::WorkingOnBreak);
}

#[tokio::test]
async fn test_server_punch_error_is_shown_without_transition() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/punch"))
        .respond_with(ResponseTemplate::new(303).insert_header(
            "location",
            "/dashboard?error=Keine+laufende+Arbeitszeit+vorhanden.",
        ))
        .mount(&server)
        .await;
    mount_shell(&server).await;

    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(&server.uri(), &dir).await;
    let mut status = engine.status().subscribe();

    let outcome = assert_ok!(engine.submit_punch(punch("start_break")).await);
    assert!(matches!(outcome, SubmitOutcome::Delivered { .. }));
    assert_eq!(engine.snapshot().await.phase(), SessionPhase::Idle);
    assert_eq!(
        wait_for_status(&mut status, |_| true).await,
        SyncStatus::error("Keine laufende Arbeitszeit vorhanden.")
    );
}

#[tokio::test]
async fn test_unknown_action_is_queued_without_transition() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(UNREACHABLE_ORIGIN, &dir).await;
    engine.set_online(false);

    let outcome = assert_ok!(engine.submit_punch(punch("clock_in_twice")).await);
    assert!(matches!(outcome, SubmitOutcome::Queued { .. }));
    assert_eq!(engine.snapshot().await.phase(), SessionPhase::Idle);
    assert_eq!(assert_ok!(engine.pending_count().await), 1);
}

#[tokio::test]
async fn test_offline_vacation_shows_pending_row() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(UNREACHABLE_ORIGIN, &dir).await;
    engine.set_online(false);

    let id = match assert_ok!(engine.submit_vacation(vacation("2026-08-03", "2026-08-07")).await)
    {
        SubmitOutcome::Queued { id } => id,
        other => panic!("Expected queued, got {:?}", other),
    };

    let view = engine.view().borrow().clone();
    assert_eq!(view.vacation_pending, 1);
    assert_eq!(view.pending_vacations[0].id, id);
    assert_eq!(view.pending_vacations[0].start_date, "2026-08-03");
    assert!(!view.online);
}

#[tokio::test]
async fn test_vacation_without_dates_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(UNREACHABLE_ORIGIN, &dir).await;

    let result = engine.submit_vacation(vacation("2026-08-03", " ")).await;
    assert_err!(result, SubmitError::MissingField("end_date"));
}
