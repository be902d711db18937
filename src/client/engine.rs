//! # Offline Engine
//!
//! Wires the queue store, transport, sync coordinator, state machine,
//! projector and status channel together and implements the two
//! submission handlers.
//!
//! ## Submission
//!
//! While online a submission is delivered directly. If delivery fails for
//! a retryable reason, or the engine is offline, the payload is queued, the
//! matching punch transition is applied optimistically and a `queue` status
//! is published. A server rejection is shown to the user and never queued.
//! A store failure is shown to the user and leaves state untouched.
//!
//! ## Sync Triggers
//!
//! - [`OfflineEngine::start`] flushes when online at load
//! - an offline→online transition seen by the connectivity loop
//! - queueing while online schedules a background flush
//!
//! ## Usage
//!
//! ```rust,no_run
//! use punchqueue::client::{OfflineEngine, SessionSeed};
//! use punchqueue::shared::config::EngineConfig;
//! use punchqueue::shared::FormPayload;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let engine = OfflineEngine::open(EngineConfig::load()?, SessionSeed::default()).await?;
//! engine.start().await;
//!
//! let outcome = engine
//!     .submit_punch(FormPayload::from_pairs([("action", "start_work")]))
//!     .await?;
//! println!("{:?}", outcome);
//! # Ok(())
//! # }
//! ```

use crate::client::broadcast::{StatusBanner, StatusBroadcaster};
use crate::client::projector::{DashboardView, PendingRow, ProjectionInputs, UiProjector};
use crate::client::state::{ActionContext, ClientState, SessionMachine, SessionSeed, Transition};
use crate::client::store::{QueueStores, StoreBackend};
use crate::client::sync::{Connectivity, FlushReport, SyncCoordinator};
use crate::client::transport::HttpTransport;
use crate::shared::config::EngineConfig;
use crate::shared::status::{MSG_OFFLINE, MSG_ONLINE};
use crate::shared::{
    ActionId, ActionKind, EngineError, FormPayload, PunchAction, StoreError, SubmitError,
    SyncStatus, TransportError,
};
use chrono::Utc;
use std::sync::{Arc, Weak};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;

/// Result of a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The server acknowledged the action
    Delivered {
        /// Where the page should navigate, if the server redirected
        navigate_to: Option<String>,
        /// Notice the server attached to the redirect
        notice: Option<String>,
    },
    /// The action was stored for a later flush
    Queued { id: ActionId },
}

struct EngineInner {
    config: EngineConfig,
    stores: QueueStores,
    transport: HttpTransport,
    sync: SyncCoordinator,
    machine: RwLock<SessionMachine>,
    status: StatusBroadcaster,
    projector: UiProjector,
    connectivity: Connectivity,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for EngineInner {
    fn drop(&mut self) {
        for task in self.tasks.get_mut().iter() {
            task.abort();
        }
    }
}

/// Handle to the offline engine; clones share the same engine
#[derive(Clone)]
pub struct OfflineEngine {
    inner: Arc<EngineInner>,
}

impl std::fmt::Debug for OfflineEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineEngine")
            .field("origin", &self.inner.config.origin.as_str())
            .field("backend", &self.inner.stores.punch.backend_name())
            .field("online", &self.inner.connectivity.is_online())
            .finish()
    }
}

impl OfflineEngine {
    /// Detect the storage backend and seed the session state
    pub async fn open(config: EngineConfig, seed: SessionSeed) -> Result<Self, EngineError> {
        let backend = StoreBackend::detect(&config).await?;
        Self::with_backend(config, backend, seed)
    }

    /// Build an engine on an already selected backend
    pub fn with_backend(
        config: EngineConfig,
        backend: StoreBackend,
        seed: SessionSeed,
    ) -> Result<Self, EngineError> {
        let stores = backend.queues();
        let transport = HttpTransport::new(&config)?;
        let status = StatusBroadcaster::new();
        let sync = SyncCoordinator::new(stores.clone(), transport.clone(), status.clone());
        let machine = SessionMachine::seed(seed, now_ms());

        tracing::info!(
            "Offline engine for {} using {} queue store",
            config.origin,
            backend.name()
        );

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                stores,
                transport,
                sync,
                machine: RwLock::new(machine),
                status,
                projector: UiProjector::new(),
                connectivity: Connectivity::default(),
                tasks: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Render the first view, start background tasks and flush if online
    ///
    /// Calling `start` again only re-renders and re-flushes.
    pub async fn start(&self) {
        self.refresh_view().await;

        {
            let mut tasks = self.inner.tasks.lock().await;
            if tasks.is_empty() {
                let rx = self.inner.connectivity.subscribe();
                let weak = Arc::downgrade(&self.inner);
                tasks.push(tokio::spawn(connectivity_loop(weak, rx)));
                tasks.push(
                    self.inner
                        .projector
                        .spawn_ticker(self.inner.config.tick_interval),
                );
            }
        }

        if self.is_online() {
            let _ = self.flush_now().await;
        }
    }

    /// Stop background tasks
    pub async fn shutdown(&self) {
        for task in self.inner.tasks.lock().await.drain(..) {
            task.abort();
        }
    }

    /// Submit the punch form
    pub async fn submit_punch(&self, payload: FormPayload) -> Result<SubmitOutcome, SubmitError> {
        let action = payload
            .non_empty("action")
            .ok_or(SubmitError::MissingField("action"))?;
        let transition = PunchAction::parse(action);
        if transition.is_none() {
            tracing::warn!("Unknown punch action '{}', no local transition", action);
        }
        let context = ActionContext::from_payload(&payload);

        if self.can_deliver_directly(ActionKind::Punch).await {
            match self.inner.transport.deliver(ActionKind::Punch, &payload).await {
                Ok(delivery) => {
                    if let Some(error) = delivery.server_error {
                        self.inner.status.publish(SyncStatus::error(error));
                    } else if let Some(action) = transition {
                        self.apply(action, &context).await;
                    }
                    self.refresh_view().await;
                    return Ok(SubmitOutcome::Delivered {
                        navigate_to: delivery.navigate_to,
                        notice: delivery.notice,
                    });
                }
                Err(TransportError::Rejected(message)) => {
                    self.inner.status.publish(SyncStatus::error(message.clone()));
                    return Err(SubmitError::Rejected(message));
                }
                Err(e) => {
                    tracing::warn!("Punch delivery failed, queueing: {}", e);
                }
            }
        }

        let id = self.enqueue(ActionKind::Punch, &payload).await?;
        if let Some(action) = transition {
            self.apply(action, &context).await;
        }
        self.after_enqueue().await;
        Ok(SubmitOutcome::Queued { id })
    }

    /// Submit the vacation request form
    pub async fn submit_vacation(
        &self,
        payload: FormPayload,
    ) -> Result<SubmitOutcome, SubmitError> {
        payload
            .non_empty("start_date")
            .ok_or(SubmitError::MissingField("start_date"))?;
        payload
            .non_empty("end_date")
            .ok_or(SubmitError::MissingField("end_date"))?;

        if self.can_deliver_directly(ActionKind::Vacation).await {
            match self.inner.transport.deliver(ActionKind::Vacation, &payload).await {
                Ok(delivery) => {
                    if let Some(notice) = &delivery.notice {
                        self.inner.status.publish(SyncStatus::info(notice.clone()));
                    }
                    return Ok(SubmitOutcome::Delivered {
                        navigate_to: delivery.navigate_to,
                        notice: delivery.notice,
                    });
                }
                Err(TransportError::Rejected(message)) => {
                    self.inner.status.publish(SyncStatus::error(message.clone()));
                    return Err(SubmitError::Rejected(message));
                }
                Err(e) => {
                    tracing::warn!("Vacation delivery failed, queueing: {}", e);
                }
            }
        }

        let id = self.enqueue(ActionKind::Vacation, &payload).await?;
        self.after_enqueue().await;
        Ok(SubmitOutcome::Queued { id })
    }

    /// Online, with no earlier action of `kind` still waiting in the queue
    async fn can_deliver_directly(&self, kind: ActionKind) -> bool {
        if !self.is_online() {
            return false;
        }
        match self.inner.stores.get(kind).count().await {
            Ok(0) => true,
            Ok(pending) => {
                tracing::debug!("{} {} actions still queued, queueing behind them", pending, kind);
                false
            }
            Err(e) => {
                tracing::warn!("Could not count queued {} actions: {}", kind, e);
                true
            }
        }
    }

    async fn enqueue(&self, kind: ActionKind, payload: &FormPayload) -> Result<ActionId, StoreError> {
        match self.inner.stores.get(kind).add(payload).await {
            Ok(id) => {
                self.inner.status.publish(SyncStatus::queued());
                Ok(id)
            }
            Err(e) => {
                tracing::error!("Failed to queue {} action: {}", kind, e);
                self.inner.status.publish(SyncStatus::store_failed());
                Err(e)
            }
        }
    }

    async fn after_enqueue(&self) {
        self.refresh_view().await;

        if self.is_online() {
            let engine = self.clone();
            tokio::spawn(async move {
                let _ = engine.flush_now().await;
            });
        }
    }

    async fn apply(&self, action: PunchAction, context: &ActionContext) -> Transition {
        self.inner
            .machine
            .write()
            .await
            .apply(action, context, now_ms())
    }

    /// Drain both queues now and re-render
    pub async fn flush_now(&self) -> Result<Vec<FlushReport>, StoreError> {
        let result = self.inner.sync.flush_all().await;
        if let Err(e) = &result {
            tracing::error!("Flush failed: {}", e);
        }
        self.refresh_view().await;
        result
    }

    /// Record a connectivity change
    ///
    /// The reaction (status message, flush on reconnect) runs on the
    /// connectivity loop started by [`OfflineEngine::start`].
    pub fn set_online(&self, online: bool) -> bool {
        self.inner.connectivity.set_online(online)
    }

    pub fn is_online(&self) -> bool {
        self.inner.connectivity.is_online()
    }

    async fn on_connectivity_change(&self, online: bool) {
        if online {
            self.inner.status.publish(SyncStatus::info(MSG_ONLINE));
            let _ = self.flush_now().await;
        } else {
            self.inner.status.publish(SyncStatus::info(MSG_OFFLINE));
            self.refresh_view().await;
        }
    }

    /// Publish a fresh dashboard view
    pub async fn refresh_view(&self) -> DashboardView {
        let state = self.snapshot().await;

        let punch_pending = match self.inner.stores.punch.count().await {
            Ok(count) => count,
            Err(e) => {
                tracing::error!("Failed to count queued punches: {}", e);
                self.inner.projector.current().punch_pending
            }
        };
        let pending_vacations = match self.inner.stores.vacation.all().await {
            Ok(records) => records.iter().map(PendingRow::from_action).collect(),
            Err(e) => {
                tracing::error!("Failed to read queued vacations: {}", e);
                self.inner.projector.current().pending_vacations
            }
        };

        self.inner
            .projector
            .update(ProjectionInputs {
                state,
                punch_pending,
                pending_vacations,
                online: self.is_online(),
            })
            .await
    }

    /// Current work-session snapshot
    pub async fn snapshot(&self) -> ClientState {
        self.inner.machine.read().await.snapshot()
    }

    /// Queued actions across both kinds
    pub async fn pending_count(&self) -> Result<usize, StoreError> {
        self.inner.stores.total_count().await
    }

    pub fn status(&self) -> &StatusBroadcaster {
        &self.inner.status
    }

    /// Banner consumer with the configured auto-hide delay
    pub fn banner(&self) -> StatusBanner {
        StatusBanner::new(&self.inner.status, self.inner.config.banner_hide_after)
    }

    pub fn view(&self) -> watch::Receiver<DashboardView> {
        self.inner.projector.subscribe()
    }

    pub fn stores(&self) -> &QueueStores {
        &self.inner.stores
    }

    pub fn sync(&self) -> &SyncCoordinator {
        &self.inner.sync
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }
}

async fn connectivity_loop(inner: Weak<EngineInner>, mut rx: watch::Receiver<bool>) {
    while rx.changed().await.is_ok() {
        let online = *rx.borrow_and_update();
        let Some(inner) = inner.upgrade() else {
            break;
        };
        OfflineEngine { inner }.on_connectivity_change(online).await;
    }
    tracing::debug!("Connectivity loop stopped");
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}
