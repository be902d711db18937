//! # UI Projector
//!
//! Turns a state snapshot plus queue counts into the view model the
//! dashboard renders, and publishes it on a `watch` channel so every
//! renderer sees only the newest view.
//!
//! The elapsed-time label is the only value that changes without an input
//! event; [`UiProjector::spawn_ticker`] re-renders it on a coarse interval.

use crate::client::state::ClientState;
use crate::shared::{ActionId, PendingAction};
use chrono::Utc;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;

/// Queued vacation request rendered as a "pending sync" row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PendingRow {
    pub id: ActionId,
    pub start_date: String,
    pub end_date: String,
    pub comment: String,
}

impl PendingRow {
    pub fn from_action(action: &PendingAction) -> Self {
        let field = |name: &str| action.payload.get(name).unwrap_or_default().to_string();
        Self {
            id: action.id.clone(),
            start_date: field("start_date"),
            end_date: field("end_date"),
            comment: field("comment"),
        }
    }
}

/// Dashboard view model
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DashboardView {
    pub status_label: String,
    pub start_label: String,
    pub break_label: String,
    pub elapsed_label: String,
    pub company_label: Option<String>,
    pub punch_pending: usize,
    pub vacation_pending: usize,
    pub pending_vacations: Vec<PendingRow>,
    pub online: bool,
}

/// Everything a render depends on except the clock
#[derive(Debug, Clone, Default)]
pub struct ProjectionInputs {
    pub state: ClientState,
    pub punch_pending: usize,
    pub pending_vacations: Vec<PendingRow>,
    pub online: bool,
}

/// Render a view at `now_ms`
pub fn render(inputs: &ProjectionInputs, now_ms: i64) -> DashboardView {
    let state = &inputs.state;

    let status_label = if !state.is_working {
        "Nicht eingestempelt".to_string()
    } else if state.on_break {
        "In Pause".to_string()
    } else if let Some(company) = &state.company_name {
        format!("Im Einsatz bei {}", company)
    } else if state.has_company {
        "Im Einsatz".to_string()
    } else {
        "Arbeitszeit läuft".to_string()
    };

    DashboardView {
        status_label,
        start_label: state.start_label().unwrap_or_else(|| "--:--".to_string()),
        break_label: state.break_label(now_ms),
        elapsed_label: state.elapsed_label(now_ms),
        company_label: state.company_name.clone(),
        punch_pending: inputs.punch_pending,
        vacation_pending: inputs.pending_vacations.len(),
        pending_vacations: inputs.pending_vacations.clone(),
        online: inputs.online,
    }
}

/// Shortest accepted ticker period
const MIN_TICK_INTERVAL: Duration = Duration::from_millis(100);

/// Source of the current time in unix millis
#[derive(Clone)]
pub struct Clock(Arc<dyn Fn() -> i64 + Send + Sync>);

impl Clock {
    pub fn new(now_ms: impl Fn() -> i64 + Send + Sync + 'static) -> Self {
        Self(Arc::new(now_ms))
    }

    /// Wall clock
    pub fn system() -> Self {
        Self::new(|| Utc::now().timestamp_millis())
    }

    pub fn now_ms(&self) -> i64 {
        (self.0)()
    }
}

impl fmt::Debug for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Clock")
    }
}

/// Publishes dashboard views
#[derive(Debug, Clone)]
pub struct UiProjector {
    tx: Arc<watch::Sender<DashboardView>>,
    inputs: Arc<RwLock<ProjectionInputs>>,
    clock: Clock,
}

impl Default for UiProjector {
    fn default() -> Self {
        Self::new()
    }
}

impl UiProjector {
    pub fn new() -> Self {
        Self::with_clock(Clock::system())
    }

    /// Projector rendering times from `clock`
    pub fn with_clock(clock: Clock) -> Self {
        let (tx, _) = watch::channel(DashboardView::default());
        Self {
            tx: Arc::new(tx),
            inputs: Arc::new(RwLock::new(ProjectionInputs::default())),
            clock,
        }
    }

    /// Replace the inputs and publish a fresh view
    pub async fn update(&self, inputs: ProjectionInputs) -> DashboardView {
        let view = render(&inputs, self.clock.now_ms());
        *self.inputs.write().await = inputs;
        self.publish(view.clone());
        view
    }

    /// Re-render from the last inputs with the current time
    pub async fn refresh(&self) -> DashboardView {
        let view = render(&*self.inputs.read().await, self.clock.now_ms());
        self.publish(view.clone());
        view
    }

    fn publish(&self, view: DashboardView) {
        self.tx.send_if_modified(|current| {
            if *current == view {
                false
            } else {
                *current = view;
                true
            }
        });
    }

    /// Latest published view
    pub fn current(&self) -> DashboardView {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardView> {
        self.tx.subscribe()
    }

    /// Refresh the view every `interval` until the handle is aborted
    pub fn spawn_ticker(&self, interval: Duration) -> JoinHandle<()> {
        let projector = self.clone();
        let interval = interval.max(MIN_TICK_INTERVAL);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                projector.refresh().await;
            }
        })
    }
}
