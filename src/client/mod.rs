//! # Offline Engine (page context)
//!
//! Everything that runs alongside the user interface:
//!
//! - `store`: durable queue store with structured and fallback backends
//! - `transport`: form-encoded delivery to `/punch` and `/vacations`
//! - `sync`: stop-on-first-failure flush protocol and connectivity signal
//! - `state`: work-session state machine
//! - `projector`: dashboard view model
//! - `broadcast`: status channel feeding the sync banner
//! - `engine`: submission handlers wiring the above together

pub mod broadcast;
pub mod engine;
pub mod projector;
pub mod state;
pub mod store;
pub mod sync;
pub mod transport;

pub use broadcast::{StatusBanner, StatusBroadcaster};
pub use engine::{OfflineEngine, SubmitOutcome};
pub use projector::{Clock, DashboardView, PendingRow, UiProjector};
pub use state::{ClientState, SessionMachine, SessionPhase, SessionSeed, Transition};
pub use store::{QueueStore, QueueStores, StoreBackend};
pub use sync::{Connectivity, FlushReport, SyncCoordinator};
pub use transport::{Delivery, HttpTransport};
