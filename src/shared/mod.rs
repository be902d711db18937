//! Shared Types Module
//!
//! Types used by both the offline engine and the network interceptor.
//!
//! # Modules
//!
//! - **`action`** - Queued actions, their kinds and form payloads
//! - **`status`** - Sync status messages shown in the banner
//! - **`error`** - Error types for storage, transport, submission and worker
//! - **`config`** - Engine configuration

pub mod action;
pub mod config;
pub mod error;
pub mod status;

pub use action::{ActionId, ActionKind, FormPayload, PendingAction, PunchAction};
pub use error::{EngineError, StoreError, SubmitError, TransportError, WorkerError};
pub use status::{StatusState, SyncStatus};
