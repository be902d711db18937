//! punchqueue - Offline Action Queue for Time Tracking
//!
//! punchqueue keeps a time-tracking client usable while the device has no
//! network connectivity. Punches (start/end work, breaks, company
//! assignments) and vacation requests are delivered straight to the server
//! when possible and otherwise persisted locally, applied optimistically to
//! the client's work-session state, and replayed in submission order once
//! connectivity returns.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared between the engine and the worker
//!   - Pending actions, form payloads, status messages
//!   - Configuration and error types
//!
//! - **`client`** - The offline engine running in the page context
//!   - Durable queue store with structured and fallback backends
//!   - Sync coordinator draining queues against `/punch` and `/vacations`
//!   - Work-session state machine and UI projector
//!   - Status broadcaster feeding the sync banner
//!
//! - **`worker`** - The installed network interceptor
//!   - App-shell cache with a single generation
//!   - Per-resource strategies (network first, cache first, fallback)
//!   - Optional local proxy front (`proxy` feature)
//!
//! # Usage
//!
//! ```rust,no_run
//! use punchqueue::client::OfflineEngine;
//! use punchqueue::shared::config::EngineConfig;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load()?;
//! let engine = OfflineEngine::open(config, Default::default()).await?;
//! engine.start().await;
//! # Ok(())
//! # }
//! ```
//!
//! # Isolation
//!
//! The engine and the worker never share memory. The worker runs as its own
//! task and only touches the cache storage; the engine only touches the
//! queue store. This mirrors the boundary between a page and its installed
//! worker.
//!
//! # Error Handling
//!
//! - `Result<T, E>` for fallible operations
//! - Error enums in `shared::error`, built with `thiserror`
//! - Nothing is fatal: failures degrade to "stay queued, tell the user"

/// Shared types and data structures
pub mod shared;

/// Offline engine (page context)
pub mod client;

/// Network interceptor (worker context)
pub mod worker;
