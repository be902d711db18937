//! # Shell Worker (worker context)
//!
//! The installed network interceptor. It runs as its own task, receives
//! [`FetchEvent`]s over a channel and answers each through a oneshot. It
//! shares nothing with the offline engine except [`CacheStorage`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use punchqueue::shared::config::EngineConfig;
//! use punchqueue::worker::{spawn_worker, CacheManifest, CacheStorage, Interceptor, Upstream};
//! use punchqueue::worker::interceptor::InterceptedRequest;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = EngineConfig::load()?;
//! let interceptor = Interceptor::new(
//!     CacheManifest::from_config(&config),
//!     CacheStorage::new(),
//!     Upstream::new(&config)?,
//! );
//! let worker = spawn_worker(interceptor);
//! worker.ready().await;
//!
//! let url = config.endpoint_url("/dashboard");
//! let outcome = worker.fetch(InterceptedRequest::navigate(url)).await?;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod interceptor;
pub mod manifest;
#[cfg(feature = "proxy")]
pub mod proxy;
pub mod upstream;

pub use cache::{Cache, CacheStorage, CachedResponse};
pub use interceptor::{
    Intercepted, InterceptedRequest, Interceptor, RequestMode, ResponseSource, WorkerLifecycle,
};
pub use manifest::CacheManifest;
pub use upstream::Upstream;

use crate::shared::WorkerError;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch};

const EVENT_QUEUE: usize = 256;

/// One intercepted request awaiting an answer
#[derive(Debug)]
pub struct FetchEvent {
    pub request: InterceptedRequest,
    respond_to: oneshot::Sender<Result<Intercepted, WorkerError>>,
}

/// Caller side of a running worker
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    tx: mpsc::Sender<FetchEvent>,
    lifecycle: watch::Receiver<WorkerLifecycle>,
}

impl WorkerHandle {
    /// Dispatch a request to the worker and wait for its answer
    pub async fn fetch(&self, request: InterceptedRequest) -> Result<Intercepted, WorkerError> {
        let (respond_to, response) = oneshot::channel();
        self.tx
            .send(FetchEvent {
                request,
                respond_to,
            })
            .await
            .map_err(|_| WorkerError::Stopped)?;
        response.await.map_err(|_| WorkerError::Stopped)?
    }

    pub fn lifecycle(&self) -> WorkerLifecycle {
        *self.lifecycle.borrow()
    }

    /// Wait until the worker serves or gave up installing
    pub async fn ready(&self) -> WorkerLifecycle {
        let mut rx = self.lifecycle.clone();
        let state = match rx
            .wait_for(|state| {
                matches!(state, WorkerLifecycle::Serving | WorkerLifecycle::Redundant)
            })
            .await
        {
            Ok(state) => *state,
            Err(_) => WorkerLifecycle::Redundant,
        };
        state
    }
}

/// Start the worker: install and activate in the background, answer events
///
/// Events arriving before activation pass through untouched.
pub fn spawn_worker(interceptor: Interceptor) -> WorkerHandle {
    let (tx, mut rx) = mpsc::channel::<FetchEvent>(EVENT_QUEUE);
    let lifecycle = interceptor.subscribe_lifecycle();
    let interceptor = Arc::new(interceptor);

    let installer = Arc::clone(&interceptor);
    tokio::spawn(async move {
        if installer.install().await.is_err() {
            return;
        }
        match installer.activate().await {
            Ok(()) => installer.serve(),
            Err(e) => tracing::warn!("Worker activation failed: {}", e),
        }
    });

    tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let interceptor = Arc::clone(&interceptor);
            tokio::spawn(async move {
                let FetchEvent {
                    request,
                    respond_to,
                } = event;
                let result = interceptor.handle(request).await;
                if respond_to.send(result).is_err() {
                    tracing::debug!("Fetch event caller went away");
                }
            });
        }
        tracing::info!("Worker event loop stopped");
    });

    WorkerHandle { tx, lifecycle }
}
