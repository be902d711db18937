//! # Sync Coordinator
//!
//! Drains the queue stores against the origin once connectivity returns.
//!
//! ## Flush Protocol
//!
//! A pass over one kind reads every record in store order and delivers them
//! one at a time. The first failed delivery ends the pass; records behind it
//! stay queued so their relative order is preserved. A record is removed
//! only after its delivery was acknowledged with a 2xx.
//!
//! After every non-empty pass the remaining count across both kinds is
//! published on the status channel. An empty pass publishes nothing.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use punchqueue::client::sync::SyncCoordinator;
//! use punchqueue::shared::ActionKind;
//!
//! # async fn example(sync: SyncCoordinator) -> Result<(), punchqueue::shared::StoreError> {
//! let report = sync.flush(ActionKind::Punch).await?;
//! println!("delivered {} actions", report.processed);
//!
//! // Punch queue first, then vacation queue
//! sync.flush_all().await?;
//! # Ok(())
//! # }
//! ```

pub mod network_monitor;

pub use network_monitor::{Connectivity, NetworkStatus};

use crate::client::broadcast::StatusBroadcaster;
use crate::client::store::QueueStores;
use crate::client::transport::{Delivery, HttpTransport};
use crate::shared::{ActionKind, PendingAction, StoreError, SyncStatus, TransportError};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Outcome of one flush pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlushReport {
    /// Kind drained by this pass
    pub kind: Option<ActionKind>,
    /// Records delivered and removed
    pub processed: usize,
    /// Whether the pass stopped at a failed delivery
    pub failed: bool,
    /// Server rejections and error notices of delivered records
    pub rejected: Vec<String>,
    /// Records left across both kinds after the pass
    pub remaining: usize,
}

impl FlushReport {
    fn empty(kind: ActionKind, remaining: usize) -> Self {
        Self {
            kind: Some(kind),
            remaining,
            ..Default::default()
        }
    }

    /// Status to show for this pass
    pub fn status(&self) -> SyncStatus {
        if self.failed {
            SyncStatus::blocked(self.remaining)
        } else if let Some(message) = self.rejected.last() {
            SyncStatus::error(message.clone())
        } else if self.remaining == 0 {
            SyncStatus::synced()
        } else {
            SyncStatus::in_progress(self.remaining)
        }
    }
}

/// Sequential, stop-on-first-failure queue drainer
#[derive(Debug, Clone)]
pub struct SyncCoordinator {
    stores: QueueStores,
    transport: HttpTransport,
    status: StatusBroadcaster,
    /// Serializes passes so two triggers never interleave
    pass_lock: Arc<Mutex<()>>,
}

impl SyncCoordinator {
    pub fn new(stores: QueueStores, transport: HttpTransport, status: StatusBroadcaster) -> Self {
        Self {
            stores,
            transport,
            status,
            pass_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Run one pass over the queue of `kind`
    pub async fn flush(&self, kind: ActionKind) -> Result<FlushReport, StoreError> {
        let _guard = self.pass_lock.lock().await;
        self.flush_locked(kind).await
    }

    /// Punch pass then vacation pass
    ///
    /// Both passes always run; the first store error is returned after the
    /// second pass finished.
    pub async fn flush_all(&self) -> Result<Vec<FlushReport>, StoreError> {
        let _guard = self.pass_lock.lock().await;

        let mut reports = Vec::with_capacity(ActionKind::ALL.len());
        let mut first_error = None;

        for kind in ActionKind::ALL {
            match self.flush_locked(kind).await {
                Ok(report) => reports.push(report),
                Err(e) => {
                    tracing::error!("{} flush aborted by store error: {}", kind, e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(reports),
        }
    }

    async fn flush_locked(&self, kind: ActionKind) -> Result<FlushReport, StoreError> {
        let store = self.stores.get(kind);
        let records = store.all().await?;

        if records.is_empty() {
            tracing::debug!("{} queue empty, nothing to flush", kind);
            return Ok(FlushReport::empty(kind, self.stores.total_count().await?));
        }

        tracing::info!("Flushing {} queued {} actions", records.len(), kind);
        let mut report = FlushReport::empty(kind, 0);

        for record in records {
            match self.deliver(&record).await {
                Ok(delivery) => {
                    store.remove(&record.id).await?;
                    report.processed += 1;
                    report.rejected.extend(delivery.server_error);
                }
                Err(TransportError::Rejected(message)) => {
                    store.remove(&record.id).await?;
                    report.processed += 1;
                    report.rejected.push(message);
                }
                Err(e) => {
                    tracing::warn!("Delivery of {} action {} failed: {}", kind, record.id, e);
                    report.failed = true;
                    break;
                }
            }
        }

        report.remaining = self.stores.total_count().await?;
        tracing::info!(
            "{} flush finished: {} delivered, {} remaining{}",
            kind,
            report.processed,
            report.remaining,
            if report.failed { " (stopped at failure)" } else { "" }
        );

        self.status.publish(report.status());
        Ok(report)
    }

    async fn deliver(&self, record: &PendingAction) -> Result<Delivery, TransportError> {
        let delivery = self.transport.deliver(record.kind, &record.payload).await?;
        if let Some(error) = &delivery.server_error {
            tracing::warn!("Server answered {} {} with: {}", record.kind, record.id, error);
        }
        Ok(delivery)
    }

    pub fn stores(&self) -> &QueueStores {
        &self.stores
    }
}
