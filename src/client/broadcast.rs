/**
 * Status Broadcasting
 *
 * A single channel carrying sync status from the submission handlers and
 * the sync coordinator to the banner widget.
 *
 * # Broadcasting
 *
 * Statuses are sent over `tokio::sync::broadcast`. Publishing is
 * fire-and-forget: with no subscriber the message is dropped, and a lagging
 * subscriber skips ahead since only the latest message matters.
 */

use crate::shared::{StatusState, SyncStatus};
use std::time::{Duration, Instant};
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Sender side of the status channel
#[derive(Debug, Clone)]
pub struct StatusBroadcaster {
    tx: broadcast::Sender<SyncStatus>,
}

impl Default for StatusBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusBroadcaster {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { tx }
    }

    /// Publish a status to all subscribers
    ///
    /// Returns the number of subscribers that received it (0 if none).
    pub fn publish(&self, status: SyncStatus) -> usize {
        tracing::debug!("[Status] {:?}: {}", status.state, status.message);
        match self.tx.send(status) {
            Ok(subscriber_count) => subscriber_count,
            Err(_) => {
                tracing::debug!("[Status] No subscribers to receive status");
                0
            }
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncStatus> {
        self.tx.subscribe()
    }
}

/// Banner consumer: remembers the latest status and hides after `synced`
#[derive(Debug)]
pub struct StatusBanner {
    rx: broadcast::Receiver<SyncStatus>,
    latest: Option<SyncStatus>,
    shown_at: Option<Instant>,
    hide_after: Duration,
}

impl StatusBanner {
    pub fn new(broadcaster: &StatusBroadcaster, hide_after: Duration) -> Self {
        Self {
            rx: broadcaster.subscribe(),
            latest: None,
            shown_at: None,
            hide_after,
        }
    }

    /// Drain pending statuses without waiting, keeping only the newest
    pub fn poll(&mut self) -> Option<&SyncStatus> {
        loop {
            match self.rx.try_recv() {
                Ok(status) => self.show(status),
                Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                    tracing::debug!("[Status] Banner skipped {} stale statuses", skipped);
                }
                Err(_) => break,
            }
        }
        self.visible()
    }

    /// Wait for the next status
    pub async fn next(&mut self) -> Option<SyncStatus> {
        loop {
            match self.rx.recv().await {
                Ok(status) => {
                    self.show(status.clone());
                    return Some(status);
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    fn show(&mut self, status: SyncStatus) {
        self.latest = Some(status);
        self.shown_at = Some(Instant::now());
    }

    /// The status currently on screen, if any
    pub fn visible(&self) -> Option<&SyncStatus> {
        let status = self.latest.as_ref()?;
        if status.state == StatusState::Synced {
            let shown_at = self.shown_at?;
            if shown_at.elapsed() >= self.hide_after {
                return None;
            }
        }
        Some(status)
    }
}
