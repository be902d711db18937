//! # Network Monitor
//!
//! Tracks online/offline status for sync triggering.
//!
//! The status is a `tokio::sync::watch` value: the platform (or the CLI's
//! `online`/`offline` commands) calls [`Connectivity::set_online`], and the
//! engine's connectivity loop wakes on every change.

use tokio::sync::watch;

/// Network connectivity status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl From<bool> for NetworkStatus {
    fn from(online: bool) -> Self {
        if online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        }
    }
}

/// Shared connectivity signal
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: watch::Sender<bool>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _) = watch::channel(online);
        Self { tx }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn status(&self) -> NetworkStatus {
        self.is_online().into()
    }

    /// Record the current status; returns whether it changed
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!("Network status changed to {:?}", NetworkStatus::from(online));
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl Default for Connectivity {
    fn default() -> Self {
        Self::new(true)
    }
}
