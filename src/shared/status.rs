/**
 * Sync Status Messages
 *
 * Human-readable status carried from the engine to the sync banner.
 * The banner only ever renders the latest message, so producers do not
 * need ordering guarantees.
 */
use serde::{Deserialize, Serialize};

/// Banner style of a status message
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    /// Neutral information
    #[default]
    Default,
    /// Something was queued locally
    Queue,
    /// Something failed or was rejected
    Error,
    /// Every queued action reached the server
    Synced,
}

/// Status payload `{message, state}`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncStatus {
    /// Message shown to the user
    pub message: String,
    /// Banner style
    pub state: StatusState,
}

pub const MSG_SYNCED: &str = "Alle zwischengespeicherten Aktionen wurden übertragen.";
pub const MSG_QUEUED: &str =
    "Keine Verbindung. Die Aktion wurde gespeichert und wird später übertragen.";
pub const MSG_STORE_FAILED: &str =
    "Aktion konnte nicht zwischengespeichert werden. Bitte erneut versuchen.";
pub const MSG_OFFLINE: &str = "Offline-Modus: Aktionen werden lokal gespeichert.";
pub const MSG_ONLINE: &str = "Verbindung wiederhergestellt. Synchronisierung startet.";

impl SyncStatus {
    pub fn new(message: impl Into<String>, state: StatusState) -> Self {
        Self {
            message: message.into(),
            state,
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(message, StatusState::Default)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(message, StatusState::Error)
    }

    /// All queues drained
    pub fn synced() -> Self {
        Self::new(MSG_SYNCED, StatusState::Synced)
    }

    /// An action was stored for later delivery
    pub fn queued() -> Self {
        Self::new(MSG_QUEUED, StatusState::Queue)
    }

    /// The store refused an action; the user has to retry
    pub fn store_failed() -> Self {
        Self::error(MSG_STORE_FAILED)
    }

    /// A flush stopped at a failed delivery
    pub fn blocked(remaining: usize) -> Self {
        Self::error(format!(
            "Synchronisierung fehlgeschlagen. {} {} noch auf Übertragung.",
            actions_label(remaining),
            if remaining == 1 { "wartet" } else { "warten" }
        ))
    }

    /// A flush succeeded but another queue still holds actions
    pub fn in_progress(remaining: usize) -> Self {
        Self::new(
            format!(
                "Synchronisierung läuft. {} ausstehend.",
                actions_label(remaining)
            ),
            StatusState::Queue,
        )
    }
}

fn actions_label(count: usize) -> String {
    if count == 1 {
        "1 Aktion".to_string()
    } else {
        format!("{} Aktionen", count)
    }
}
