//! Pending Actions
//!
//! A pending action is a user submission (a punch or a vacation request)
//! that the server has not acknowledged yet. Once persisted it is never
//! mutated: it is either removed after a successful delivery or left in
//! place for the next flush.
//!
//! # Usage
//!
//! ```rust
//! use punchqueue::shared::action::{ActionKind, FormPayload, PunchAction};
//!
//! let payload = FormPayload::from_pairs([("action", "start_work"), ("notes", "")]);
//! assert_eq!(payload.get("action"), Some("start_work"));
//! assert_eq!(ActionKind::Punch.endpoint(), "/punch");
//! assert_eq!(PunchAction::parse("start_break"), Some(PunchAction::StartBreak));
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Action category, selecting endpoint and queue instance
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Work-session punch (`POST /punch`)
    Punch,
    /// Vacation request (`POST /vacations`)
    Vacation,
}

impl ActionKind {
    /// All kinds in flush order
    pub const ALL: [ActionKind; 2] = [ActionKind::Punch, ActionKind::Vacation];

    /// Origin-relative endpoint the kind is delivered to
    pub fn endpoint(&self) -> &'static str {
        match self {
            ActionKind::Punch => "/punch",
            ActionKind::Vacation => "/vacations",
        }
    }

    /// Record collection in the structured backend
    pub fn table(&self) -> &'static str {
        match self {
            ActionKind::Punch => "punch_queue",
            ActionKind::Vacation => "vacation_queue",
        }
    }

    /// Lookup key in the fallback key-value storage
    pub fn storage_key(&self) -> &'static str {
        match self {
            ActionKind::Punch => "offline-punch-queue",
            ActionKind::Vacation => "offline-vacation-queue",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Punch => "punch",
            ActionKind::Vacation => "vacation",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque record identifier, unique within one queue
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<i64> for ActionId {
    fn from(id: i64) -> Self {
        Self(id.to_string())
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Serialized form fields at submission time
///
/// Form encoding is lossy: every value is a string, and anything that is
/// not a string on the way in becomes an empty string.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FormPayload(BTreeMap<String, String>);

impl FormPayload {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a payload from string pairs
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Build a payload from loosely typed values, coercing non-strings to `""`
    pub fn from_values<K>(values: impl IntoIterator<Item = (K, serde_json::Value)>) -> Self
    where
        K: Into<String>,
    {
        Self(
            values
                .into_iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s,
                        _ => String::new(),
                    };
                    (k.into(), value)
                })
                .collect(),
        )
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    /// Field value, treating empty strings as absent
    pub fn non_empty(&self, field: &str) -> Option<&str> {
        self.get(field).map(str::trim).filter(|v| !v.is_empty())
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// A queued, not-yet-acknowledged user action
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingAction {
    /// Queue-unique identifier
    pub id: ActionId,
    /// Capture time, diagnostics only
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    /// Target endpoint and payload shape
    pub kind: ActionKind,
    /// Form fields as submitted
    pub payload: FormPayload,
}

/// Work-session transitions carried in the `action` field of a punch
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PunchAction {
    StartWork,
    EndWork,
    StartBreak,
    EndBreak,
    StartCompany,
    EndCompany,
}

impl PunchAction {
    pub const ALL: [PunchAction; 6] = [
        PunchAction::StartWork,
        PunchAction::EndWork,
        PunchAction::StartBreak,
        PunchAction::EndBreak,
        PunchAction::StartCompany,
        PunchAction::EndCompany,
    ];

    /// Parse the wire name; unknown actions yield `None`
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "start_work" => Some(PunchAction::StartWork),
            "end_work" => Some(PunchAction::EndWork),
            "start_break" => Some(PunchAction::StartBreak),
            "end_break" => Some(PunchAction::EndBreak),
            "start_company" => Some(PunchAction::StartCompany),
            "end_company" => Some(PunchAction::EndCompany),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PunchAction::StartWork => "start_work",
            PunchAction::EndWork => "end_work",
            PunchAction::StartBreak => "start_break",
            PunchAction::EndBreak => "end_break",
            PunchAction::StartCompany => "start_company",
            PunchAction::EndCompany => "end_company",
        }
    }
}

impl fmt::Display for PunchAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
