//! # Work-Session State Machine
//!
//! Client-side projection of the current work session: working, on break,
//! assigned to a company. Seeded from the server-rendered page and then
//! advanced by the same transitions whether the server confirmed them or
//! they were applied optimistically for a queued punch.
//!
//! ## States
//!
//! `Idle`, `Working`, `WorkingOnBreak`, `WorkingForCompany`. Break and
//! company assignment are independent flags layered on `Working`.
//!
//! ## Guards
//!
//! `start_break` needs a running session without a break, `end_break` a
//! running break. Anything else is ignored rather than treated as an error,
//! since a slightly stale UI can fire the same optimistic transition twice.

use crate::shared::{FormPayload, PunchAction};
use chrono::{Local, TimeZone};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Snapshot of the work session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientState {
    pub is_working: bool,
    pub on_break: bool,
    pub has_company: bool,
    pub company_name: Option<String>,
    /// Start of the current work segment (unix millis)
    pub started_at_ms: Option<i64>,
    /// Start of the running break (unix millis)
    pub break_started_at_ms: Option<i64>,
    /// Finished breaks of the current segment
    pub total_break_ms: i64,
}

/// Coarse state label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Working,
    WorkingOnBreak,
    WorkingForCompany,
}

impl ClientState {
    /// The idle state
    pub fn idle() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> SessionPhase {
        match (self.is_working, self.on_break, self.has_company) {
            (false, _, _) => SessionPhase::Idle,
            (true, true, _) => SessionPhase::WorkingOnBreak,
            (true, false, true) => SessionPhase::WorkingForCompany,
            (true, false, false) => SessionPhase::Working,
        }
    }

    /// Whether all structural invariants hold
    pub fn is_consistent(&self) -> bool {
        (!self.on_break || self.is_working)
            && (!self.has_company || self.is_working)
            && (self.started_at_ms.is_some() == self.is_working)
            && (self.break_started_at_ms.is_some() == self.on_break)
            && (self.company_name.is_none() || self.has_company)
            && self.total_break_ms >= 0
    }

    /// Break time including a running break
    pub fn break_ms(&self, now_ms: i64) -> i64 {
        let running = match (self.on_break, self.break_started_at_ms) {
            (true, Some(started)) => now_ms.saturating_sub(started).max(0),
            _ => 0,
        };
        self.total_break_ms.saturating_add(running)
    }

    /// Worked time of the current segment, breaks excluded
    pub fn elapsed_ms(&self, now_ms: i64) -> i64 {
        match self.started_at_ms {
            Some(started) => now_ms
                .saturating_sub(started)
                .saturating_sub(self.break_ms(now_ms))
                .max(0),
            None => 0,
        }
    }

    /// Local wall-clock start time, `HH:MM`
    pub fn start_label(&self) -> Option<String> {
        self.started_at_ms.map(format_clock)
    }

    /// Accumulated break, e.g. `15 Min.`
    pub fn break_label(&self, now_ms: i64) -> String {
        format!("{} Min.", self.break_ms(now_ms) / 60_000)
    }

    /// Worked time, `HH:MM`
    pub fn elapsed_label(&self, now_ms: i64) -> String {
        format_duration(self.elapsed_ms(now_ms))
    }
}

fn format_clock(ms: i64) -> String {
    match Local.timestamp_millis_opt(ms).single() {
        Some(time) => time.format("%H:%M").to_string(),
        None => "--:--".to_string(),
    }
}

/// `HH:MM` of a duration in milliseconds
pub fn format_duration(ms: i64) -> String {
    let minutes = ms.max(0) / 60_000;
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Company option from the punch form's select list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyOption {
    pub id: String,
    pub name: String,
}

/// Server-rendered initial state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSeed {
    #[serde(default)]
    pub working: bool,
    #[serde(default)]
    pub on_break: bool,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub started_at_ms: Option<i64>,
    #[serde(default)]
    pub break_started_at_ms: Option<i64>,
    #[serde(default)]
    pub total_break_ms: i64,
    #[serde(default)]
    pub companies: Vec<CompanyOption>,
}

impl SessionSeed {
    /// Read the `data-*` attributes of the session element
    ///
    /// Timestamps are unix millis or RFC 3339; `data-break-total` is in
    /// minutes; `data-companies` is `id:name` pairs separated by `;`.
    pub fn from_attributes(attributes: &HashMap<String, String>) -> Self {
        let get = |name: &str| {
            attributes
                .get(name)
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
        };
        let flag = |name: &str| matches!(get(name), Some("true" | "1" | "yes"));

        let companies = get("data-companies")
            .map(|raw| {
                raw.split(';')
                    .filter_map(|entry| {
                        let (id, name) = entry.split_once(':')?;
                        Some(CompanyOption {
                            id: id.trim().to_string(),
                            name: name.trim().to_string(),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            working: flag("data-working"),
            on_break: flag("data-on-break"),
            company_name: get("data-company-name").map(str::to_string),
            started_at_ms: get("data-started-at").and_then(parse_timestamp),
            break_started_at_ms: get("data-break-started-at").and_then(parse_timestamp),
            total_break_ms: get("data-break-total")
                .and_then(|v| v.parse::<i64>().ok())
                .map(|minutes| minutes.max(0).saturating_mul(60_000))
                .unwrap_or(0),
            companies,
        }
    }
}

fn parse_timestamp(value: &str) -> Option<i64> {
    if let Ok(ms) = value.parse::<i64>() {
        return Some(ms);
    }
    chrono::DateTime::parse_from_rfc3339(value)
        .map(|t| t.timestamp_millis())
        .ok()
}

/// Outcome of applying a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied,
    /// Guard failed; state unchanged
    Ignored,
}

/// Extra inputs of a transition taken from the submitted form
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionContext {
    pub company_id: Option<String>,
    pub company_name: Option<String>,
}

impl ActionContext {
    pub fn from_payload(payload: &FormPayload) -> Self {
        Self {
            company_id: payload.non_empty("company_id").map(str::to_string),
            company_name: payload.non_empty("company_name").map(str::to_string),
        }
    }
}

/// Single owner of the work-session state
#[derive(Debug, Clone, Default)]
pub struct SessionMachine {
    state: ClientState,
    companies: Vec<CompanyOption>,
}

impl SessionMachine {
    /// Start from the server-rendered seed, normalizing inconsistent input
    pub fn seed(seed: SessionSeed, now_ms: i64) -> Self {
        let state = if seed.working {
            let on_break = seed.on_break;
            let company_name = seed.company_name.filter(|n| !n.trim().is_empty());
            ClientState {
                is_working: true,
                on_break,
                has_company: company_name.is_some(),
                company_name,
                started_at_ms: Some(seed.started_at_ms.unwrap_or(now_ms)),
                break_started_at_ms: if on_break {
                    Some(seed.break_started_at_ms.unwrap_or(now_ms))
                } else {
                    None
                },
                total_break_ms: seed.total_break_ms.max(0),
            }
        } else {
            ClientState::idle()
        };

        tracing::debug!("Session seeded as {:?}", state.phase());
        Self {
            state,
            companies: seed.companies,
        }
    }

    /// Immutable copy of the current state
    pub fn snapshot(&self) -> ClientState {
        self.state.clone()
    }

    pub fn state(&self) -> &ClientState {
        &self.state
    }

    fn resolve_company(&self, context: &ActionContext) -> Option<String> {
        if let Some(name) = &context.company_name {
            return Some(name.clone());
        }
        let id = context.company_id.as_deref()?;
        self.companies
            .iter()
            .find(|option| option.id == id)
            .map(|option| option.name.clone())
    }

    /// Apply one transition at `now_ms`
    pub fn apply(&mut self, action: PunchAction, context: &ActionContext, now_ms: i64) -> Transition {
        let state = &mut self.state;

        match action {
            PunchAction::StartWork => {
                *state = ClientState {
                    is_working: true,
                    started_at_ms: Some(now_ms),
                    ..ClientState::idle()
                };
            }
            PunchAction::EndWork => {
                *state = ClientState::idle();
            }
            PunchAction::StartBreak => {
                if !state.is_working || state.on_break {
                    tracing::debug!("Ignoring start_break in {:?}", state.phase());
                    return Transition::Ignored;
                }
                state.on_break = true;
                state.break_started_at_ms = Some(now_ms);
            }
            PunchAction::EndBreak => {
                if !state.is_working || !state.on_break {
                    tracing::debug!("Ignoring end_break in {:?}", state.phase());
                    return Transition::Ignored;
                }
                let started = state.break_started_at_ms.take().unwrap_or(now_ms);
                state.total_break_ms = state
                    .total_break_ms
                    .saturating_add(now_ms.saturating_sub(started).max(0));
                state.on_break = false;
            }
            PunchAction::StartCompany => {
                let company_name = self.resolve_company(context);
                self.state = ClientState {
                    is_working: true,
                    has_company: true,
                    company_name,
                    started_at_ms: Some(now_ms),
                    ..ClientState::idle()
                };
            }
            PunchAction::EndCompany => {
                *state = ClientState {
                    is_working: true,
                    started_at_ms: Some(now_ms),
                    ..ClientState::idle()
                };
            }
        }

        Transition::Applied
    }
}
