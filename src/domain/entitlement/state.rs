//! Derived per-user entitlement state.
//!
//! ```text
//!   Basic ──active/trialing──▶ ProActive
//!     ▲                          │  ▲
//!     │                canceled  │  │ renewal
//!   paused, past_due ...         ▼  │
//!   (UnknownStatus)  ◀──────── Cancelled
//! ```
//!
//! There is no terminal state. Every transition comes from a billing
//! signal; nothing here moves on its own.

use serde::Serialize;

use super::{EntitlementRecord, EntitlementStatus, Plan};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementState {
    Basic,
    ProActive,
    ProTrialing,
    Cancelled,
    UnknownStatus,
}

impl EntitlementState {
    pub fn of(record: &EntitlementRecord) -> Self {
        match (&record.plan, &record.status) {
            (Plan::Pro, EntitlementStatus::Active) => EntitlementState::ProActive,
            (Plan::Pro, EntitlementStatus::Trialing) => EntitlementState::ProTrialing,
            (_, EntitlementStatus::Cancelled) | (_, EntitlementStatus::Unpaid) => {
                EntitlementState::Cancelled
            }
            (Plan::Basic, EntitlementStatus::Active) => EntitlementState::Basic,
            _ => EntitlementState::UnknownStatus,
        }
    }

    pub fn grants_pro(&self) -> bool {
        matches!(self, EntitlementState::ProActive | EntitlementState::ProTrialing)
    }
}
