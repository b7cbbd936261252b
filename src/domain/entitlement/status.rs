//! Entitlement status as stored on the record.
//!
//! The well-known statuses get their own variants. Anything else the
//! provider reports (`paused`, `past_due`, `incomplete`, ...) is kept
//! verbatim in [`EntitlementStatus::Other`] so unfamiliar values never
//! break reconciliation.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Status column of an entitlement record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntitlementStatus {
    #[default]
    Active,
    Trialing,
    Cancelled,
    Expired,
    Unpaid,
    Unknown,
    /// Raw provider status with no dedicated variant.
    Other(String),
}

impl EntitlementStatus {
    /// Parses a stored or provider-reported status. Never fails.
    ///
    /// Matching ignores case and surrounding whitespace. Both spellings of
    /// cancellation map to [`EntitlementStatus::Cancelled`]; a blank value
    /// is [`EntitlementStatus::Unknown`]. Unmatched values are kept exactly
    /// as given.
    pub fn from_raw(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => EntitlementStatus::Active,
            "trialing" => EntitlementStatus::Trialing,
            "cancelled" | "canceled" => EntitlementStatus::Cancelled,
            "expired" => EntitlementStatus::Expired,
            "unpaid" => EntitlementStatus::Unpaid,
            "" | "unknown" => EntitlementStatus::Unknown,
            _ => EntitlementStatus::Other(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            EntitlementStatus::Active => "active",
            EntitlementStatus::Trialing => "trialing",
            EntitlementStatus::Cancelled => "cancelled",
            EntitlementStatus::Expired => "expired",
            EntitlementStatus::Unpaid => "unpaid",
            EntitlementStatus::Unknown => "unknown",
            EntitlementStatus::Other(raw) => raw,
        }
    }

    /// Statuses that withdraw Pro access regardless of plan.
    pub fn revokes_access(&self) -> bool {
        matches!(self, EntitlementStatus::Cancelled | EntitlementStatus::Expired)
    }
}

impl fmt::Display for EntitlementStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for EntitlementStatus {
    fn from(raw: String) -> Self {
        Self::from_raw(&raw)
    }
}

impl From<EntitlementStatus> for String {
    fn from(status: EntitlementStatus) -> Self {
        status.as_str().to_string()
    }
}
