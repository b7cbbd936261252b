//! The per-user entitlement record.

use serde::{Deserialize, Serialize};

use super::{EntitlementPatch, EntitlementState, EntitlementStatus, LicenseKey, Plan};
use crate::domain::foundation::{Timestamp, UserId};

/// One row per user. Keyed by `user_id`.
///
/// `billing_customer_id` and `license_key` are unique across records when
/// present; stores enforce that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntitlementRecord {
    pub user_id: UserId,
    pub billing_customer_id: Option<String>,
    pub billing_subscription_id: Option<String>,
    pub plan: Plan,
    pub status: EntitlementStatus,
    pub license_key: Option<LicenseKey>,
    pub activated_at: Option<Timestamp>,
    pub promotion_code: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl EntitlementRecord {
    /// Fresh record on first reference to a user: basic, active, no key.
    pub fn new(user_id: UserId, now: Timestamp) -> Self {
        Self {
            user_id,
            billing_customer_id: None,
            billing_subscription_id: None,
            plan: Plan::Basic,
            status: EntitlementStatus::Active,
            license_key: None,
            activated_at: None,
            promotion_code: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Pro access: plan is pro and the status has not revoked it.
    pub fn is_entitled(&self) -> bool {
        self.plan.is_pro() && !self.status.revokes_access()
    }

    pub fn state(&self) -> EntitlementState {
        EntitlementState::of(self)
    }

    /// Key to hand out, only while the user is entitled.
    pub fn active_license_key(&self) -> Option<&LicenseKey> {
        if self.is_entitled() {
            self.license_key.as_ref()
        } else {
            None
        }
    }

    /// Partial merge. Unchanged fields keep their value; `updated_at` becomes `now`.
    pub fn apply(mut self, patch: EntitlementPatch, now: Timestamp) -> Self {
        patch.billing_customer_id.apply_to(&mut self.billing_customer_id);
        patch
            .billing_subscription_id
            .apply_to(&mut self.billing_subscription_id);
        if let Some(plan) = patch.plan {
            self.plan = plan;
        }
        if let Some(status) = patch.status {
            self.status = status;
        }
        patch.license_key.apply_to(&mut self.license_key);
        patch.activated_at.apply_to(&mut self.activated_at);
        patch.promotion_code.apply_to(&mut self.promotion_code);
        self.updated_at = now;
        self
    }

    /// Equality ignoring `updated_at`.
    pub fn same_state_as(&self, other: &Self) -> bool {
        Self {
            updated_at: other.updated_at,
            ..self.clone()
        } == *other
    }
}
