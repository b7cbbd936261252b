//! Partial updates to an entitlement record.

use super::{EntitlementStatus, LicenseKey, Plan};
use crate::domain::foundation::Timestamp;

/// Tri-state update for a nullable field.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldPatch<T> {
    /// Keep the stored value.
    #[default]
    Unchanged,
    /// Overwrite with a value.
    Set(T),
    /// Explicit null.
    Clear,
}

impl<T> FieldPatch<T> {
    pub fn apply_to(self, target: &mut Option<T>) {
        match self {
            FieldPatch::Unchanged => {}
            FieldPatch::Set(value) => *target = Some(value),
            FieldPatch::Clear => *target = None,
        }
    }

    pub fn is_unchanged(&self) -> bool {
        matches!(self, FieldPatch::Unchanged)
    }

    /// `Some` becomes `Set`, `None` stays `Unchanged`.
    pub fn set_if_some(value: Option<T>) -> Self {
        value.map_or(FieldPatch::Unchanged, FieldPatch::Set)
    }

    pub fn as_set(&self) -> Option<&T> {
        match self {
            FieldPatch::Set(value) => Some(value),
            _ => None,
        }
    }
}

/// A partial merge over [`super::EntitlementRecord`].
///
/// `plan` and `status` are never null, so `None` there means unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntitlementPatch {
    pub billing_customer_id: FieldPatch<String>,
    pub billing_subscription_id: FieldPatch<String>,
    pub plan: Option<Plan>,
    pub status: Option<EntitlementStatus>,
    pub license_key: FieldPatch<LicenseKey>,
    pub activated_at: FieldPatch<Timestamp>,
    pub promotion_code: FieldPatch<String>,
}

impl EntitlementPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_customer_id(mut self, customer_id: impl Into<String>) -> Self {
        self.billing_customer_id = FieldPatch::Set(customer_id.into());
        self
    }

    pub fn with_plan(mut self, plan: Plan, status: EntitlementStatus) -> Self {
        self.plan = Some(plan);
        self.status = Some(status);
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Removes a pending license issuance from the patch.
    ///
    /// Returns the key and activation time when the patch was going to set
    /// one, so the caller can route it through the store's check-then-set.
    pub fn take_license_issuance(&mut self) -> Option<(LicenseKey, Timestamp)> {
        match std::mem::take(&mut self.license_key) {
            FieldPatch::Set(key) => {
                let activated_at = match std::mem::take(&mut self.activated_at) {
                    FieldPatch::Set(at) => at,
                    _ => Timestamp::now(),
                };
                Some((key, activated_at))
            }
            other => {
                self.license_key = other;
                None
            }
        }
    }
}
