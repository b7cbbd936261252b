//! Entitlement reconciliation.
//!
//! Maps a billing signal (webhook or poll result) plus the stored record
//! onto the next record. Deterministic apart from the key generator and
//! idempotent: feeding the same signal twice changes nothing but
//! `updated_at`.

use super::{
    EntitlementPatch, EntitlementRecord, EntitlementStatus, FieldPatch, LicenseKeyGenerator, Plan,
};
use crate::domain::foundation::{Timestamp, UserId};

/// What the provider told us about a subscription.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BillingSignal {
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    /// Raw provider status, e.g. `active`, `canceled`, `past_due`.
    pub status: String,
    pub promotion_code: Option<String>,
}

impl BillingSignal {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            ..Self::default()
        }
    }

    pub fn with_customer(mut self, customer_id: impl Into<String>) -> Self {
        self.customer_id = Some(customer_id.into());
        self
    }

    pub fn with_subscription(mut self, subscription_id: impl Into<String>) -> Self {
        self.subscription_id = Some(subscription_id.into());
        self
    }

    pub fn with_promotion_code(mut self, code: Option<String>) -> Self {
        self.promotion_code = code;
        self
    }
}

/// How a raw provider status lands on the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusMapping {
    /// `active`, `trialing`
    Grant,
    /// `canceled`, `cancelled`, `unpaid`
    Revoke,
    /// Anything else, stored verbatim on a basic plan.
    PassThrough(EntitlementStatus),
}

impl StatusMapping {
    pub fn of(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" | "trialing" => StatusMapping::Grant,
            "canceled" | "cancelled" | "unpaid" => StatusMapping::Revoke,
            _ => StatusMapping::PassThrough(EntitlementStatus::from_raw(raw)),
        }
    }
}

/// Computes the patch that moves `existing` to the reconciled state.
///
/// A license key is generated only when the signal grants Pro and the
/// record holds no key yet. Callers persisting the patch should pull the
/// issuance out with [`EntitlementPatch::take_license_issuance`] and hand it
/// to the store's check-then-set.
pub fn plan_patch(
    existing: Option<&EntitlementRecord>,
    signal: &BillingSignal,
    keys: &dyn LicenseKeyGenerator,
    now: Timestamp,
) -> EntitlementPatch {
    let mut patch = EntitlementPatch {
        billing_customer_id: FieldPatch::set_if_some(signal.customer_id.clone()),
        promotion_code: FieldPatch::set_if_some(signal.promotion_code.clone()),
        ..EntitlementPatch::default()
    };

    match StatusMapping::of(&signal.status) {
        StatusMapping::Grant => {
            patch.plan = Some(Plan::Pro);
            patch.status = Some(EntitlementStatus::Active);
            patch.billing_subscription_id = FieldPatch::set_if_some(signal.subscription_id.clone());

            let holds_key = existing.map_or(false, |r| r.license_key.is_some());
            if !holds_key {
                patch.license_key = FieldPatch::Set(keys.generate(now));
                patch.activated_at = FieldPatch::Set(now);
            }
        }
        StatusMapping::Revoke => {
            patch.plan = Some(Plan::Basic);
            patch.status = Some(EntitlementStatus::Cancelled);
            patch.billing_subscription_id = FieldPatch::Clear;
        }
        StatusMapping::PassThrough(status) => {
            tracing::warn!(
                status = %signal.status,
                "Unrecognized subscription status, downgrading to basic"
            );
            patch.plan = Some(Plan::Basic);
            patch.status = Some(status);
            patch.billing_subscription_id = FieldPatch::set_if_some(signal.subscription_id.clone());
        }
    }

    patch
}

/// Reconciles in process: plan the patch and apply it.
pub fn reconcile(
    existing: Option<EntitlementRecord>,
    signal: &BillingSignal,
    user_id: &UserId,
    keys: &dyn LicenseKeyGenerator,
    now: Timestamp,
) -> EntitlementRecord {
    let patch = plan_patch(existing.as_ref(), signal, keys, now);
    let base = existing.unwrap_or_else(|| EntitlementRecord::new(user_id.clone(), now));
    base.apply(patch, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entitlement::{EntitlementState, LicenseKey, RandomLicenseKeyGenerator};
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Deterministic keys: dd_<millis>_<counter>.
    struct CountingKeys(AtomicU32);

    impl CountingKeys {
        fn new() -> Self {
            Self(AtomicU32::new(0))
        }

        fn issued(&self) -> u32 {
            self.0.load(Ordering::SeqCst)
        }
    }

    impl LicenseKeyGenerator for CountingKeys {
        fn generate(&self, now: Timestamp) -> LicenseKey {
            let n = self.0.fetch_add(1, Ordering::SeqCst);
            LicenseKey::compose(now, &format!("k{}", n))
        }
    }

    fn user() -> UserId {
        UserId::new("user-42").unwrap()
    }

    fn ts(secs: i64) -> Timestamp {
        Timestamp::from_unix_secs(secs).unwrap()
    }

    fn pro_record() -> EntitlementRecord {
        let keys = CountingKeys::new();
        let signal = BillingSignal::new("active")
            .with_customer("cus_1")
            .with_subscription("sub_1");
        reconcile(None, &signal, &user(), &keys, ts(1_000))
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Status Mapping
    // ════════════════════════════════════════════════════════════════════════════

    #[test]
    fn trialing_on_no_record_activates_pro_with_key() {
        let keys = CountingKeys::new();
        let record = reconcile(None, &BillingSignal::new("trialing"), &user(), &keys, ts(1_000));

        assert_eq!(record.plan, Plan::Pro);
        assert_eq!(record.status, EntitlementStatus::Active);
        assert!(record.license_key.is_some());
        assert_eq!(record.activated_at, Some(ts(1_000)));
        assert_eq!(record.created_at, ts(1_000));
        assert!(record.is_entitled());
    }

    #[test]
    fn active_records_billing_identifiers() {
        let record = pro_record();
        assert_eq!(record.billing_customer_id.as_deref(), Some("cus_1"));
        assert_eq!(record.billing_subscription_id.as_deref(), Some("sub_1"));
        assert_eq!(record.state(), EntitlementState::ProActive);
    }

    #[test]
    fn canceled_on_pro_record_downgrades_and_keeps_key() {
        let before = pro_record();
        let keys = CountingKeys::new();
        let after = reconcile(
            Some(before.clone()),
            &BillingSignal::new("canceled").with_customer("cus_1"),
            &user(),
            &keys,
            ts(2_000),
        );

        assert_eq!(after.plan, Plan::Basic);
        assert_eq!(after.status, EntitlementStatus::Cancelled);
        assert!(after.billing_subscription_id.is_none());
        assert_eq!(after.license_key, before.license_key);
        assert_eq!(after.billing_customer_id.as_deref(), Some("cus_1"));
        assert!(!after.is_entitled());
        assert_eq!(keys.issued(), 0);
    }

    #[test]
    fn unpaid_is_treated_as_cancellation() {
        let keys = CountingKeys::new();
        let after = reconcile(Some(pro_record()), &BillingSignal::new("unpaid"), &user(), &keys, ts(2_000));
        assert_eq!(after.status, EntitlementStatus::Cancelled);
        assert_eq!(after.state(), EntitlementState::Cancelled);
    }

    #[test]
    fn paused_passes_through_on_basic() {
        let keys = CountingKeys::new();
        let after = reconcile(Some(pro_record()), &BillingSignal::new("paused"), &user(), &keys, ts(2_000));

        assert_eq!(after.plan, Plan::Basic);
        assert_eq!(after.status.as_str(), "paused");
        assert_eq!(after.state(), EntitlementState::UnknownStatus);
        assert!(after.license_key.is_some());
    }

    #[test]
    fn pass_through_keeps_provider_spelling() {
        let keys = CountingKeys::new();
        let after = reconcile(None, &BillingSignal::new("Incomplete_Expired"), &user(), &keys, ts(2_000));

        assert_eq!(after.status, EntitlementStatus::Other("Incomplete_Expired".into()));
        assert_eq!(after.plan, Plan::Basic);
    }

    #[test]
    fn renewal_after_cancellation_reuses_key() {
        let original = pro_record();
        let keys = CountingKeys::new();
        let cancelled = reconcile(Some(original.clone()), &BillingSignal::new("canceled"), &user(), &keys, ts(2_000));
        let renewed = reconcile(
            Some(cancelled),
            &BillingSignal::new("active").with_subscription("sub_2"),
            &user(),
            &keys,
            ts(3_000),
        );

        assert_eq!(renewed.plan, Plan::Pro);
        assert_eq!(renewed.license_key, original.license_key);
        assert_eq!(renewed.activated_at, original.activated_at);
        assert_eq!(renewed.billing_subscription_id.as_deref(), Some("sub_2"));
        assert_eq!(keys.issued(), 0);
    }

    #[test]
    fn promotion_code_is_captured_and_not_erased_later() {
        let keys = CountingKeys::new();
        let signal = BillingSignal::new("active").with_promotion_code(Some("LAUNCH50".into()));
        let first = reconcile(None, &signal, &user(), &keys, ts(1_000));
        let second = reconcile(Some(first), &BillingSignal::new("active"), &user(), &keys, ts(2_000));

        assert_eq!(second.promotion_code.as_deref(), Some("LAUNCH50"));
    }

    #[test]
    fn status_is_matched_case_insensitively() {
        assert_eq!(StatusMapping::of("ACTIVE"), StatusMapping::Grant);
        assert_eq!(StatusMapping::of(" Canceled "), StatusMapping::Revoke);
    }

    #[test]
    fn plan_patch_skips_issuance_when_key_held() {
        let keys = CountingKeys::new();
        let patch = plan_patch(Some(&pro_record()), &BillingSignal::new("active"), &keys, ts(5));
        assert!(patch.license_key.is_unchanged());
        assert!(patch.activated_at.is_unchanged());
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Properties
    // ════════════════════════════════════════════════════════════════════════════

    fn status_strategy() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("active".to_string()),
            Just("trialing".to_string()),
            Just("canceled".to_string()),
            Just("cancelled".to_string()),
            Just("unpaid".to_string()),
            Just("past_due".to_string()),
            Just("paused".to_string()),
            Just("incomplete".to_string()),
            "[a-z_]{0,12}",
        ]
    }

    fn signal_strategy() -> impl Strategy<Value = BillingSignal> {
        (
            status_strategy(),
            proptest::option::of("cus_[a-z0-9]{4}"),
            proptest::option::of("sub_[a-z0-9]{4}"),
            proptest::option::of("[A-Z0-9]{3,8}"),
        )
            .prop_map(|(status, customer_id, subscription_id, promotion_code)| BillingSignal {
                customer_id,
                subscription_id,
                status,
                promotion_code,
            })
    }

    proptest! {
        #[test]
        fn reconcile_is_idempotent(signal in signal_strategy(), start_pro in any::<bool>()) {
            let existing = if start_pro { Some(pro_record()) } else { None };
            let keys = RandomLicenseKeyGenerator;

            let once = reconcile(existing, &signal, &user(), &keys, ts(10_000));
            let twice = reconcile(Some(once.clone()), &signal, &user(), &keys, ts(20_000));

            prop_assert!(once.same_state_as(&twice));
        }

        #[test]
        fn license_key_never_changes_once_issued(
            signals in proptest::collection::vec(signal_strategy(), 1..12)
        ) {
            let keys = RandomLicenseKeyGenerator;
            let mut record: Option<EntitlementRecord> = None;
            let mut first_key: Option<LicenseKey> = None;

            for (i, signal) in signals.iter().enumerate() {
                let next = reconcile(record.take(), signal, &user(), &keys, ts(1_000 + i as i64));
                if let Some(key) = &first_key {
                    prop_assert_eq!(next.license_key.as_ref(), Some(key));
                } else {
                    first_key = next.license_key.clone();
                }
                record = Some(next);
            }
        }

        #[test]
        fn pro_plan_implies_active_status(signal in signal_strategy()) {
            let keys = RandomLicenseKeyGenerator;
            let record = reconcile(Some(pro_record()), &signal, &user(), &keys, ts(9_000));
            if record.plan == Plan::Pro {
                prop_assert!(matches!(
                    record.status,
                    EntitlementStatus::Active | EntitlementStatus::Trialing
                ));
            }
        }
    }
}
