//! ReconcileEntitlementHandler - Command handler applying a billing signal.
//!
//! Plans the patch in the domain, persists everything except the license
//! key through `merge`, then routes any key issuance through the store's
//! check-then-set so concurrent grants never overwrite a key.

use std::sync::Arc;

use crate::domain::entitlement::{
    plan_patch, BillingSignal, EntitlementError, EntitlementRecord, LicenseKeyGenerator,
};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::EntitlementStore;

/// Command to reconcile one user's entitlement.
#[derive(Debug, Clone)]
pub struct ReconcileEntitlementCommand {
    pub user_id: UserId,
    pub signal: BillingSignal,
}

/// Result of reconciliation.
#[derive(Debug, Clone)]
pub struct ReconcileEntitlementResult {
    /// The record as persisted.
    pub record: EntitlementRecord,
    /// Whether this call issued the stored key.
    pub license_issued: bool,
}

/// Handler for reconciling entitlement against a billing signal.
#[derive(Clone)]
pub struct ReconcileEntitlementHandler {
    store: Arc<dyn EntitlementStore>,
    keys: Arc<dyn LicenseKeyGenerator>,
}

impl ReconcileEntitlementHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, keys: Arc<dyn LicenseKeyGenerator>) -> Self {
        Self { store, keys }
    }

    pub async fn handle(
        &self,
        cmd: ReconcileEntitlementCommand,
    ) -> Result<ReconcileEntitlementResult, EntitlementError> {
        let now = Timestamp::now();
        let existing = self.store.find_by_user(&cmd.user_id).await?;

        let mut patch = plan_patch(existing.as_ref(), &cmd.signal, self.keys.as_ref(), now);
        let issuance = patch.take_license_issuance();

        let mut record = self.store.merge(&cmd.user_id, patch, now).await?;

        let mut license_issued = false;
        if let Some((key, activated_at)) = issuance {
            record = self
                .store
                .issue_license_key_if_absent(&cmd.user_id, key.clone(), activated_at)
                .await?;
            license_issued = record.license_key.as_ref() == Some(&key);
        }

        tracing::info!(
            user_id = %cmd.user_id,
            status = %cmd.signal.status,
            plan = record.plan.as_str(),
            license_issued,
            "Entitlement reconciled"
        );

        Ok(ReconcileEntitlementResult {
            record,
            license_issued,
        })
    }
}
