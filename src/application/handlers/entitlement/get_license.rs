//! GetLicenseHandler - Query handler returning an entitled user's key.

use std::sync::Arc;

use crate::domain::entitlement::{EntitlementError, LicenseKey};
use crate::domain::foundation::UserId;
use crate::ports::EntitlementStore;

/// Query for a user's license key.
#[derive(Debug, Clone)]
pub struct GetLicenseQuery {
    pub user_id: UserId,
}

/// Result of license lookup.
#[derive(Debug, Clone)]
pub struct GetLicenseResult {
    pub license_key: LicenseKey,
}

/// Handler for license lookup.
///
/// Only entitled users get a key back; a cancelled user keeps the key on
/// record but receives `NotFound`.
pub struct GetLicenseHandler {
    store: Arc<dyn EntitlementStore>,
}

impl GetLicenseHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, query: GetLicenseQuery) -> Result<GetLicenseResult, EntitlementError> {
        let record = self.store.find_by_user(&query.user_id).await?;

        let license_key = record
            .as_ref()
            .and_then(|r| r.active_license_key())
            .cloned()
            .ok_or_else(|| {
                tracing::debug!(user_id = %query.user_id, "No valid license for user");
                EntitlementError::not_found("No license found for this user")
            })?;

        Ok(GetLicenseResult { license_key })
    }
}
