//! VerifyLicenseHandler - Query handler checking a presented key.

use std::sync::Arc;

use crate::domain::entitlement::EntitlementError;
use crate::domain::foundation::UserId;
use crate::ports::EntitlementStore;

/// Query to verify a key presented by the extension.
#[derive(Debug, Clone)]
pub struct VerifyLicenseQuery {
    pub user_id: UserId,
    pub license_key: String,
}

/// Result of verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyLicenseResult {
    pub valid: bool,
    pub is_pro: bool,
}

/// Handler for license verification.
pub struct VerifyLicenseHandler {
    store: Arc<dyn EntitlementStore>,
}

impl VerifyLicenseHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        query: VerifyLicenseQuery,
    ) -> Result<VerifyLicenseResult, EntitlementError> {
        if query.license_key.trim().is_empty() {
            return Err(EntitlementError::validation("licenseKey", "cannot be empty"));
        }

        let record = self.store.find_by_user(&query.user_id).await?;

        let valid = record.map_or(false, |r| {
            r.is_entitled()
                && r.license_key
                    .as_ref()
                    .map_or(false, |key| key.as_str() == query.license_key)
        });

        Ok(VerifyLicenseResult { valid, is_pro: valid })
    }
}
