//! Administrative queries and cleanup, exposed only in development.

use std::sync::Arc;

use crate::domain::entitlement::{EntitlementError, EntitlementRecord};
use crate::domain::foundation::UserId;
use crate::ports::EntitlementStore;

/// Query listing every record.
#[derive(Debug, Clone, Default)]
pub struct ListEntitlementsQuery;

/// Result of listing.
#[derive(Debug, Clone)]
pub struct ListEntitlementsResult {
    pub records: Vec<EntitlementRecord>,
}

pub struct ListEntitlementsHandler {
    store: Arc<dyn EntitlementStore>,
}

impl ListEntitlementsHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    pub async fn handle(
        &self,
        _query: ListEntitlementsQuery,
    ) -> Result<ListEntitlementsResult, EntitlementError> {
        let records = self.store.list().await?;
        Ok(ListEntitlementsResult { records })
    }
}

/// Command removing one user's record.
#[derive(Debug, Clone)]
pub struct DeleteEntitlementCommand {
    pub user_id: UserId,
}

pub struct DeleteEntitlementHandler {
    store: Arc<dyn EntitlementStore>,
}

impl DeleteEntitlementHandler {
    pub fn new(store: Arc<dyn EntitlementStore>) -> Self {
        Self { store }
    }

    /// `NotFound` when the user had no record.
    pub async fn handle(&self, cmd: DeleteEntitlementCommand) -> Result<(), EntitlementError> {
        if self.store.delete(&cmd.user_id).await? {
            tracing::warn!(user_id = %cmd.user_id, "Entitlement record deleted");
            Ok(())
        } else {
            Err(EntitlementError::not_found("No record for this user"))
        }
    }
}
