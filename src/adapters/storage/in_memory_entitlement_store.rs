//! In-Memory Entitlement Store Adapter
//!
//! Keeps entitlement records in a map guarded by a single `RwLock`.
//! Used for tests and for development runs without a database.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::entitlement::{EntitlementPatch, EntitlementRecord, LicenseKey};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::EntitlementStore;

/// In-memory storage for entitlement records
#[derive(Debug, Clone, Default)]
pub struct InMemoryEntitlementStore {
    records: Arc<RwLock<HashMap<UserId, EntitlementRecord>>>,
}

impl InMemoryEntitlementStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as-is (useful for tests)
    pub async fn insert(&self, record: EntitlementRecord) {
        self.records
            .write()
            .await
            .insert(record.user_id.clone(), record);
    }

    /// Clear all stored data (useful for tests)
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }

    pub async fn count(&self) -> usize {
        self.records.read().await.len()
    }
}

/// Rejects a candidate whose unique columns are held by another user.
fn check_unique(
    records: &HashMap<UserId, EntitlementRecord>,
    candidate: &EntitlementRecord,
) -> Result<(), DomainError> {
    for other in records.values() {
        if other.user_id == candidate.user_id {
            continue;
        }
        if candidate.billing_customer_id.is_some()
            && other.billing_customer_id == candidate.billing_customer_id
        {
            return Err(DomainError::conflict(
                "billing_customer_id",
                "Billing customer is already linked to another user",
            ));
        }
        if candidate.license_key.is_some() && other.license_key == candidate.license_key {
            return Err(DomainError::conflict(
                "license_key",
                "License key is already issued to another user",
            ));
        }
    }
    Ok(())
}

#[async_trait]
impl EntitlementStore for InMemoryEntitlementStore {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<EntitlementRecord>, DomainError> {
        Ok(self.records.read().await.get(user_id).cloned())
    }

    async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        let records = self.records.read().await;
        Ok(records
            .values()
            .find(|r| r.billing_customer_id.as_deref() == Some(customer_id))
            .cloned())
    }

    async fn merge(
        &self,
        user_id: &UserId,
        patch: EntitlementPatch,
        now: Timestamp,
    ) -> Result<EntitlementRecord, DomainError> {
        let mut records = self.records.write().await;
        let base = records
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| EntitlementRecord::new(user_id.clone(), now));
        let merged = base.apply(patch, now);

        check_unique(&records, &merged)?;
        records.insert(user_id.clone(), merged.clone());
        Ok(merged)
    }

    async fn issue_license_key_if_absent(
        &self,
        user_id: &UserId,
        key: LicenseKey,
        activated_at: Timestamp,
    ) -> Result<EntitlementRecord, DomainError> {
        let mut records = self.records.write().await;
        let current = records.get(user_id).cloned().ok_or_else(|| {
            DomainError::new(ErrorCode::NotFound, format!("No entitlement for user {}", user_id))
        })?;

        if current.license_key.is_some() {
            return Ok(current);
        }

        let issued = EntitlementRecord {
            license_key: Some(key),
            activated_at: Some(activated_at),
            updated_at: activated_at,
            ..current
        };
        check_unique(&records, &issued)?;
        records.insert(user_id.clone(), issued.clone());
        Ok(issued)
    }

    async fn delete(&self, user_id: &UserId) -> Result<bool, DomainError> {
        Ok(self.records.write().await.remove(user_id).is_some())
    }

    async fn list(&self) -> Result<Vec<EntitlementRecord>, DomainError> {
        let mut all: Vec<_> = self.records.read().await.values().cloned().collect();
        all.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.user_id.cmp(&b.user_id))
        });
        Ok(all)
    }
}
