//! Entitlement store port.
//!
//! One record per user, keyed by `user_id`. Adapters must enforce that
//! `billing_customer_id` and `license_key` are unique when present and
//! report violations as `ErrorCode::Conflict`.
//!
//! # Example
//!
//! ```ignore
//! async fn attach_customer(
//!     store: &dyn EntitlementStore,
//!     user_id: &UserId,
//!     customer_id: &str,
//! ) -> Result<EntitlementRecord, DomainError> {
//!     let patch = EntitlementPatch::new().with_customer_id(customer_id);
//!     store.merge(user_id, patch, Timestamp::now()).await
//! }
//! ```

use crate::domain::entitlement::{EntitlementPatch, EntitlementRecord, LicenseKey};
use crate::domain::foundation::{DomainError, Timestamp, UserId};
use async_trait::async_trait;

/// Persistence port for entitlement records.
#[async_trait]
pub trait EntitlementStore: Send + Sync {
    /// Find the record for a user. `None` if the user was never referenced.
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<EntitlementRecord>, DomainError>;

    /// Find the record owning a billing customer id.
    async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError>;

    /// Upsert with partial-merge semantics.
    ///
    /// Creates a default record (basic, active, no key) when the user has
    /// none, then applies `patch`. Fields the patch leaves unchanged keep
    /// their stored value. `updated_at` is set to `now`.
    ///
    /// # Errors
    ///
    /// - `Conflict` if the merged customer id or license key belongs to another user
    /// - `DatabaseError` on persistence failure
    async fn merge(
        &self,
        user_id: &UserId,
        patch: EntitlementPatch,
        now: Timestamp,
    ) -> Result<EntitlementRecord, DomainError>;

    /// Check-then-set license issuance.
    ///
    /// Stores `key` and `activated_at` only if the record holds no key yet,
    /// atomically with respect to other writers. Returns the record as
    /// persisted afterwards, whose key is the winner of any race.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the user has no record
    /// - `Conflict` if `key` is already held by another user
    async fn issue_license_key_if_absent(
        &self,
        user_id: &UserId,
        key: LicenseKey,
        activated_at: Timestamp,
    ) -> Result<EntitlementRecord, DomainError>;

    /// Administrative removal. Returns whether a record existed.
    async fn delete(&self, user_id: &UserId) -> Result<bool, DomainError>;

    /// Every record, oldest first. Used by the development debug surface.
    async fn list(&self) -> Result<Vec<EntitlementRecord>, DomainError>;
}
