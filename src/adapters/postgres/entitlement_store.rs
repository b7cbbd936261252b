//! PostgreSQL implementation of EntitlementStore.
//!
//! Records live in the `licenses` table (see `migrations/`). Merges run in a
//! transaction that first ensures the row exists, then locks it with
//! `SELECT ... FOR UPDATE` before applying the patch, so concurrent writers
//! for the same user serialize.

use crate::domain::entitlement::{
    EntitlementPatch, EntitlementRecord, EntitlementStatus, LicenseKey, Plan,
};
use crate::domain::foundation::{DomainError, ErrorCode, Timestamp, UserId};
use crate::ports::EntitlementStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

const SELECT_COLUMNS: &str = "user_id, billing_customer_id, billing_subscription_id, plan, \
     status, license_key, activated_at, promotion_code, created_at, updated_at";

/// PostgreSQL implementation of the EntitlementStore port.
pub struct PostgresEntitlementStore {
    pool: PgPool,
}

impl PostgresEntitlementStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Database row representation of an entitlement record.
#[derive(Debug, sqlx::FromRow)]
struct LicenseRow {
    user_id: String,
    billing_customer_id: Option<String>,
    billing_subscription_id: Option<String>,
    plan: String,
    status: String,
    license_key: Option<String>,
    activated_at: Option<DateTime<Utc>>,
    promotion_code: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<LicenseRow> for EntitlementRecord {
    type Error = DomainError;

    fn try_from(row: LicenseRow) -> Result<Self, Self::Error> {
        let user_id = UserId::new(row.user_id).map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid user_id: {}", e))
        })?;
        let plan: Plan = row.plan.parse().map_err(|e| {
            DomainError::new(ErrorCode::DatabaseError, format!("Invalid plan value: {}", e))
        })?;
        let license_key = row
            .license_key
            .map(LicenseKey::new)
            .transpose()
            .map_err(|e| {
                DomainError::new(ErrorCode::DatabaseError, format!("Invalid license_key: {}", e))
            })?;

        Ok(EntitlementRecord {
            user_id,
            billing_customer_id: row.billing_customer_id,
            billing_subscription_id: row.billing_subscription_id,
            plan,
            status: EntitlementStatus::from_raw(&row.status),
            license_key,
            activated_at: row.activated_at.map(Timestamp::from_datetime),
            promotion_code: row.promotion_code,
            created_at: Timestamp::from_datetime(row.created_at),
            updated_at: Timestamp::from_datetime(row.updated_at),
        })
    }
}

fn read_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| DomainError::database(format!("Failed to {}: {}", context, e))
}

/// Maps unique violations onto `Conflict`.
fn write_error(context: &'static str) -> impl Fn(sqlx::Error) -> DomainError {
    move |e| {
        if let sqlx::Error::Database(db_err) = &e {
            match db_err.constraint() {
                Some("licenses_billing_customer_id_key") => {
                    return DomainError::conflict(
                        "billing_customer_id",
                        "Billing customer is already linked to another user",
                    );
                }
                Some("licenses_license_key_key") => {
                    return DomainError::conflict(
                        "license_key",
                        "License key is already issued to another user",
                    );
                }
                _ => {}
            }
        }
        DomainError::database(format!("Failed to {}: {}", context, e))
    }
}

#[async_trait]
impl EntitlementStore for PostgresEntitlementStore {
    async fn find_by_user(&self, user_id: &UserId) -> Result<Option<EntitlementRecord>, DomainError> {
        let row: Option<LicenseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM licenses WHERE user_id = $1",
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error("find entitlement"))?;

        row.map(EntitlementRecord::try_from).transpose()
    }

    async fn find_by_customer(
        &self,
        customer_id: &str,
    ) -> Result<Option<EntitlementRecord>, DomainError> {
        let row: Option<LicenseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM licenses WHERE billing_customer_id = $1",
            SELECT_COLUMNS
        ))
        .bind(customer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(read_error("find entitlement by customer"))?;

        row.map(EntitlementRecord::try_from).transpose()
    }

    async fn merge(
        &self,
        user_id: &UserId,
        patch: EntitlementPatch,
        now: Timestamp,
    ) -> Result<EntitlementRecord, DomainError> {
        let mut tx = self.pool.begin().await.map_err(read_error("begin transaction"))?;

        sqlx::query(
            r#"
            INSERT INTO licenses (user_id, plan, status, created_at, updated_at)
            VALUES ($1, 'basic', 'active', $2, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_str())
        .bind(now.as_datetime())
        .execute(&mut *tx)
        .await
        .map_err(write_error("create entitlement"))?;

        let row: LicenseRow = sqlx::query_as(&format!(
            "SELECT {} FROM licenses WHERE user_id = $1 FOR UPDATE",
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(read_error("lock entitlement"))?;

        let merged = EntitlementRecord::try_from(row)?.apply(patch, now);

        let row: LicenseRow = sqlx::query_as(&format!(
            r#"
            UPDATE licenses SET
                billing_customer_id = $2,
                billing_subscription_id = $3,
                plan = $4,
                status = $5,
                license_key = $6,
                activated_at = $7,
                promotion_code = $8,
                updated_at = $9
            WHERE user_id = $1
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .bind(&merged.billing_customer_id)
        .bind(&merged.billing_subscription_id)
        .bind(merged.plan.as_str())
        .bind(merged.status.as_str())
        .bind(merged.license_key.as_ref().map(LicenseKey::as_str))
        .bind(merged.activated_at.map(|t| *t.as_datetime()))
        .bind(&merged.promotion_code)
        .bind(merged.updated_at.as_datetime())
        .fetch_one(&mut *tx)
        .await
        .map_err(write_error("update entitlement"))?;

        tx.commit().await.map_err(write_error("commit entitlement"))?;

        EntitlementRecord::try_from(row)
    }

    async fn issue_license_key_if_absent(
        &self,
        user_id: &UserId,
        key: LicenseKey,
        activated_at: Timestamp,
    ) -> Result<EntitlementRecord, DomainError> {
        // Right-hand sides see the pre-update row, so the CASE arms agree
        // with COALESCE on whether this call won.
        let row: Option<LicenseRow> = sqlx::query_as(&format!(
            r#"
            UPDATE licenses SET
                license_key = COALESCE(license_key, $2),
                activated_at = CASE WHEN license_key IS NULL THEN $3 ELSE activated_at END,
                updated_at = CASE WHEN license_key IS NULL THEN $3 ELSE updated_at END
            WHERE user_id = $1
            RETURNING {}
            "#,
            SELECT_COLUMNS
        ))
        .bind(user_id.as_str())
        .bind(key.as_str())
        .bind(activated_at.as_datetime())
        .fetch_optional(&self.pool)
        .await
        .map_err(write_error("issue license key"))?;

        match row {
            Some(row) => EntitlementRecord::try_from(row),
            None => Err(DomainError::new(
                ErrorCode::NotFound,
                format!("No entitlement for user {}", user_id),
            )),
        }
    }

    async fn delete(&self, user_id: &UserId) -> Result<bool, DomainError> {
        let result = sqlx::query("DELETE FROM licenses WHERE user_id = $1")
            .bind(user_id.as_str())
            .execute(&self.pool)
            .await
            .map_err(write_error("delete entitlement"))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<EntitlementRecord>, DomainError> {
        let rows: Vec<LicenseRow> = sqlx::query_as(&format!(
            "SELECT {} FROM licenses ORDER BY created_at, user_id",
            SELECT_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(read_error("list entitlements"))?;

        rows.into_iter().map(EntitlementRecord::try_from).collect()
    }
}
