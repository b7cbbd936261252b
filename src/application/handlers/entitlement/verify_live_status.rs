//! VerifyLiveStatusHandler - Re-checks the subscription with the provider.
//!
//! When the record references a subscription, its live status is fetched
//! and reconciled before answering. A provider failure or timeout answers
//! from the stored record and changes nothing.

use std::sync::Arc;
use std::time::Duration;

use super::provider_call::{bounded, DEFAULT_PROVIDER_TIMEOUT};
use super::{ReconcileEntitlementCommand, ReconcileEntitlementHandler};
use crate::domain::entitlement::{
    BillingSignal, EntitlementError, EntitlementRecord, LicenseKey, Plan,
};
use crate::domain::foundation::UserId;
use crate::ports::{EntitlementStore, PaymentProvider};

/// Query for a user's live Pro status.
#[derive(Debug, Clone)]
pub struct VerifyLiveStatusQuery {
    pub user_id: UserId,
}

/// Result of the live check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyLiveStatusResult {
    pub valid: bool,
    pub plan: Plan,
    pub license_key: Option<LicenseKey>,
}

impl VerifyLiveStatusResult {
    fn from_record(record: Option<&EntitlementRecord>) -> Self {
        match record {
            Some(record) if record.is_entitled() => Self {
                valid: true,
                plan: Plan::Pro,
                license_key: record.license_key.clone(),
            },
            _ => Self {
                valid: false,
                plan: Plan::Basic,
                license_key: None,
            },
        }
    }
}

/// Handler for the live status check.
pub struct VerifyLiveStatusHandler {
    store: Arc<dyn EntitlementStore>,
    payment_provider: Arc<dyn PaymentProvider>,
    reconciler: ReconcileEntitlementHandler,
    timeout: Duration,
}

impl VerifyLiveStatusHandler {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        payment_provider: Arc<dyn PaymentProvider>,
        reconciler: ReconcileEntitlementHandler,
    ) -> Self {
        Self {
            store,
            payment_provider,
            reconciler,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn handle(
        &self,
        query: VerifyLiveStatusQuery,
    ) -> Result<VerifyLiveStatusResult, EntitlementError> {
        let record = self.store.find_by_user(&query.user_id).await?;

        let subscription_id = match record.as_ref().and_then(|r| r.billing_subscription_id.clone()) {
            Some(id) => id,
            None => return Ok(VerifyLiveStatusResult::from_record(record.as_ref())),
        };

        let live = bounded(
            self.timeout,
            "get_subscription",
            self.payment_provider.get_subscription(&subscription_id),
        )
        .await;

        let subscription = match live {
            Ok(Some(subscription)) => subscription,
            Ok(None) => {
                tracing::warn!(
                    user_id = %query.user_id,
                    subscription_id = %subscription_id,
                    "Subscription not found at provider, answering from stored record"
                );
                return Ok(VerifyLiveStatusResult::from_record(record.as_ref()));
            }
            Err(err) => {
                tracing::warn!(
                    user_id = %query.user_id,
                    error = %err,
                    "Live status check failed, answering from stored record"
                );
                return Ok(VerifyLiveStatusResult::from_record(record.as_ref()));
            }
        };

        let signal = BillingSignal::new(subscription.status.clone())
            .with_customer(subscription.customer_id.clone())
            .with_subscription(subscription.id.clone());

        let reconciled = self
            .reconciler
            .handle(ReconcileEntitlementCommand {
                user_id: query.user_id,
                signal,
            })
            .await?;

        Ok(VerifyLiveStatusResult::from_record(Some(&reconciled.record)))
    }
}
