//! ActivateCustomerHandler - Manual activation from a billing customer.
//!
//! Recovery path for development: when neither the webhook nor the
//! checkout fallback linked a user, an operator names the Stripe customer
//! and the customer's latest subscription is reconciled onto the user.

use std::sync::Arc;
use std::time::Duration;

use super::provider_call::{bounded, DEFAULT_PROVIDER_TIMEOUT};
use super::{AutoCreateLicenseResult, ReconcileEntitlementCommand, ReconcileEntitlementHandler};
use crate::domain::entitlement::{BillingSignal, EntitlementError};
use crate::domain::foundation::UserId;
use crate::ports::{is_provider_id, PaymentProvider};

/// Command to activate a user from a customer's latest subscription.
#[derive(Debug, Clone)]
pub struct ActivateCustomerCommand {
    pub user_id: UserId,
    pub customer_id: String,
}

/// Handler for manual activation.
pub struct ActivateCustomerHandler {
    payment_provider: Arc<dyn PaymentProvider>,
    reconciler: ReconcileEntitlementHandler,
    timeout: Duration,
}

impl ActivateCustomerHandler {
    pub fn new(
        payment_provider: Arc<dyn PaymentProvider>,
        reconciler: ReconcileEntitlementHandler,
    ) -> Self {
        Self {
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
        cmd: ActivateCustomerCommand,
    ) -> Result<AutoCreateLicenseResult, EntitlementError> {
        if !is_provider_id(&cmd.customer_id) {
            return Err(EntitlementError::validation(
                "customerId",
                "Malformed customer id",
            ));
        }

        let subscription = bounded(
            self.timeout,
            "list_subscriptions",
            self.payment_provider.list_subscriptions(&cmd.customer_id, 1),
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| EntitlementError::not_found("No subscription found for this customer"))?;

        if !subscription.grants_access() {
            return Err(EntitlementError::validation(
                "subscription",
                format!("Subscription status is {}, not active", subscription.status),
            ));
        }

        let signal = BillingSignal::new(subscription.status.clone())
            .with_customer(cmd.customer_id.clone())
            .with_subscription(subscription.id.clone());

        let reconciled = self
            .reconciler
            .handle(ReconcileEntitlementCommand {
                user_id: cmd.user_id.clone(),
                signal,
            })
            .await?;

        tracing::warn!(
            user_id = %cmd.user_id,
            customer_id = %cmd.customer_id,
            license_issued = reconciled.license_issued,
            "License manually activated from billing customer"
        );

        Ok(AutoCreateLicenseResult {
            success: true,
            license_key: reconciled.record.active_license_key().cloned(),
            message: "License created successfully".to_string(),
        })
    }
}
