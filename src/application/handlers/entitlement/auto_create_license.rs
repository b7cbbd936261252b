//! AutoCreateLicenseHandler - Fallback activation after checkout.
//!
//! The extension calls this when it returns from checkout and the webhook
//! may not have arrived yet. The session and its subscription are read back
//! from the provider and reconciled exactly as the webhook would.

use std::sync::Arc;
use std::time::Duration;

use super::provider_call::{bounded, DEFAULT_PROVIDER_TIMEOUT};
use super::{ReconcileEntitlementCommand, ReconcileEntitlementHandler};
use crate::domain::entitlement::{BillingSignal, EntitlementError, LicenseKey};
use crate::domain::foundation::UserId;
use crate::ports::{is_provider_id, EntitlementStore, PaymentProvider};

/// Command to activate from a completed checkout session.
#[derive(Debug, Clone)]
pub struct AutoCreateLicenseCommand {
    pub session_id: String,
    pub user_id: UserId,
}

/// Result of the fallback activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AutoCreateLicenseResult {
    pub success: bool,
    pub license_key: Option<LicenseKey>,
    pub message: String,
}

/// Handler for the auto-create fallback.
pub struct AutoCreateLicenseHandler {
    store: Arc<dyn EntitlementStore>,
    payment_provider: Arc<dyn PaymentProvider>,
    reconciler: ReconcileEntitlementHandler,
    timeout: Duration,
}

impl AutoCreateLicenseHandler {
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
        cmd: AutoCreateLicenseCommand,
    ) -> Result<AutoCreateLicenseResult, EntitlementError> {
        if cmd.session_id.trim().is_empty() {
            return Err(EntitlementError::validation("sessionId", "cannot be empty"));
        }
        if !is_provider_id(&cmd.session_id) {
            return Err(EntitlementError::validation(
                "sessionId",
                "Malformed checkout session id",
            ));
        }

        // Already entitled: hand back the key we have
        if let Some(record) = self.store.find_by_user(&cmd.user_id).await? {
            if let Some(key) = record.active_license_key() {
                return Ok(AutoCreateLicenseResult {
                    success: true,
                    license_key: Some(key.clone()),
                    message: "License already exists".to_string(),
                });
            }
        }

        let session = bounded(
            self.timeout,
            "get_checkout_session",
            self.payment_provider.get_checkout_session(&cmd.session_id),
        )
        .await?
        .ok_or_else(|| EntitlementError::not_found("Checkout session not found"))?;

        if !session.is_paid() {
            return Err(EntitlementError::validation("sessionId", "Payment not completed"));
        }
        if !session.is_subscription() {
            return Err(EntitlementError::validation("sessionId", "Not a subscription session"));
        }
        if let Some(owner) = session.user_id() {
            if owner != cmd.user_id.as_str() {
                tracing::warn!(
                    user_id = %cmd.user_id,
                    session_id = %cmd.session_id,
                    "Checkout session belongs to another user"
                );
                return Err(EntitlementError::validation(
                    "sessionId",
                    "Checkout session belongs to another user",
                ));
            }
        }

        let subscription_id = session.subscription_id.clone().ok_or_else(|| {
            EntitlementError::validation("sessionId", "Checkout session has no subscription")
        })?;

        let subscription = bounded(
            self.timeout,
            "get_subscription",
            self.payment_provider.get_subscription(&subscription_id),
        )
        .await?
        .ok_or_else(|| EntitlementError::not_found("Subscription not found"))?;

        if !subscription.grants_access() {
            return Err(EntitlementError::validation(
                "subscription",
                format!("Subscription status is {}, not active", subscription.status),
            ));
        }

        let signal = BillingSignal::new(subscription.status.clone())
            .with_customer(subscription.customer_id.clone())
            .with_subscription(subscription.id.clone())
            .with_promotion_code(session.promotion_code.clone());

        let reconciled = self
            .reconciler
            .handle(ReconcileEntitlementCommand {
                user_id: cmd.user_id.clone(),
                signal,
            })
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            session_id = %cmd.session_id,
            license_issued = reconciled.license_issued,
            "License activated from checkout session"
        );

        Ok(AutoCreateLicenseResult {
            success: true,
            license_key: reconciled.record.active_license_key().cloned(),
            message: "License created successfully".to_string(),
        })
    }
}
