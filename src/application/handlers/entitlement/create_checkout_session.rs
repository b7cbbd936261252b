//! CreateCheckoutSessionHandler - Starts a Pro subscription checkout.

use std::sync::Arc;
use std::time::Duration;

use super::extension_urls::{checkout_cancel_url, checkout_success_url, validate_client_id};
use super::provider_call::{bounded, DEFAULT_PROVIDER_TIMEOUT};
use crate::domain::entitlement::{EntitlementError, EntitlementPatch};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{
    CreateCheckoutRequest, CreateCustomerRequest, EntitlementStore, PaymentProvider,
};

/// Command to create a checkout session.
#[derive(Debug, Clone)]
pub struct CreateCheckoutSessionCommand {
    pub user_id: UserId,
    /// Browser extension id the redirects return to.
    pub client_id: String,
}

/// Result of checkout creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCheckoutSessionResult {
    pub checkout_url: String,
    pub session_id: String,
}

/// Handler for checkout creation.
///
/// Reuses the user's billing customer when one is on record; otherwise a
/// customer is created with `userId` metadata and persisted first, so the
/// later webhook can be matched back to the user.
pub struct CreateCheckoutSessionHandler {
    store: Arc<dyn EntitlementStore>,
    payment_provider: Arc<dyn PaymentProvider>,
    timeout: Duration,
}

impl CreateCheckoutSessionHandler {
    pub fn new(store: Arc<dyn EntitlementStore>, payment_provider: Arc<dyn PaymentProvider>) -> Self {
        Self {
            store,
            payment_provider,
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn handle(
        &self,
        cmd: CreateCheckoutSessionCommand,
    ) -> Result<CreateCheckoutSessionResult, EntitlementError> {
        let client_id = validate_client_id(&cmd.client_id)?;

        let existing = self.store.find_by_user(&cmd.user_id).await?;
        let customer_id = match existing.and_then(|r| r.billing_customer_id) {
            Some(id) => id,
            None => self.create_customer(&cmd.user_id).await?,
        };

        let session = bounded(
            self.timeout,
            "create_checkout_session",
            self.payment_provider.create_checkout_session(CreateCheckoutRequest {
                user_id: cmd.user_id.clone(),
                customer_id,
                success_url: checkout_success_url(client_id),
                cancel_url: checkout_cancel_url(client_id),
            }),
        )
        .await?;

        tracing::info!(user_id = %cmd.user_id, session_id = %session.id, "Checkout session created");

        Ok(CreateCheckoutSessionResult {
            checkout_url: session.url,
            session_id: session.id,
        })
    }

    async fn create_customer(&self, user_id: &UserId) -> Result<String, EntitlementError> {
        let customer = bounded(
            self.timeout,
            "create_customer",
            self.payment_provider.create_customer(CreateCustomerRequest {
                user_id: user_id.clone(),
                idempotency_key: Some(format!("customer-{}", user_id)),
            }),
        )
        .await?;

        let patch = EntitlementPatch::new().with_customer_id(customer.id.clone());
        self.store.merge(user_id, patch, Timestamp::now()).await?;

        tracing::info!(user_id = %user_id, customer_id = %customer.id, "Billing customer linked");
        Ok(customer.id)
    }
}
