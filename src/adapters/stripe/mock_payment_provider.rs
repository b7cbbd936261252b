//! Mock payment provider for testing.
//!
//! Provides a configurable mock implementation of `PaymentProvider` for unit
//! and integration tests. Supports:
//! - Pre-configured subscriptions and checkout sessions
//! - Error injection and artificial latency
//! - Call tracking
//! - Webhook verification against a real signing secret

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::ports::{
    CheckoutSession, CheckoutSessionDetails, CreateCheckoutRequest, CreateCustomerRequest,
    Customer, PaymentError, PaymentProvider, PortalSession, Subscription, WebhookEvent,
    WebhookEventData, WebhookEventKind,
};

use super::webhook_types::{hex_encode, SignatureHeader, StripeWebhookEvent};

/// Mock payment provider for testing.
///
/// # Example
///
/// ```ignore
/// let mock = MockPaymentProvider::new();
///
/// // Configure responses
/// mock.add_subscription(MockPaymentProvider::subscription("sub_1", "cus_1", "active"));
///
/// // Inject errors
/// mock.set_method_error("get_subscription", PaymentError::network("down"));
///
/// // Use in tests
/// let result = mock.get_subscription("sub_1").await;
/// ```
#[derive(Default, Clone)]
pub struct MockPaymentProvider {
    /// Inner state (thread-safe for async tests).
    inner: Arc<Mutex<MockState>>,
}

/// Internal mutable state.
#[derive(Default)]
struct MockState {
    /// Next customer to return from `create_customer`.
    next_customer: Option<Customer>,

    /// Pre-configured subscriptions by ID.
    subscriptions: HashMap<String, Subscription>,

    /// Subscription ids, oldest first.
    subscription_order: Vec<String>,

    /// Pre-configured completed checkout sessions by ID.
    checkout_sessions: HashMap<String, CheckoutSessionDetails>,

    /// Next checkout session to return.
    next_checkout: Option<CheckoutSession>,

    /// Next portal session to return.
    next_portal: Option<PortalSession>,

    /// Next webhook event to return.
    next_webhook_event: Option<WebhookEvent>,

    /// Error to return on next call.
    next_error: Option<PaymentError>,

    /// Specific errors by method name.
    method_errors: HashMap<String, PaymentError>,

    /// Latency added before every call.
    delay: Option<Duration>,

    /// Track method calls for assertions.
    call_log: Vec<MethodCall>,

    /// Webhook verification behavior.
    webhook_verify_mode: WebhookVerifyMode,
}

/// Recorded method call for assertions.
#[derive(Debug, Clone)]
pub struct MethodCall {
    pub method: String,
    pub args: Vec<String>,
}

/// How to handle webhook verification.
#[derive(Default, Clone)]
enum WebhookVerifyMode {
    /// Accept any payload and decode it.
    #[default]
    AcceptAll,

    /// Require a Stripe-style HMAC signature with this secret.
    SigningSecret(String),

    /// Always fail verification.
    AlwaysFail,
}

impl MockPaymentProvider {
    /// Create a new mock provider with default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mock that fails all webhook verifications.
    pub fn rejecting_webhooks() -> Self {
        let mock = Self::new();
        mock.state().webhook_verify_mode = WebhookVerifyMode::AlwaysFail;
        mock
    }

    /// Create a mock that checks webhook signatures against `secret`.
    ///
    /// Timestamps are not checked; the signed payload is `"{t}.{body}"`.
    pub fn with_signing_secret(secret: impl Into<String>) -> Self {
        let mock = Self::new();
        mock.state().webhook_verify_mode = WebhookVerifyMode::SigningSecret(secret.into());
        mock
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Configuration Methods
    // ════════════════════════════════════════════════════════════════════════════

    /// Set the customer to return on next `create_customer` call.
    pub fn set_customer(&self, customer: Customer) {
        self.state().next_customer = Some(customer);
    }

    /// Add a subscription to the "database".
    ///
    /// The most recently added subscription is listed first.
    pub fn add_subscription(&self, subscription: Subscription) {
        let id = subscription.id.clone();
        let mut state = self.state();
        state.subscription_order.retain(|existing| existing != &id);
        state.subscription_order.push(id.clone());
        state.subscriptions.insert(id, subscription);
    }

    /// Add a completed checkout session to the "database".
    pub fn add_checkout_session(&self, session: CheckoutSessionDetails) {
        let id = session.id.clone();
        self.state().checkout_sessions.insert(id, session);
    }

    /// Set the checkout session to return from `create_checkout_session`.
    pub fn set_checkout_session(&self, session: CheckoutSession) {
        self.state().next_checkout = Some(session);
    }

    /// Set the portal session to return.
    pub fn set_portal_session(&self, session: PortalSession) {
        self.state().next_portal = Some(session);
    }

    /// Set the webhook event to return on verification.
    pub fn set_webhook_event(&self, event: WebhookEvent) {
        self.state().next_webhook_event = Some(event);
    }

    /// Set an error to return on the next call to any method.
    pub fn set_error(&self, error: PaymentError) {
        self.state().next_error = Some(error);
    }

    /// Set an error for a specific method.
    pub fn set_method_error(&self, method: &str, error: PaymentError) {
        self.state().method_errors.insert(method.to_string(), error);
    }

    /// Delay every call by `delay` before answering.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Clear all configured errors.
    pub fn clear_errors(&self) {
        let mut state = self.state();
        state.next_error = None;
        state.method_errors.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Call Tracking
    // ════════════════════════════════════════════════════════════════════════════

    /// Get all recorded method calls.
    pub fn calls(&self) -> Vec<MethodCall> {
        self.state().call_log.clone()
    }

    /// Check if a method was called.
    pub fn was_called(&self, method: &str) -> bool {
        self.state().call_log.iter().any(|c| c.method == method)
    }

    /// Get count of calls to a method.
    pub fn call_count(&self, method: &str) -> usize {
        self.state()
            .call_log
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    /// Clear the call log.
    pub fn clear_calls(&self) {
        self.state().call_log.clear();
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Internal Helpers
    // ════════════════════════════════════════════════════════════════════════════

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records the call, waits out any configured delay, then checks errors.
    async fn enter(&self, method: &str, args: Vec<String>) -> Result<(), PaymentError> {
        let delay = {
            let mut state = self.state();
            state.call_log.push(MethodCall {
                method: method.to_string(),
                args,
            });
            state.delay
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();

        // Check method-specific error first
        if let Some(error) = state.method_errors.get(method) {
            return Err(error.clone());
        }

        // Check global error (consumes it)
        if let Some(error) = state.next_error.take() {
            return Err(error);
        }

        Ok(())
    }
}

fn short_id() -> String {
    uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect()
}

#[async_trait]
impl PaymentProvider for MockPaymentProvider {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        self.enter("create_customer", vec![request.user_id.to_string()])
            .await?;

        Ok(self.state().next_customer.take().unwrap_or_else(|| Customer {
            id: format!("cus_mock_{}", short_id()),
            created_at: chrono::Utc::now().timestamp(),
        }))
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, PaymentError> {
        self.enter("get_subscription", vec![subscription_id.to_string()])
            .await?;

        Ok(self.state().subscriptions.get(subscription_id).cloned())
    }

    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionDetails>, PaymentError> {
        self.enter("get_checkout_session", vec![session_id.to_string()])
            .await?;

        Ok(self.state().checkout_sessions.get(session_id).cloned())
    }

    async fn list_subscriptions(
        &self,
        customer_id: &str,
        limit: u8,
    ) -> Result<Vec<Subscription>, PaymentError> {
        self.enter(
            "list_subscriptions",
            vec![customer_id.to_string(), limit.to_string()],
        )
        .await?;

        let state = self.state();
        Ok(state
            .subscription_order
            .iter()
            .rev()
            .filter_map(|id| state.subscriptions.get(id))
            .filter(|sub| sub.customer_id == customer_id && sub.status != "canceled")
            .take(usize::from(limit))
            .cloned()
            .collect())
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        self.enter(
            "create_checkout_session",
            vec![
                request.user_id.to_string(),
                request.customer_id.clone(),
                request.success_url.clone(),
                request.cancel_url.clone(),
            ],
        )
        .await?;

        Ok(self.state().next_checkout.take().unwrap_or_else(|| {
            let id = format!("cs_mock_{}", short_id());
            CheckoutSession {
                url: format!("https://checkout.stripe.com/c/pay/{}", id),
                id,
            }
        }))
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        self.enter(
            "create_portal_session",
            vec![customer_id.to_string(), return_url.to_string()],
        )
        .await?;

        Ok(self.state().next_portal.take().unwrap_or_else(|| {
            let id = format!("bps_mock_{}", short_id());
            PortalSession {
                url: format!("https://billing.stripe.com/p/session/{}", id),
                id,
            }
        }))
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, PaymentError> {
        self.enter(
            "verify_webhook",
            vec![
                String::from_utf8_lossy(payload).chars().take(50).collect(),
                signature.chars().take(20).collect(),
            ],
        )
        .await?;

        let (mode, scripted) = {
            let state = self.state();
            (state.webhook_verify_mode.clone(), state.next_webhook_event.clone())
        };

        match mode {
            WebhookVerifyMode::AcceptAll => {}
            WebhookVerifyMode::SigningSecret(secret) => verify_signature(&secret, payload, signature)?,
            WebhookVerifyMode::AlwaysFail => {
                return Err(PaymentError::invalid_webhook("Verification disabled"));
            }
        }

        if let Some(event) = scripted {
            return Ok(event);
        }

        let event: StripeWebhookEvent = serde_json::from_slice(payload)
            .map_err(|e| PaymentError::malformed_event(format!("Invalid JSON: {}", e)))?;
        event.into_webhook_event()
    }
}

fn verify_signature(secret: &str, payload: &[u8], signature: &str) -> Result<(), PaymentError> {
    let header = SignatureHeader::parse(signature)
        .map_err(|e| PaymentError::invalid_webhook(e.to_string()))?;

    let expected = MockPaymentProvider::sign(secret, header.timestamp, payload);
    let expected = expected
        .rsplit_once("v1=")
        .map(|(_, hex)| hex.to_string())
        .unwrap_or_default();

    let matched = header
        .v1_signatures
        .iter()
        .any(|provided| hex_encode(provided).as_bytes().ct_eq(expected.as_bytes()).unwrap_u8() == 1);

    if matched {
        Ok(())
    } else {
        Err(PaymentError::invalid_webhook("Invalid signature"))
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Test Helpers
// ════════════════════════════════════════════════════════════════════════════════

impl MockPaymentProvider {
    /// Builds a `Stripe-Signature` header value for `payload`.
    pub fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).map(|mut mac| {
            mac.update(timestamp.to_string().as_bytes());
            mac.update(b".");
            mac.update(payload);
            mac.finalize().into_bytes()
        });

        match mac {
            Ok(digest) => format!("t={},v1={}", timestamp, hex_encode(&digest)),
            Err(_) => format!("t={}", timestamp),
        }
    }

    /// Subscription fixture.
    pub fn subscription(id: &str, customer_id: &str, status: &str) -> Subscription {
        Subscription {
            id: id.to_string(),
            customer_id: customer_id.to_string(),
            status: status.to_string(),
            current_period_end: Some(chrono::Utc::now().timestamp() + 30 * 24 * 60 * 60),
            cancel_at_period_end: false,
        }
    }

    /// Create a mock with a pre-configured active subscription.
    pub fn with_active_subscription(customer_id: &str, subscription_id: &str) -> Self {
        let mock = Self::new();
        mock.add_subscription(Self::subscription(subscription_id, customer_id, "active"));
        mock
    }

    /// Create a checkout completed webhook event.
    pub fn checkout_completed_event(
        customer_id: &str,
        subscription_id: &str,
        user_id: &str,
    ) -> WebhookEvent {
        let session_id = format!("cs_{}", short_id());
        WebhookEvent {
            id: format!("evt_checkout_{}", short_id()),
            kind: WebhookEventKind::CheckoutCompleted,
            data: WebhookEventData::Checkout(CheckoutSessionDetails {
                id: session_id,
                customer_id: Some(customer_id.to_string()),
                subscription_id: Some(subscription_id.to_string()),
                payment_status: "paid".to_string(),
                mode: "subscription".to_string(),
                client_reference_id: Some(user_id.to_string()),
                metadata_user_id: Some(user_id.to_string()),
                promotion_code: None,
            }),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Create a subscription event of the given kind.
    pub fn subscription_event(
        kind: WebhookEventKind,
        customer_id: &str,
        subscription_id: &str,
        status: &str,
    ) -> WebhookEvent {
        WebhookEvent {
            id: format!("evt_sub_{}", short_id()),
            kind,
            data: WebhookEventData::Subscription(Self::subscription(
                subscription_id,
                customer_id,
                status,
            )),
            created_at: chrono::Utc::now().timestamp(),
        }
    }

    /// Create a payment failed webhook event.
    pub fn payment_failed_event(customer_id: &str, subscription_id: &str) -> WebhookEvent {
        WebhookEvent {
            id: format!("evt_fail_{}", short_id()),
            kind: WebhookEventKind::InvoiceFailed,
            data: WebhookEventData::Invoice {
                invoice_id: format!("in_{}", short_id()),
                customer_id: Some(customer_id.to_string()),
                subscription_id: Some(subscription_id.to_string()),
            },
            created_at: chrono::Utc::now().timestamp(),
        }
    }
}
