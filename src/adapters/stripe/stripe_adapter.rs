//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` trait over the Stripe REST API using
//! form-encoded requests and basic auth with the secret key.
//!
//! # Security
//!
//! - HMAC-SHA256 signature verification with constant-time comparison
//! - Timestamp validation (5-minute window) for replay attack prevention
//! - Secrets handled via `secrecy::SecretString`
//!
//! # Timeouts
//!
//! Every API call is bounded twice: by the reqwest client timeout and by a
//! `tokio::time::timeout` around the whole request, response and decode.
//!
//! ```ignore
//! let config = StripeConfig::new(api_key, webhook_secret, price_id);
//! let adapter = StripePaymentAdapter::new(config);
//! ```

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use sha2::Sha256;
use std::time::Duration;
use subtle::ConstantTimeEq;

use crate::config::PaymentConfig;
use crate::ports::{
    is_provider_id, CheckoutSession, CheckoutSessionDetails, CreateCheckoutRequest,
    CreateCustomerRequest, Customer, PaymentError, PaymentErrorCode, PaymentProvider,
    PortalSession, Subscription, WebhookEvent,
};

use super::webhook_types::{
    SignatureHeader, StripeApiError, StripeCheckoutSession, StripeCustomer, StripeList,
    StripePortalSession, StripeSubscription, StripeWebhookEvent,
};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age for webhook events (5 minutes).
const MAX_TIMESTAMP_AGE_SECS: i64 = 300;

/// Clock skew tolerance for future timestamps (60 seconds).
const MAX_FUTURE_TOLERANCE_SECS: i64 = 60;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Stripe API configuration.
#[derive(Clone)]
pub struct StripeConfig {
    /// Stripe secret API key (sk_live_... or sk_test_...).
    api_key: SecretString,

    /// Webhook signing secret (whsec_...).
    webhook_secret: SecretString,

    /// Price of the Pro subscription.
    price_id: String,

    /// Base URL for Stripe API (default: https://api.stripe.com).
    api_base_url: String,

    /// Whether to reject test-mode webhook events.
    require_livemode: bool,

    /// Upper bound for each API call.
    timeout: Duration,
}

impl StripeConfig {
    pub fn new(
        api_key: impl Into<String>,
        webhook_secret: impl Into<String>,
        price_id: impl Into<String>,
    ) -> Self {
        Self {
            api_key: SecretString::new(api_key.into()),
            webhook_secret: SecretString::new(webhook_secret.into()),
            price_id: price_id.into(),
            api_base_url: "https://api.stripe.com".to_string(),
            require_livemode: false,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Set a custom API base URL (for testing).
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    /// Require livemode events in production.
    pub fn with_require_livemode(mut self, require: bool) -> Self {
        self.require_livemode = require;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl From<&PaymentConfig> for StripeConfig {
    fn from(config: &PaymentConfig) -> Self {
        StripeConfig::new(
            config.stripe_api_key.clone(),
            config.stripe_webhook_secret.clone(),
            config.stripe_price_id.clone(),
        )
        .with_base_url(config.api_base_url.clone())
        .with_require_livemode(config.require_livemode)
        .with_timeout(config.provider_timeout())
    }
}

/// Stripe payment provider adapter.
pub struct StripePaymentAdapter {
    config: StripeConfig,
    http_client: reqwest::Client,
}

impl StripePaymentAdapter {
    pub fn new(config: StripeConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client for Stripe");
                reqwest::Client::new()
            });
        Self {
            config,
            http_client,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.config.api_base_url, path)
    }

    /// URL of a single object. Ids come from callers, so they are checked
    /// before becoming a path segment.
    fn object_url(&self, collection: &str, id: &str) -> Result<String, PaymentError> {
        if !is_provider_id(id) {
            tracing::warn!(collection, "Rejected malformed Stripe object id");
            return Err(PaymentError::invalid_request(format!(
                "Malformed {} id",
                collection
            )));
        }
        Ok(self.url(&format!("{}/{}", collection, id)))
    }

    /// Sends a request and decodes the body. `Ok(None)` on 404.
    async fn send<T: DeserializeOwned>(
        &self,
        request: reqwest::RequestBuilder,
        operation: &'static str,
    ) -> Result<Option<T>, PaymentError> {
        let request = request.basic_auth(self.config.api_key.expose_secret(), Option::<&str>::None);
        let call = async {
            let response = request
                .send()
                .await
                .map_err(|e| PaymentError::network(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(api_error(status, &body));
            }

            response.json::<T>().await.map(Some).map_err(|e| {
                PaymentError::provider(format!("Failed to parse Stripe response: {}", e))
            })
        };

        match tokio::time::timeout(self.config.timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                tracing::error!(operation, code = %err.code, error = %err.message, "Stripe call failed");
                Err(err)
            }
            Err(_) => {
                tracing::error!(operation, timeout_secs = self.config.timeout.as_secs(), "Stripe call timed out");
                Err(PaymentError::timeout(format!(
                    "Stripe {} did not complete within {:?}",
                    operation, self.config.timeout
                )))
            }
        }
    }

    /// Verify webhook signature using HMAC-SHA256.
    ///
    /// Validates the timestamp window first, then compares every `v1`
    /// signature in constant time.
    fn verify_signature(&self, payload: &[u8], header: &SignatureHeader) -> Result<(), PaymentError> {
        let now = chrono::Utc::now().timestamp();
        let age = now - header.timestamp;

        if age > MAX_TIMESTAMP_AGE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                age_secs = age,
                "Webhook event too old - possible replay attack"
            );
            return Err(PaymentError::invalid_webhook(format!(
                "Event too old ({} seconds)",
                age
            )));
        }

        if age < -MAX_FUTURE_TOLERANCE_SECS {
            tracing::warn!(
                event_timestamp = header.timestamp,
                current_time = now,
                "Webhook event from future - clock skew or manipulation"
            );
            return Err(PaymentError::invalid_webhook("Event timestamp in future"));
        }

        let mut mac = HmacSha256::new_from_slice(self.config.webhook_secret.expose_secret().as_bytes())
            .map_err(|e| PaymentError::invalid_webhook(format!("Unusable signing secret: {}", e)))?;
        mac.update(header.timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = mac.finalize().into_bytes();

        let matched = header
            .v1_signatures
            .iter()
            .any(|provided| expected.as_slice().ct_eq(provided.as_slice()).unwrap_u8() == 1);

        if !matched {
            tracing::warn!("Invalid webhook signature");
            return Err(PaymentError::invalid_webhook("Invalid signature"));
        }

        Ok(())
    }

    /// Parse a verified payload into the domain event.
    fn parse_event(&self, payload: &[u8]) -> Result<WebhookEvent, PaymentError> {
        let stripe_event: StripeWebhookEvent = serde_json::from_slice(payload).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse webhook payload");
            PaymentError::malformed_event(format!("Invalid JSON: {}", e))
        })?;

        if self.config.require_livemode && !stripe_event.livemode {
            tracing::warn!(
                event_id = %stripe_event.id,
                "Rejected test mode event in production"
            );
            return Err(PaymentError::invalid_webhook(
                "Test mode events not allowed in production",
            ));
        }

        stripe_event.into_webhook_event()
    }
}

/// Builds a PaymentError from a non-2xx Stripe response.
fn api_error(status: reqwest::StatusCode, body: &str) -> PaymentError {
    let code = match status {
        reqwest::StatusCode::UNAUTHORIZED => PaymentErrorCode::AuthenticationError,
        reqwest::StatusCode::TOO_MANY_REQUESTS => PaymentErrorCode::RateLimitExceeded,
        _ => PaymentErrorCode::ProviderError,
    };

    match serde_json::from_str::<StripeApiError>(body) {
        Ok(parsed) => {
            let message = parsed
                .error
                .message
                .unwrap_or_else(|| format!("Stripe API error ({})", status));
            let err = PaymentError::new(code, message);
            match parsed.error.code.or(parsed.error.error_type) {
                Some(provider_code) => err.with_provider_code(provider_code),
                None => err,
            }
        }
        Err(_) => PaymentError::new(code, format!("Stripe API error ({}): {}", status, body)),
    }
}

#[async_trait]
impl PaymentProvider for StripePaymentAdapter {
    async fn create_customer(
        &self,
        request: CreateCustomerRequest,
    ) -> Result<Customer, PaymentError> {
        let params = [("metadata[userId]", request.user_id.to_string())];

        let mut builder = self.http_client.post(self.url("customers")).form(&params);
        if let Some(key) = &request.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }

        let customer: StripeCustomer = self
            .send(builder, "create_customer")
            .await?
            .ok_or_else(|| PaymentError::not_found("Customer endpoint"))?;

        tracing::info!(user_id = %request.user_id, customer_id = %customer.id, "Stripe customer created");

        Ok(Customer {
            id: customer.id,
            created_at: customer.created,
        })
    }

    async fn get_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Option<Subscription>, PaymentError> {
        let builder = self
            .http_client
            .get(self.object_url("subscriptions", subscription_id)?);

        let sub: Option<StripeSubscription> = self.send(builder, "get_subscription").await?;
        Ok(sub.map(Subscription::from))
    }

    async fn get_checkout_session(
        &self,
        session_id: &str,
    ) -> Result<Option<CheckoutSessionDetails>, PaymentError> {
        let builder = self
            .http_client
            .get(self.object_url("checkout/sessions", session_id)?);

        let session: Option<StripeCheckoutSession> =
            self.send(builder, "get_checkout_session").await?;
        Ok(session.map(CheckoutSessionDetails::from))
    }

    async fn list_subscriptions(
        &self,
        customer_id: &str,
        limit: u8,
    ) -> Result<Vec<Subscription>, PaymentError> {
        let builder = self
            .http_client
            .get(self.url("subscriptions"))
            .query(&[("customer", customer_id.to_string()), ("limit", limit.to_string())]);

        let page: StripeList<StripeSubscription> = self
            .send(builder, "list_subscriptions")
            .await?
            .ok_or_else(|| PaymentError::not_found("Customer"))?;

        Ok(page.data.into_iter().map(Subscription::from).collect())
    }

    async fn create_checkout_session(
        &self,
        request: CreateCheckoutRequest,
    ) -> Result<CheckoutSession, PaymentError> {
        let user_id = request.user_id.to_string();
        let params = [
            ("mode", "subscription".to_string()),
            ("customer", request.customer_id),
            ("line_items[0][price]", self.config.price_id.clone()),
            ("line_items[0][quantity]", "1".to_string()),
            ("allow_promotion_codes", "true".to_string()),
            ("success_url", request.success_url),
            ("cancel_url", request.cancel_url),
            ("client_reference_id", user_id.clone()),
            ("metadata[userId]", user_id.clone()),
            ("subscription_data[metadata][userId]", user_id),
        ];

        let builder = self
            .http_client
            .post(self.url("checkout/sessions"))
            .form(&params);

        let session: StripeCheckoutSession = self
            .send(builder, "create_checkout_session")
            .await?
            .ok_or_else(|| PaymentError::not_found("Checkout endpoint"))?;

        let url = session
            .url
            .ok_or_else(|| PaymentError::provider("Checkout session has no URL"))?;

        Ok(CheckoutSession { id: session.id, url })
    }

    async fn create_portal_session(
        &self,
        customer_id: &str,
        return_url: &str,
    ) -> Result<PortalSession, PaymentError> {
        let builder = self
            .http_client
            .post(self.url("billing_portal/sessions"))
            .form(&[("customer", customer_id), ("return_url", return_url)]);

        let portal: StripePortalSession = self
            .send(builder, "create_portal_session")
            .await?
            .ok_or_else(|| PaymentError::not_found("Customer"))?;

        Ok(PortalSession {
            id: portal.id,
            url: portal.url,
        })
    }

    async fn verify_webhook(
        &self,
        payload: &[u8],
        signature: &str,
    ) -> Result<WebhookEvent, PaymentError> {
        let header = SignatureHeader::parse(signature).map_err(|e| {
            tracing::warn!(error = %e, "Failed to parse Stripe-Signature header");
            PaymentError::invalid_webhook(e.to_string())
        })?;

        self.verify_signature(payload, &header)?;

        let event = self.parse_event(payload)?;

        tracing::info!(
            event_id = %event.id,
            event_type = ?event.kind,
            "Webhook signature verified"
        );

        Ok(event)
    }
}
