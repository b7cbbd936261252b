//! Stripe payment provider adapter.
//!
//! Implements the `PaymentProvider` port for Stripe integration, including:
//! - Customer creation
//! - Subscription and checkout session lookups
//! - Checkout and billing portal sessions
//! - Webhook signature verification
//!
//! # Security
//!
//! - Webhook signatures use HMAC-SHA256 with constant-time comparison
//! - Timestamps are validated to prevent replay attacks (5-minute window)
//! - All secrets are handled via `secrecy::SecretString`
//!
//! # Configuration
//!
//! Required environment variables:
//! - `DECISION_DRIFT__PAYMENT__STRIPE_API_KEY`: Stripe secret API key
//! - `DECISION_DRIFT__PAYMENT__STRIPE_WEBHOOK_SECRET`: Webhook signing secret (whsec_...)
//! - `DECISION_DRIFT__PAYMENT__STRIPE_PRICE_ID`: Price of the Pro plan

mod mock_payment_provider;
mod stripe_adapter;
mod webhook_types;

pub use mock_payment_provider::{MethodCall, MockPaymentProvider};
pub use stripe_adapter::{StripeConfig, StripePaymentAdapter};
pub use webhook_types::{
    hex_encode, SignatureHeader, SignatureParseError, StripeCheckoutSession, StripeCustomer,
    StripeInvoice, StripeSubscription, StripeWebhookEvent,
};
