//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! - `EntitlementStore` - per-user entitlement persistence
//! - `PaymentProvider` - billing gateway (customers, sessions, webhooks)

mod entitlement_store;
mod payment_provider;

pub use entitlement_store::EntitlementStore;
pub use payment_provider::{
    is_provider_id, CheckoutSession, CheckoutSessionDetails, CreateCheckoutRequest,
    CreateCustomerRequest, Customer, PaymentError, PaymentErrorCode, PaymentProvider,
    PortalSession, Subscription, WebhookEvent, WebhookEventData, WebhookEventKind,
};
