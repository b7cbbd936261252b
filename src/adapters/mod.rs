//! Adapters - Implementations of port interfaces.
//!
//! Adapters connect the domain to external systems:
//! - `http` - Axum REST surface for the extension and Stripe webhooks
//! - `postgres` - Durable entitlement store
//! - `storage` - In-memory entitlement store for tests and local runs
//! - `stripe` - Stripe API client and a scriptable mock

pub mod http;
pub mod postgres;
pub mod storage;
pub mod stripe;

pub use postgres::PostgresEntitlementStore;
pub use storage::InMemoryEntitlementStore;
pub use stripe::{MockPaymentProvider, StripeConfig, StripePaymentAdapter};
