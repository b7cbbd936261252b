//! HTTP adapter for entitlement endpoints.
//!
//! Exposes the billing backend to the browser extension:
//! - `GET /api/get-license` - License key for an entitled user
//! - `GET|POST /api/verify-license` - Check a presented key
//! - `POST /api/verify-pro-status` - Live re-check with Stripe
//! - `POST /api/create-checkout-session` - Start paid checkout flow
//! - `POST /api/create-portal-session` - Billing portal link
//! - `POST /api/auto-create-license` - Fallback activation after checkout
//! - `POST /api/webhook` - Handle Stripe webhooks
//! - `GET /health` - Liveness

pub mod dto;
pub mod handlers;
pub mod routes;

pub use dto::*;
pub use handlers::{ApiError, EntitlementAppState};
pub use routes::{app_router, debug_routes, entitlement_routes};
