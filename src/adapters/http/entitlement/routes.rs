//! Axum router configuration for entitlement endpoints.
//!
//! This module defines the route structure the extension and Stripe talk to
//! and wires them to their corresponding handlers.

use axum::{
    routing::{delete, get, post},
    Router,
};
use http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;

use super::handlers::{
    auto_create_license, create_checkout_session, create_portal_session, debug_create_license,
    delete_license, get_license, handle_stripe_webhook, health, list_licenses, verify_license_body,
    verify_license_query, verify_pro_status, EntitlementAppState,
};

/// Create the entitlement API router.
///
/// # Routes
///
/// ## Extension Endpoints
/// - `GET /get-license` - License key for an entitled user
/// - `GET|POST /verify-license` - Check a presented key
/// - `POST /verify-pro-status` - Live re-check with the provider
/// - `POST /create-checkout-session` - Start paid checkout flow
/// - `POST /create-portal-session` - Billing portal link
/// - `POST /auto-create-license` - Fallback activation after checkout
///
/// ## Webhook Endpoints (signature verified)
/// - `POST /webhook` - Handle Stripe webhooks
pub fn entitlement_routes() -> Router<EntitlementAppState> {
    Router::new()
        .route("/get-license", get(get_license))
        .route(
            "/verify-license",
            get(verify_license_query).post(verify_license_body),
        )
        .route("/verify-pro-status", post(verify_pro_status))
        .route("/create-checkout-session", post(create_checkout_session))
        .route("/create-portal-session", post(create_portal_session))
        .route("/auto-create-license", post(auto_create_license))
        .route("/webhook", post(handle_stripe_webhook))
}

/// Inspection routes, mounted only in development.
///
/// # Routes
/// - `GET /debug/licenses` - Every stored record
/// - `DELETE /debug/licenses/:user_id` - Remove one record
/// - `GET /debug/create-license?userId=&customerId=` - Activate from a customer's latest subscription
pub fn debug_routes() -> Router<EntitlementAppState> {
    Router::new()
        .route("/debug/licenses", get(list_licenses))
        .route("/debug/licenses/:user_id", delete(delete_license))
        .route("/debug/create-license", get(debug_create_license))
}

/// Create the complete application router with middleware applied.
pub fn app_router(state: EntitlementAppState, server: &ServerConfig) -> Router {
    let mut api = entitlement_routes();
    if server.is_development() {
        api = api.merge(debug_routes());
    }

    Router::new()
        .route("/health", get(health))
        .nest("/api", api)
        .layer(TimeoutLayer::new(server.request_timeout()))
        .layer(cors_layer(server))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(server: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = server
        .cors_origins_list()
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(origins)
    }
}
