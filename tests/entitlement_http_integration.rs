//! Integration tests for entitlement HTTP endpoints.
//!
//! These tests drive the full router with the in-memory store and a mock
//! Stripe provider that checks real HMAC signatures:
//! 1. Signed webhooks reconcile entitlements
//! 2. License lookup and verification reflect the reconciled state
//! 3. Checkout, portal, and fallback activation wire through to the provider
//! 4. Errors come back as `{"error": {"code", "message"}}`

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use decision_drift::adapters::http::{app_router, EntitlementAppState};
use decision_drift::adapters::storage::InMemoryEntitlementStore;
use decision_drift::adapters::stripe::MockPaymentProvider;
use decision_drift::config::{Environment, ServerConfig};
use decision_drift::domain::entitlement::{EntitlementRecord, Plan, RandomLicenseKeyGenerator};
use decision_drift::domain::foundation::{Timestamp, UserId};
use decision_drift::ports::{CheckoutSessionDetails, EntitlementStore};

// =============================================================================
// Test Infrastructure
// =============================================================================

const SECRET: &str = "whsec_integration";
const USER: &str = "user-42";
const CUSTOMER: &str = "cus_int";
const SUBSCRIPTION: &str = "sub_int";

struct TestApp {
    router: Router,
    store: InMemoryEntitlementStore,
    provider: MockPaymentProvider,
}

impl TestApp {
    fn new() -> Self {
        Self::in_environment(Environment::Development)
    }

    fn in_environment(environment: Environment) -> Self {
        let store = InMemoryEntitlementStore::new();
        let provider = MockPaymentProvider::with_signing_secret(SECRET);
        let state = EntitlementAppState::new(
            Arc::new(store.clone()),
            Arc::new(provider.clone()),
            Arc::new(RandomLicenseKeyGenerator),
        )
        .with_redacted_errors(environment == Environment::Production);

        let server = ServerConfig {
            environment,
            ..ServerConfig::default()
        };

        Self {
            router: app_router(state, &server),
            store,
            provider,
        }
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::get(uri).body(Body::empty()).unwrap()).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn webhook(&self, event: Value) -> (StatusCode, Value) {
        let payload = event.to_string();
        let timestamp = chrono::Utc::now().timestamp();
        let signature = MockPaymentProvider::sign(SECRET, timestamp, payload.as_bytes());
        self.send(
            Request::post("/api/webhook")
                .header("Stripe-Signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
    }
}

fn checkout_completed() -> Value {
    json!({
        "id": "evt_checkout",
        "type": "checkout.session.completed",
        "created": 1_700_000_000,
        "livemode": false,
        "data": { "object": {
            "id": "cs_int",
            "customer": CUSTOMER,
            "subscription": SUBSCRIPTION,
            "payment_status": "paid",
            "mode": "subscription",
            "client_reference_id": USER,
            "metadata": { "userId": USER }
        }}
    })
}

fn subscription_event(event_type: &str, status: &str) -> Value {
    json!({
        "id": format!("evt_{}", status),
        "type": event_type,
        "created": 1_700_000_100,
        "data": { "object": {
            "id": SUBSCRIPTION,
            "customer": CUSTOMER,
            "status": status,
            "cancel_at_period_end": false
        }}
    })
}

async fn activate(app: &TestApp) -> String {
    app.provider
        .add_subscription(MockPaymentProvider::subscription(SUBSCRIPTION, CUSTOMER, "active"));
    let (status, body) = app.webhook(checkout_completed()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "received": true }));

    let (status, body) = app.get(&format!("/api/get-license?userId={}", USER)).await;
    assert_eq!(status, StatusCode::OK);
    body["licenseKey"].as_str().unwrap().to_string()
}

// =============================================================================
// Webhook Flow
// =============================================================================

#[tokio::test]
async fn checkout_webhook_issues_license() {
    let app = TestApp::new();
    let key = activate(&app).await;

    assert!(key.starts_with("dd_"));

    let (status, body) = app
        .get(&format!("/api/verify-license?userId={}&licenseKey={}", USER, key))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": true, "isPro": true }));
}

#[tokio::test]
async fn replayed_checkout_webhook_keeps_the_same_key() {
    let app = TestApp::new();
    let first = activate(&app).await;
    let second = activate(&app).await;

    assert_eq!(first, second);
    assert_eq!(app.store.count().await, 1);
}

#[tokio::test]
async fn subscription_deleted_revokes_access_but_keeps_record() {
    let app = TestApp::new();
    let key = activate(&app).await;

    let (status, _) = app
        .webhook(subscription_event("customer.subscription.deleted", "active"))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = app.get(&format!("/api/get-license?userId={}", USER)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");

    let (_, body) = app
        .post(
            "/api/verify-license",
            json!({ "userId": USER, "licenseKey": key }),
        )
        .await;
    assert_eq!(body, json!({ "valid": false, "isPro": false }));

    assert_eq!(app.store.count().await, 1);
}

#[tokio::test]
async fn past_due_then_active_restores_original_key() {
    let app = TestApp::new();
    let key = activate(&app).await;

    app.webhook(subscription_event("customer.subscription.updated", "past_due"))
        .await;
    let (status, _) = app.get(&format!("/api/get-license?userId={}", USER)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    app.webhook(subscription_event("customer.subscription.updated", "active"))
        .await;
    let (status, body) = app.get(&format!("/api/get-license?userId={}", USER)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["licenseKey"], key.as_str());
}

#[tokio::test]
async fn webhook_for_unknown_customer_is_acknowledged() {
    let app = TestApp::new();

    let (status, body) = app
        .webhook(subscription_event("customer.subscription.updated", "active"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);
    assert_eq!(app.store.count().await, 0);
}

#[tokio::test]
async fn unhandled_event_type_is_acknowledged() {
    let app = TestApp::new();

    let (status, _) = app
        .webhook(json!({
            "id": "evt_other",
            "type": "customer.created",
            "created": 1_700_000_000,
            "data": { "object": { "id": "cus_x" } }
        }))
        .await;

    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn webhook_with_bad_signature_is_rejected() {
    let app = TestApp::new();
    let payload = checkout_completed().to_string();
    let signature = MockPaymentProvider::sign("whsec_wrong", 1_700_000_000, payload.as_bytes());

    let (status, body) = app
        .send(
            Request::post("/api/webhook")
                .header("Stripe-Signature", signature)
                .body(Body::from(payload))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_WEBHOOK_SIGNATURE");
    assert_eq!(app.store.count().await, 0);
}

#[tokio::test]
async fn webhook_without_signature_header_is_rejected() {
    let app = TestApp::new();

    let (status, body) = app
        .send(
            Request::post("/api/webhook")
                .body(Body::from(checkout_completed().to_string()))
                .unwrap(),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "INVALID_WEBHOOK_SIGNATURE");
    assert!(!app.provider.was_called("verify_webhook"));
}

// =============================================================================
// License Queries
// =============================================================================

#[tokio::test]
async fn get_license_requires_user_id() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/get-license").await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn get_license_for_unknown_user_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app.get("/api/get-license?userId=nobody").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "No license found for this user");
}

#[tokio::test]
async fn verify_license_rejects_wrong_key() {
    let app = TestApp::new();
    activate(&app).await;

    let (status, body) = app
        .get(&format!(
            "/api/verify-license?userId={}&licenseKey=dd_1_notmine",
            USER
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": false, "isPro": false }));
}

#[tokio::test]
async fn verify_license_requires_key() {
    let app = TestApp::new();

    let (status, _) = app
        .post("/api/verify-license", json!({ "userId": USER }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn verify_pro_status_for_unknown_user_is_basic() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/verify-pro-status", json!({ "userId": "nobody" }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "valid": false, "plan": "basic" }));
}

#[tokio::test]
async fn verify_pro_status_picks_up_cancellation_at_provider() {
    let app = TestApp::new();
    activate(&app).await;

    app.provider
        .add_subscription(MockPaymentProvider::subscription(SUBSCRIPTION, CUSTOMER, "canceled"));

    let (status, body) = app
        .post("/api/verify-pro-status", json!({ "userId": USER }))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert_eq!(body["plan"], "basic");
    assert!(body.get("licenseKey").is_none());
}

// =============================================================================
// Checkout and Portal
// =============================================================================

#[tokio::test]
async fn checkout_session_returns_url_and_links_customer() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/create-checkout-session",
            json!({ "userId": USER, "clientId": "abcdefghijklmnop" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["checkoutUrl"].as_str().unwrap().starts_with("https://"));
    assert!(body["sessionId"].as_str().unwrap().starts_with("cs_"));

    let user = UserId::new(USER).unwrap();
    let record = app.store.find_by_user(&user).await.unwrap().unwrap();
    assert!(record.billing_customer_id.is_some());
    assert_eq!(record.plan, Plan::Basic);
}

#[tokio::test]
async fn checkout_session_requires_client_id() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/create-checkout-session", json!({ "userId": USER }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert!(!app.provider.was_called("create_customer"));
}

#[tokio::test]
async fn portal_session_without_customer_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app
        .post(
            "/api/create-portal-session",
            json!({ "userId": USER, "extensionId": "abcdefghijklmnop" }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["message"], "No active subscription found");
}

#[tokio::test]
async fn portal_session_for_subscriber_returns_url() {
    let app = TestApp::new();
    activate(&app).await;

    let (status, body) = app
        .post(
            "/api/create-portal-session",
            json!({ "userId": USER, "clientId": "abcdefghijklmnop" }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert!(body["portalUrl"].as_str().unwrap().starts_with("https://"));
}

// =============================================================================
// Fallback Activation
// =============================================================================

fn paid_session(id: &str, owner: &str) -> CheckoutSessionDetails {
    CheckoutSessionDetails {
        id: id.to_string(),
        customer_id: Some(CUSTOMER.to_string()),
        subscription_id: Some(SUBSCRIPTION.to_string()),
        payment_status: "paid".to_string(),
        mode: "subscription".to_string(),
        client_reference_id: Some(owner.to_string()),
        metadata_user_id: Some(owner.to_string()),
        promotion_code: None,
    }
}

#[tokio::test]
async fn auto_create_license_activates_from_paid_session() {
    let app = TestApp::new();
    app.provider.add_checkout_session(paid_session("cs_paid", USER));
    app.provider
        .add_subscription(MockPaymentProvider::subscription(SUBSCRIPTION, CUSTOMER, "active"));

    let (status, body) = app
        .post(
            "/api/auto-create-license",
            json!({ "sessionId": "cs_paid", "userId": USER }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "License created successfully");

    let (_, again) = app
        .post(
            "/api/auto-create-license",
            json!({ "sessionId": "cs_paid", "userId": USER }),
        )
        .await;
    assert_eq!(again["message"], "License already exists");
    assert_eq!(again["licenseKey"], body["licenseKey"]);
}

#[tokio::test]
async fn auto_create_license_rejects_foreign_session() {
    let app = TestApp::new();
    app.provider.add_checkout_session(paid_session("cs_other", "someone-else"));

    let (status, body) = app
        .post(
            "/api/auto-create-license",
            json!({ "sessionId": "cs_other", "userId": USER }),
        )
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert_eq!(app.store.count().await, 0);
}

#[tokio::test]
async fn auto_create_license_unknown_session_is_not_found() {
    let app = TestApp::new();

    let (status, _) = app
        .post(
            "/api/auto-create-license",
            json!({ "sessionId": "cs_missing", "userId": USER }),
        )
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

// =============================================================================
// Request Bodies
// =============================================================================

fn raw_post(uri: &str, content_type: Option<&str>, body: &'static str) -> Request<Body> {
    let mut builder = Request::post(uri);
    if let Some(content_type) = content_type {
        builder = builder.header("content-type", content_type);
    }
    builder.body(Body::from(body)).unwrap()
}

#[tokio::test]
async fn malformed_json_body_uses_error_envelope() {
    let app = TestApp::new();

    let (status, body) = app
        .send(raw_post(
            "/api/verify-pro-status",
            Some("application/json"),
            "{\"userId\": ",
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert!(body["error"]["message"].is_string());
}

#[tokio::test]
async fn missing_content_type_uses_error_envelope() {
    let app = TestApp::new();

    let (status, body) = app
        .send(raw_post(
            "/api/create-checkout-session",
            None,
            "{\"userId\":\"user-42\",\"clientId\":\"abc\"}",
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
    assert!(!app.provider.was_called("create_checkout_session"));
}

#[tokio::test]
async fn empty_body_uses_error_envelope() {
    let app = TestApp::new();

    let (status, body) = app
        .send(raw_post("/api/auto-create-license", Some("application/json"), ""))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn wrongly_typed_field_uses_error_envelope() {
    let app = TestApp::new();

    let (status, body) = app
        .post("/api/verify-license", json!({ "userId": 42, "licenseKey": "dd_x" }))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
}

// =============================================================================
// Health and Debug Surface
// =============================================================================

#[tokio::test]
async fn health_reports_ok() {
    let app = TestApp::new();

    let (status, body) = app.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn debug_routes_list_and_delete_in_development() {
    let app = TestApp::new();
    let user = UserId::new(USER).unwrap();
    app.store
        .insert(EntitlementRecord::new(user, Timestamp::now()))
        .await;

    let (status, body) = app.get("/api/debug/licenses").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["count"], 1);

    let (status, _) = app
        .send(
            Request::delete(format!("/api/debug/licenses/{}", USER))
                .body(Body::empty())
                .unwrap(),
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(app.store.count().await, 0);
}

#[tokio::test]
async fn debug_routes_are_not_mounted_in_production() {
    let app = TestApp::in_environment(Environment::Production);

    let (status, _) = app.get("/api/debug/licenses").await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn debug_create_license_activates_from_latest_subscription() {
    let app = TestApp::new();
    app.provider
        .add_subscription(MockPaymentProvider::subscription(SUBSCRIPTION, CUSTOMER, "active"));

    let (status, body) = app
        .get(&format!(
            "/api/debug/create-license?userId={}&customerId={}",
            USER, CUSTOMER
        ))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    let key = body["licenseKey"].as_str().unwrap().to_string();

    let record = app
        .store
        .find_by_user(&UserId::new(USER).unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.plan, Plan::Pro);
    assert_eq!(record.billing_customer_id.as_deref(), Some(CUSTOMER));
    assert_eq!(record.license_key.map(|k| k.to_string()), Some(key));
}

#[tokio::test]
async fn debug_create_license_without_subscription_is_not_found() {
    let app = TestApp::new();

    let (status, body) = app
        .get(&format!(
            "/api/debug/create-license?userId={}&customerId={}",
            USER, CUSTOMER
        ))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
    assert_eq!(app.store.count().await, 0);
}

#[tokio::test]
async fn debug_create_license_rejects_inactive_subscription() {
    let app = TestApp::new();
    app.provider
        .add_subscription(MockPaymentProvider::subscription(SUBSCRIPTION, CUSTOMER, "past_due"));

    let (status, body) = app
        .get(&format!(
            "/api/debug/create-license?userId={}&customerId={}",
            USER, CUSTOMER
        ))
        .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "VALIDATION_FAILED");
}

#[tokio::test]
async fn debug_create_license_is_not_mounted_in_production() {
    let app = TestApp::in_environment(Environment::Production);

    let (status, _) = app
        .get(&format!(
            "/api/debug/create-license?userId={}&customerId={}",
            USER, CUSTOMER
        ))
        .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
