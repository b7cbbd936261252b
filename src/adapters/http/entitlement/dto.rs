//! HTTP DTOs (Data Transfer Objects) for entitlement endpoints.
//!
//! These types define the JSON request/response structure the extension
//! talks to. Field names are camelCase on the wire. Request fields are
//! optional so that a missing value becomes a 400 with our error body
//! rather than an extractor rejection.

use serde::{Deserialize, Serialize};

use crate::application::handlers::entitlement::{
    AutoCreateLicenseResult, CreateCheckoutSessionResult, VerifyLiveStatusResult,
};
use crate::domain::entitlement::{EntitlementRecord, Plan};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// `?userId=` for license lookup.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdParams {
    #[serde(default)]
    pub user_id: Option<String>,
}

/// License verification, via query string or JSON body.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLicenseRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub license_key: Option<String>,
}

/// Checkout or portal creation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionSessionRequest {
    #[serde(default)]
    pub user_id: Option<String>,
    /// Browser extension id; older clients send `extensionId`.
    #[serde(default, alias = "extensionId")]
    pub client_id: Option<String>,
}

/// Fallback activation after checkout.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCreateLicenseRequest {
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// `?userId=&customerId=` for manual activation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugCreateLicenseParams {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseResponse {
    pub license_key: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyLicenseResponse {
    pub valid: bool,
    pub is_pro: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProStatusResponse {
    pub valid: bool,
    pub plan: Plan,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
}

impl From<VerifyLiveStatusResult> for ProStatusResponse {
    fn from(result: VerifyLiveStatusResult) -> Self {
        Self {
            valid: result.valid,
            plan: result.plan,
            license_key: result.license_key.map(String::from),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub checkout_url: String,
    pub session_id: String,
}

impl From<CreateCheckoutSessionResult> for CheckoutResponse {
    fn from(result: CreateCheckoutSessionResult) -> Self {
        Self {
            checkout_url: result.checkout_url,
            session_id: result.session_id,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortalResponse {
    pub portal_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AutoCreateLicenseResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub license_key: Option<String>,
    pub message: String,
}

impl From<AutoCreateLicenseResult> for AutoCreateLicenseResponse {
    fn from(result: AutoCreateLicenseResult) -> Self {
        Self {
            success: result.success,
            license_key: result.license_key.map(String::from),
            message: result.message,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookAckResponse {
    pub received: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
}

/// Development-only dump of the store.
#[derive(Debug, Clone, Serialize)]
pub struct DebugLicensesResponse {
    pub count: usize,
    pub licenses: Vec<EntitlementRecord>,
}

/// Error response body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorBody {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorResponse {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ErrorBody {
                code: code.into(),
                message: message.into(),
            },
        }
    }
}
