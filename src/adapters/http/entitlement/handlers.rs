//! HTTP handlers for entitlement endpoints.
//!
//! These handlers connect Axum routes to application layer command/query handlers.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Json, Path, Query, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::IntoResponse;
use serde::de::DeserializeOwned;

use crate::application::handlers::entitlement::{
    ActivateCustomerCommand, ActivateCustomerHandler, AutoCreateLicenseCommand, AutoCreateLicenseHandler, CreateCheckoutSessionCommand,
    CreateCheckoutSessionHandler, CreatePortalSessionCommand, CreatePortalSessionHandler,
    DeleteEntitlementCommand, DeleteEntitlementHandler, GetLicenseHandler, GetLicenseQuery,
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, ListEntitlementsHandler,
    ListEntitlementsQuery, ReconcileEntitlementHandler, VerifyLicenseHandler, VerifyLicenseQuery,
    VerifyLiveStatusHandler, VerifyLiveStatusQuery, DEFAULT_PROVIDER_TIMEOUT,
};
use crate::domain::entitlement::{EntitlementError, LicenseKeyGenerator};
use crate::domain::foundation::{Timestamp, UserId};
use crate::ports::{EntitlementStore, PaymentProvider};

use super::dto::{
    AutoCreateLicenseRequest, AutoCreateLicenseResponse, CheckoutResponse,
    DebugCreateLicenseParams, DebugLicensesResponse, ErrorResponse, ExtensionSessionRequest, HealthResponse, LicenseResponse, PortalResponse,
    ProStatusResponse, UserIdParams, VerifyLicenseRequest, VerifyLicenseResponse,
    WebhookAckResponse,
};

const STRIPE_SIGNATURE_HEADER: &str = "Stripe-Signature";

// ════════════════════════════════════════════════════════════════════════════════
// Application State
// ════════════════════════════════════════════════════════════════════════════════

/// Shared application state containing all dependencies.
///
/// This struct is cloned for each request and contains Arc-wrapped dependencies
/// for efficient sharing across handlers.
#[derive(Clone)]
pub struct EntitlementAppState {
    pub store: Arc<dyn EntitlementStore>,
    pub payment_provider: Arc<dyn PaymentProvider>,
    pub license_keys: Arc<dyn LicenseKeyGenerator>,
    /// Bound on every provider call made while serving a request.
    pub provider_timeout: Duration,
    /// Hide internal error details from responses.
    pub redact_internal_errors: bool,
}

impl EntitlementAppState {
    pub fn new(
        store: Arc<dyn EntitlementStore>,
        payment_provider: Arc<dyn PaymentProvider>,
        license_keys: Arc<dyn LicenseKeyGenerator>,
    ) -> Self {
        Self {
            store,
            payment_provider,
            license_keys,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
            redact_internal_errors: false,
        }
    }

    pub fn with_provider_timeout(mut self, timeout: Duration) -> Self {
        self.provider_timeout = timeout;
        self
    }

    pub fn with_redacted_errors(mut self, redact: bool) -> Self {
        self.redact_internal_errors = redact;
        self
    }

    /// Create handlers on demand from the shared state.
    pub fn reconcile_handler(&self) -> ReconcileEntitlementHandler {
        ReconcileEntitlementHandler::new(self.store.clone(), self.license_keys.clone())
    }

    pub fn get_license_handler(&self) -> GetLicenseHandler {
        GetLicenseHandler::new(self.store.clone())
    }

    pub fn verify_license_handler(&self) -> VerifyLicenseHandler {
        VerifyLicenseHandler::new(self.store.clone())
    }

    pub fn verify_live_status_handler(&self) -> VerifyLiveStatusHandler {
        VerifyLiveStatusHandler::new(
            self.store.clone(),
            self.payment_provider.clone(),
            self.reconcile_handler(),
        )
        .with_timeout(self.provider_timeout)
    }

    pub fn auto_create_license_handler(&self) -> AutoCreateLicenseHandler {
        AutoCreateLicenseHandler::new(
            self.store.clone(),
            self.payment_provider.clone(),
            self.reconcile_handler(),
        )
        .with_timeout(self.provider_timeout)
    }

    pub fn activate_customer_handler(&self) -> ActivateCustomerHandler {
        ActivateCustomerHandler::new(self.payment_provider.clone(), self.reconcile_handler())
            .with_timeout(self.provider_timeout)
    }

    pub fn checkout_handler(&self) -> CreateCheckoutSessionHandler {
        CreateCheckoutSessionHandler::new(self.store.clone(), self.payment_provider.clone())
            .with_timeout(self.provider_timeout)
    }

    pub fn portal_handler(&self) -> CreatePortalSessionHandler {
        CreatePortalSessionHandler::new(self.store.clone(), self.payment_provider.clone())
            .with_timeout(self.provider_timeout)
    }

    pub fn webhook_handler(&self) -> HandleBillingWebhookHandler {
        HandleBillingWebhookHandler::new(
            self.store.clone(),
            self.payment_provider.clone(),
            self.reconcile_handler(),
        )
        .with_timeout(self.provider_timeout)
    }

    pub fn list_handler(&self) -> ListEntitlementsHandler {
        ListEntitlementsHandler::new(self.store.clone())
    }

    pub fn delete_handler(&self) -> DeleteEntitlementHandler {
        DeleteEntitlementHandler::new(self.store.clone())
    }

    fn api_error(&self, error: EntitlementError) -> ApiError {
        ApiError {
            error,
            redact: self.redact_internal_errors,
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Input Helpers
// ════════════════════════════════════════════════════════════════════════════════

fn required<'a>(value: &'a Option<String>, field: &str) -> Result<&'a str, EntitlementError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(EntitlementError::validation(field, "is required")),
    }
}

fn required_user_id(value: &Option<String>) -> Result<UserId, EntitlementError> {
    let raw = required(value, "userId")?;
    UserId::new(raw).map_err(|_| EntitlementError::validation("userId", "is required"))
}

/// JSON body extractor whose rejections use the API error body.
///
/// A missing or non-JSON content type and an unparseable body all
/// answer 400 `VALIDATION_FAILED` instead of axum's plain-text 415/422.
pub struct ApiJson<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(ApiJson(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    tracing::debug!(status = %rejection.status(), reason = %rejection.body_text(), "Rejected request body");
    let message = match rejection {
        JsonRejection::MissingJsonContentType(_) => {
            "Expected request with `Content-Type: application/json`".to_string()
        }
        other => other.body_text(),
    };
    ApiError::new(EntitlementError::validation("body", message))
}

// ════════════════════════════════════════════════════════════════════════════════
// Query Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/get-license?userId= - License key of an entitled user
pub async fn get_license(
    State(state): State<EntitlementAppState>,
    Query(params): Query<UserIdParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = required_user_id(&params.user_id).map_err(|e| state.api_error(e))?;

    let result = state
        .get_license_handler()
        .handle(GetLicenseQuery { user_id })
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(LicenseResponse {
        license_key: result.license_key.into(),
    }))
}

/// GET /api/verify-license?userId=&licenseKey=
pub async fn verify_license_query(
    State(state): State<EntitlementAppState>,
    Query(request): Query<VerifyLicenseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_license(state, request).await
}

/// POST /api/verify-license {userId, licenseKey}
pub async fn verify_license_body(
    State(state): State<EntitlementAppState>,
    ApiJson(request): ApiJson<VerifyLicenseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    verify_license(state, request).await
}

async fn verify_license(
    state: EntitlementAppState,
    request: VerifyLicenseRequest,
) -> Result<Json<VerifyLicenseResponse>, ApiError> {
    let parse = || -> Result<VerifyLicenseQuery, EntitlementError> {
        Ok(VerifyLicenseQuery {
            user_id: required_user_id(&request.user_id)?,
            license_key: required(&request.license_key, "licenseKey")?.to_string(),
        })
    };
    let query = parse().map_err(|e| state.api_error(e))?;

    let result = state
        .verify_license_handler()
        .handle(query)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(VerifyLicenseResponse {
        valid: result.valid,
        is_pro: result.is_pro,
    }))
}

/// POST /api/verify-pro-status {userId} - Live re-check with the provider
pub async fn verify_pro_status(
    State(state): State<EntitlementAppState>,
    ApiJson(request): ApiJson<UserIdParams>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = required_user_id(&request.user_id).map_err(|e| state.api_error(e))?;

    let result = state
        .verify_live_status_handler()
        .handle(VerifyLiveStatusQuery { user_id })
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(ProStatusResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Command Handlers
// ════════════════════════════════════════════════════════════════════════════════

/// POST /api/create-checkout-session {userId, clientId}
pub async fn create_checkout_session(
    State(state): State<EntitlementAppState>,
    ApiJson(request): ApiJson<ExtensionSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parse = || -> Result<CreateCheckoutSessionCommand, EntitlementError> {
        Ok(CreateCheckoutSessionCommand {
            user_id: required_user_id(&request.user_id)?,
            client_id: required(&request.client_id, "clientId")?.to_string(),
        })
    };
    let cmd = parse().map_err(|e| state.api_error(e))?;

    let result = state
        .checkout_handler()
        .handle(cmd)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(CheckoutResponse::from(result)))
}

/// POST /api/create-portal-session {userId, clientId}
pub async fn create_portal_session(
    State(state): State<EntitlementAppState>,
    ApiJson(request): ApiJson<ExtensionSessionRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parse = || -> Result<CreatePortalSessionCommand, EntitlementError> {
        Ok(CreatePortalSessionCommand {
            user_id: required_user_id(&request.user_id)?,
            client_id: required(&request.client_id, "clientId")?.to_string(),
        })
    };
    let cmd = parse().map_err(|e| state.api_error(e))?;

    let result = state
        .portal_handler()
        .handle(cmd)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(PortalResponse {
        portal_url: result.portal_url,
    }))
}

/// POST /api/auto-create-license {sessionId, userId}
pub async fn auto_create_license(
    State(state): State<EntitlementAppState>,
    ApiJson(request): ApiJson<AutoCreateLicenseRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let parse = || -> Result<AutoCreateLicenseCommand, EntitlementError> {
        Ok(AutoCreateLicenseCommand {
            session_id: required(&request.session_id, "sessionId")?.to_string(),
            user_id: required_user_id(&request.user_id)?,
        })
    };
    let cmd = parse().map_err(|e| state.api_error(e))?;

    let result = state
        .auto_create_license_handler()
        .handle(cmd)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(AutoCreateLicenseResponse::from(result)))
}

/// POST /api/webhook - Handle Stripe webhook events
///
/// The body is taken raw; the signature covers the exact bytes.
pub async fn handle_stripe_webhook(
    State(state): State<EntitlementAppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let signature = headers
        .get(STRIPE_SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            state.api_error(EntitlementError::invalid_signature(
                "Missing Stripe-Signature header",
            ))
        })?;

    let cmd = HandleBillingWebhookCommand {
        payload: body.to_vec(),
        signature: signature.to_string(),
    };

    let outcome = state
        .webhook_handler()
        .handle(cmd)
        .await
        .map_err(|e| state.api_error(e))?;

    tracing::debug!(outcome = ?outcome, "Webhook acknowledged");

    Ok(Json(WebhookAckResponse { received: true }))
}

/// GET /health
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        timestamp: Timestamp::now().to_rfc3339(),
    })
}

// ════════════════════════════════════════════════════════════════════════════════
// Development Endpoints
// ════════════════════════════════════════════════════════════════════════════════

/// GET /api/debug/licenses - Every stored record
pub async fn list_licenses(
    State(state): State<EntitlementAppState>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .list_handler()
        .handle(ListEntitlementsQuery)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(DebugLicensesResponse {
        count: result.records.len(),
        licenses: result.records,
    }))
}

/// DELETE /api/debug/licenses/:user_id - Administrative cleanup
pub async fn delete_license(
    State(state): State<EntitlementAppState>,
    Path(user_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = required_user_id(&Some(user_id)).map_err(|e| state.api_error(e))?;

    state
        .delete_handler()
        .handle(DeleteEntitlementCommand { user_id })
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/debug/create-license?userId=&customerId= - Manual activation
pub async fn debug_create_license(
    State(state): State<EntitlementAppState>,
    Query(params): Query<DebugCreateLicenseParams>,
) -> Result<impl IntoResponse, ApiError> {
    let parse = || -> Result<ActivateCustomerCommand, EntitlementError> {
        Ok(ActivateCustomerCommand {
            user_id: required_user_id(&params.user_id)?,
            customer_id: required(&params.customer_id, "customerId")?.to_string(),
        })
    };
    let cmd = parse().map_err(|e| state.api_error(e))?;

    let result = state
        .activate_customer_handler()
        .handle(cmd)
        .await
        .map_err(|e| state.api_error(e))?;

    Ok(Json(AutoCreateLicenseResponse::from(result)))
}

// ════════════════════════════════════════════════════════════════════════════════
// Error Handling
// ════════════════════════════════════════════════════════════════════════════════

/// API error type that converts entitlement errors to HTTP responses.
#[derive(Debug)]
pub struct ApiError {
    error: EntitlementError,
    redact: bool,
}

impl ApiError {
    pub fn new(error: EntitlementError) -> Self {
        Self {
            error,
            redact: false,
        }
    }

    pub fn redacted(error: EntitlementError) -> Self {
        Self {
            error,
            redact: true,
        }
    }

    pub fn status(&self) -> StatusCode {
        match &self.error {
            EntitlementError::Validation { .. } => StatusCode::BAD_REQUEST,
            EntitlementError::NotFound(_) => StatusCode::NOT_FOUND,
            EntitlementError::Conflict(_) => StatusCode::CONFLICT,
            EntitlementError::InvalidSignature(_) => StatusCode::BAD_REQUEST,
            EntitlementError::Upstream(_) | EntitlementError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<EntitlementError> for ApiError {
    fn from(error: EntitlementError) -> Self {
        Self::new(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();

        if self.error.is_internal() {
            tracing::error!(code = self.error.code(), error = %self.error, "Request failed");
        }

        let message = if self.redact && self.error.is_internal() {
            "Internal server error".to_string()
        } else {
            self.error.message()
        };

        let body = ErrorResponse::new(self.error.code(), message);
        (status, Json(body)).into_response()
    }
}
