//! Entitlement-specific error types.
//!
//! # HTTP Status Mapping
//!
//! | Error | HTTP Status |
//! |-------|-------------|
//! | Validation | 400 |
//! | NotFound | 404 |
//! | Conflict | 409 |
//! | Upstream | 500 |
//! | InvalidSignature | 400 |
//! | Storage | 500 |

use crate::domain::foundation::{DomainError, ErrorCode, ValidationError};

/// Errors surfaced by the activation gateway and webhook dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntitlementError {
    /// A required input was missing or malformed.
    Validation { field: String, message: String },

    /// No record, license or customer for the request.
    NotFound(String),

    /// A uniqueness invariant of the store was violated.
    Conflict(String),

    /// The payment provider call failed or timed out.
    Upstream(String),

    /// Webhook signature did not verify. Nothing was mutated.
    InvalidSignature(String),

    /// The entitlement store failed.
    Storage(String),
}

impl EntitlementError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        EntitlementError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        EntitlementError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        EntitlementError::Conflict(message.into())
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        EntitlementError::Upstream(message.into())
    }

    pub fn invalid_signature(message: impl Into<String>) -> Self {
        EntitlementError::InvalidSignature(message.into())
    }

    pub fn storage(message: impl Into<String>) -> Self {
        EntitlementError::Storage(message.into())
    }

    /// Machine-readable code for response bodies.
    pub fn code(&self) -> &'static str {
        match self {
            EntitlementError::Validation { .. } => "VALIDATION_FAILED",
            EntitlementError::NotFound(_) => "NOT_FOUND",
            EntitlementError::Conflict(_) => "CONFLICT",
            EntitlementError::Upstream(_) => "UPSTREAM_ERROR",
            EntitlementError::InvalidSignature(_) => "INVALID_WEBHOOK_SIGNATURE",
            EntitlementError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Returns a user-facing error message.
    pub fn message(&self) -> String {
        match self {
            EntitlementError::Validation { field, message } => {
                format!("Validation failed for '{}': {}", field, message)
            }
            EntitlementError::NotFound(msg) => msg.clone(),
            EntitlementError::Conflict(msg) => format!("Conflict: {}", msg),
            EntitlementError::Upstream(msg) => format!("Payment provider error: {}", msg),
            EntitlementError::InvalidSignature(msg) => {
                format!("Webhook signature verification failed: {}", msg)
            }
            EntitlementError::Storage(msg) => format!("Storage error: {}", msg),
        }
    }

    /// Internal failures whose details must not leak in production.
    pub fn is_internal(&self) -> bool {
        matches!(self, EntitlementError::Upstream(_) | EntitlementError::Storage(_))
    }

    /// Store failures make the provider redeliver the webhook.
    pub fn should_provider_retry(&self) -> bool {
        matches!(self, EntitlementError::Storage(_))
    }
}

impl std::fmt::Display for EntitlementError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for EntitlementError {}

impl From<DomainError> for EntitlementError {
    fn from(err: DomainError) -> Self {
        match err.code {
            ErrorCode::ValidationFailed => {
                let field = err
                    .details
                    .get("field")
                    .cloned()
                    .unwrap_or_else(|| "request".to_string());
                EntitlementError::validation(field, err.message)
            }
            ErrorCode::NotFound => EntitlementError::NotFound(err.message),
            ErrorCode::Conflict => EntitlementError::Conflict(err.message),
            ErrorCode::ExternalServiceError => EntitlementError::Upstream(err.message),
            ErrorCode::DatabaseError | ErrorCode::InternalError => {
                EntitlementError::Storage(err.message)
            }
        }
    }
}

impl From<ValidationError> for EntitlementError {
    fn from(err: ValidationError) -> Self {
        EntitlementError::validation(err.field().to_string(), err.to_string())
    }
}
