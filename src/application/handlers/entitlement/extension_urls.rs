//! Redirect URLs back into the browser extension.

use crate::domain::entitlement::EntitlementError;

/// Checkout substitutes the real session id for this placeholder.
pub const CHECKOUT_SESSION_PLACEHOLDER: &str = "{CHECKOUT_SESSION_ID}";

/// Extension ids are URL hosts; anything outside `[A-Za-z0-9_-]` is refused.
pub fn validate_client_id(client_id: &str) -> Result<&str, EntitlementError> {
    let client_id = client_id.trim();
    if client_id.is_empty() {
        return Err(EntitlementError::validation("clientId", "cannot be empty"));
    }
    if !client_id
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(EntitlementError::validation(
            "clientId",
            "must contain only letters, digits, '-' or '_'",
        ));
    }
    Ok(client_id)
}

pub fn extension_url(client_id: &str, path: &str) -> String {
    format!("chrome-extension://{}/{}", client_id, path)
}

pub fn checkout_success_url(client_id: &str) -> String {
    format!(
        "{}?success=true&session_id={}",
        extension_url(client_id, "pricing.html"),
        CHECKOUT_SESSION_PLACEHOLDER
    )
}

pub fn checkout_cancel_url(client_id: &str) -> String {
    extension_url(client_id, "pricing.html")
}

pub fn portal_return_url(client_id: &str) -> String {
    extension_url(client_id, "options.html")
}
