//! Entitlement handlers.
//!
//! Command and query handlers for the activation gateway and webhook
//! dispatch:
//!
//! ## Commands
//! - Reconciling a billing signal into the stored record
//! - Auto-creating a license from a completed checkout
//! - Activating a user from a billing customer (development only)
//! - Creating checkout and billing portal sessions
//! - Processing payment webhooks
//! - Deleting a record (development only)
//!
//! ## Queries
//! - License lookup and verification
//! - Live Pro status re-check against the provider
//! - Listing records (development only)

mod activate_customer;
mod auto_create_license;
mod create_checkout_session;
mod create_portal_session;
mod extension_urls;
mod get_license;
mod handle_billing_webhook;
mod manage_entitlements;
mod provider_call;
mod reconcile_entitlement;
mod verify_license;
mod verify_live_status;

// Commands
pub use activate_customer::{ActivateCustomerCommand, ActivateCustomerHandler};
pub use auto_create_license::{
    AutoCreateLicenseCommand, AutoCreateLicenseHandler, AutoCreateLicenseResult,
};
pub use create_checkout_session::{
    CreateCheckoutSessionCommand, CreateCheckoutSessionHandler, CreateCheckoutSessionResult,
};
pub use create_portal_session::{
    CreatePortalSessionCommand, CreatePortalSessionHandler, CreatePortalSessionResult,
};
pub use handle_billing_webhook::{
    HandleBillingWebhookCommand, HandleBillingWebhookHandler, HandleBillingWebhookResult,
};
pub use manage_entitlements::{
    DeleteEntitlementCommand, DeleteEntitlementHandler, ListEntitlementsHandler,
    ListEntitlementsQuery, ListEntitlementsResult,
};
pub use reconcile_entitlement::{
    ReconcileEntitlementCommand, ReconcileEntitlementHandler, ReconcileEntitlementResult,
};

// Queries
pub use get_license::{GetLicenseHandler, GetLicenseQuery, GetLicenseResult};
pub use verify_license::{VerifyLicenseHandler, VerifyLicenseQuery, VerifyLicenseResult};
pub use verify_live_status::{
    VerifyLiveStatusHandler, VerifyLiveStatusQuery, VerifyLiveStatusResult,
};

pub use extension_urls::CHECKOUT_SESSION_PLACEHOLDER;
pub use provider_call::DEFAULT_PROVIDER_TIMEOUT;
