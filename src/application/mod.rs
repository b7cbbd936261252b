//! Application layer - Commands, Queries, and Handlers.
//!
//! This layer orchestrates domain operations and coordinates between ports.
//! Command handlers (write) and query handlers (read) are kept separate.

pub mod handlers;

pub use handlers::entitlement::{
    ActivateCustomerHandler, AutoCreateLicenseHandler, CreateCheckoutSessionHandler,
    CreatePortalSessionHandler, DeleteEntitlementHandler, GetLicenseHandler,
    HandleBillingWebhookHandler, ListEntitlementsHandler, ReconcileEntitlementHandler,
    VerifyLicenseHandler, VerifyLiveStatusHandler,
};
