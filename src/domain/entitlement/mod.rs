//! Entitlement domain.
//!
//! One record per user holds the plan, billing references and license key.
//! The reconciler maps billing signals onto that record; everything that
//! reads entitlement goes through [`EntitlementRecord::is_entitled`].

mod errors;
mod license;
mod patch;
mod plan;
mod reconciler;
mod record;
mod state;
mod status;

pub use errors::EntitlementError;
pub use license::{LicenseKey, LicenseKeyGenerator, RandomLicenseKeyGenerator};
pub use patch::{EntitlementPatch, FieldPatch};
pub use plan::Plan;
pub use reconciler::{plan_patch, reconcile, BillingSignal, StatusMapping};
pub use record::EntitlementRecord;
pub use state::EntitlementState;
pub use status::EntitlementStatus;
