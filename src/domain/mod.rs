//! Domain layer - billing entitlement model.

pub mod entitlement;
pub mod foundation;
