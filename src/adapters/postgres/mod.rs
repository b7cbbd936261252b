//! PostgreSQL adapters - Database implementations for storage ports.

mod entitlement_store;

pub use entitlement_store::PostgresEntitlementStore;
