//! Storage Adapters
//!
//! In-process implementation of the `EntitlementStore` port.
//!
//! ## Available Adapters
//!
//! - **InMemoryEntitlementStore** - Stores records in memory (testing/development)
//!
//! The PostgreSQL store lives in `adapters::postgres`.
//!
//! ## Usage
//!
//! ```ignore
//! use adapters::storage::InMemoryEntitlementStore;
//!
//! let store = InMemoryEntitlementStore::new();
//! ```

mod in_memory_entitlement_store;

pub use in_memory_entitlement_store::InMemoryEntitlementStore;
