//! Foundation module - Shared domain primitives.
//!
//! Identifiers, timestamps and error types that form the vocabulary
//! of the Decision Drift billing domain.

mod errors;
mod ids;
mod timestamp;

pub use errors::{DomainError, ErrorCode, ValidationError};
pub use ids::UserId;
pub use timestamp::Timestamp;
