//! License keys handed to the extension once Pro is activated.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::domain::foundation::{Timestamp, ValidationError};

const LICENSE_PREFIX: &str = "dd_";
const SUFFIX_LEN: usize = 12;

/// Opaque license token. Format: `dd_<unix-millis>_<suffix>`.
///
/// Keys issued by other tooling are accepted as long as they are non-empty;
/// only issuance enforces the format.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct LicenseKey(String);

impl LicenseKey {
    pub fn new(key: impl Into<String>) -> Result<Self, ValidationError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(ValidationError::empty_field("license_key"));
        }
        Ok(Self(key))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Builds a key from its parts.
    pub fn compose(issued_at: Timestamp, suffix: &str) -> Self {
        Self(format!(
            "{}{}_{}",
            LICENSE_PREFIX,
            issued_at.as_unix_millis(),
            suffix
        ))
    }

    /// True for keys shaped like the ones this service issues.
    pub fn is_well_formed(&self) -> bool {
        let Some(rest) = self.0.strip_prefix(LICENSE_PREFIX) else {
            return false;
        };
        match rest.split_once('_') {
            Some((millis, suffix)) => {
                !millis.is_empty()
                    && millis.bytes().all(|b| b.is_ascii_digit())
                    && !suffix.is_empty()
            }
            None => false,
        }
    }
}

impl fmt::Display for LicenseKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for LicenseKey {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LicenseKey> for String {
    fn from(key: LicenseKey) -> Self {
        key.0
    }
}

/// Source of fresh license keys.
pub trait LicenseKeyGenerator: Send + Sync {
    fn generate(&self, now: Timestamp) -> LicenseKey;
}

/// Production generator: millisecond timestamp plus a UUIDv4-derived suffix.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomLicenseKeyGenerator;

impl LicenseKeyGenerator for RandomLicenseKeyGenerator {
    fn generate(&self, now: Timestamp) -> LicenseKey {
        let uuid = Uuid::new_v4().simple().to_string();
        LicenseKey::compose(now, &uuid[..SUFFIX_LEN])
    }
}
