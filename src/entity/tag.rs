//! RunTag - a mutable key/value annotation

use serde::{Deserialize, Serialize};

use super::{validate_key, MAX_TAG_VALUE_LENGTH};
use crate::{Error, Result};

/// A user-defined tag on a run.
///
/// Tags have upsert semantics: a later write with the same key replaces the
/// prior value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunTag {
    key: String,
    value: String,
}

impl RunTag {
    /// Create a validated tag.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty/over-length/invalid key or an
    /// over-length value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let value = value.into();
        validate_key("tag", &key)?;
        if value.len() > MAX_TAG_VALUE_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "tag '{key}' value exceeds {MAX_TAG_VALUE_LENGTH} characters"
            )));
        }
        Ok(Self { key, value })
    }

    /// Construct from trusted storage columns, skipping validation.
    pub(crate) const fn from_parts(key: String, value: String) -> Self {
        Self { key, value }
    }

    /// Get the tag key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the tag value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}
