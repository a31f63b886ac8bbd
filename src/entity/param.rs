//! Param - a write-once key/value pair

use serde::{Deserialize, Serialize};

use super::{validate_key, MAX_PARAM_VALUE_LENGTH};
use crate::{Error, Result};

/// A hyperparameter recorded against a run.
///
/// A key is write-once: once logged, re-logging the identical value is a
/// no-op and any different value fails with `ImmutableParam`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Param {
    key: String,
    value: String,
}

impl Param {
    /// Create a validated param.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty/over-length/invalid key or an
    /// over-length value.
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Result<Self> {
        let key = key.into();
        let value = value.into();
        validate_key("param", &key)?;
        if value.len() > MAX_PARAM_VALUE_LENGTH {
            return Err(Error::InvalidArgument(format!(
                "param '{key}' value exceeds {MAX_PARAM_VALUE_LENGTH} characters"
            )));
        }
        Ok(Self { key, value })
    }

    /// Construct from trusted storage columns, skipping validation.
    pub(crate) const fn from_parts(key: String, value: String) -> Self {
        Self { key, value }
    }

    /// Get the param key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the param value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }
}
