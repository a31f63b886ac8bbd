//! Metric - one append-only time-series entry

use serde::{Deserialize, Serialize};

use super::validate_key;
use crate::{Error, Result};

/// A single metric data point scoped to a run.
///
/// Multiple entries may share a key (time series); history entries are never
/// updated or deleted. The *current* value for a key is the entry with the
/// lexicographically greatest `(step, timestamp, value)` tuple.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metric {
    key: String,
    value: f64,
    timestamp: i64,
    step: i64,
}

impl Metric {
    /// Create a validated metric entry.
    ///
    /// # Arguments
    ///
    /// * `key` - Metric name (e.g. "loss", "accuracy")
    /// * `value` - Recorded value; must be finite
    /// * `timestamp` - Wall-clock time of the observation, epoch milliseconds
    /// * `step` - Training step or epoch number
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty/over-length/invalid key or a
    /// NaN/infinite value. Rejecting non-finite values here keeps the ledger
    /// free of entries the current-value tie-break cannot order.
    pub fn new(key: impl Into<String>, value: f64, timestamp: i64, step: i64) -> Result<Self> {
        let key = key.into();
        validate_key("metric", &key)?;
        if !value.is_finite() {
            return Err(Error::InvalidArgument(format!(
                "metric '{key}' value must be finite, got {value}"
            )));
        }
        Ok(Self { key, value, timestamp, step })
    }

    /// Construct from trusted storage columns, skipping validation.
    pub(crate) const fn from_parts(key: String, value: f64, timestamp: i64, step: i64) -> Self {
        Self { key, value, timestamp, step }
    }

    /// Get the metric key.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Get the recorded value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Get the observation timestamp (epoch milliseconds).
    #[must_use]
    pub const fn timestamp(&self) -> i64 {
        self.timestamp
    }

    /// Get the step number.
    #[must_use]
    pub const fn step(&self) -> i64 {
        self.step
    }

    /// Tie-break ordering for the current-value projection:
    /// `(step, timestamp, value)`, lexicographic.
    ///
    /// Values are finite by construction, so the `f64` comparison is total.
    #[must_use]
    pub fn supersedes(&self, other: &Self) -> bool {
        (self.step, self.timestamp, self.value) >= (other.step, other.timestamp, other.value)
    }
}
