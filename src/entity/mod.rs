//! Tracking entities: experiments, runs, metrics, params, and tags
//!
//! ## Entity graph
//!
//! ```text
//! Experiment (1) ──< Run (N)
//!                     │
//!                     ├──< Metric (N) [append-only time series]
//!                     ├──< Param  (N) [write-once]
//!                     └──< RunTag (N) [upsert]
//! ```
//!
//! Entities are plain data: validated constructors for caller-supplied
//! values, accessors, and serde derives as the wire-representation hook.
//! The store materializes `Experiment` and `Run` snapshots from the
//! persistence layer; callers never hold live handles into it.

mod experiment;
mod metric;
mod param;
mod run;
mod stage;
mod tag;

pub use experiment::Experiment;
pub use metric::Metric;
pub use param::Param;
pub use run::{Run, RunData, RunInfo, RunStatus};
pub use stage::{LifecycleStage, ViewType};
pub use tag::RunTag;

use crate::{Error, Result};

/// Maximum length of a metric/param/tag key.
pub const MAX_ENTITY_KEY_LENGTH: usize = 250;

/// Maximum length of a param value.
pub const MAX_PARAM_VALUE_LENGTH: usize = 250;

/// Maximum length of a tag value.
pub const MAX_TAG_VALUE_LENGTH: usize = 250;

/// Maximum length of an experiment name.
pub const MAX_EXPERIMENT_NAME_LENGTH: usize = 256;

/// Validate a metric/param/tag key.
///
/// Keys must be non-empty, at most [`MAX_ENTITY_KEY_LENGTH`] characters, and
/// restricted to alphanumerics, `_`, `-`, `.`, `/`, and spaces.
pub(crate) fn validate_key(kind: &str, key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidArgument(format!("{kind} key must not be empty")));
    }
    if key.len() > MAX_ENTITY_KEY_LENGTH {
        return Err(Error::InvalidArgument(format!(
            "{kind} key '{key}' exceeds {MAX_ENTITY_KEY_LENGTH} characters"
        )));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ' '))
    {
        return Err(Error::InvalidArgument(format!(
            "{kind} key '{key}' contains characters outside [alphanumeric _ - . / space]"
        )));
    }
    Ok(())
}

/// Validate an experiment name: non-empty and length-bounded.
pub(crate) fn validate_experiment_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::InvalidArgument(
            "experiment name must not be empty".to_string(),
        ));
    }
    if name.len() > MAX_EXPERIMENT_NAME_LENGTH {
        return Err(Error::InvalidArgument(format!(
            "experiment name exceeds {MAX_EXPERIMENT_NAME_LENGTH} characters"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_key_accepts_common_names() {
        for key in ["loss", "val/accuracy", "learning_rate", "f1.macro", "top-5 acc"] {
            assert!(validate_key("metric", key).is_ok(), "rejected {key}");
        }
    }

    #[test]
    fn test_validate_key_rejects_empty_and_invalid() {
        assert!(validate_key("metric", "").is_err());
        assert!(validate_key("metric", "loss\n").is_err());
        assert!(validate_key("param", "a=b").is_err());
        assert!(validate_key("tag", &"k".repeat(MAX_ENTITY_KEY_LENGTH + 1)).is_err());
    }

    #[test]
    fn test_validate_experiment_name() {
        assert!(validate_experiment_name("mnist baseline").is_ok());
        assert!(validate_experiment_name("").is_err());
        assert!(validate_experiment_name(&"n".repeat(MAX_EXPERIMENT_NAME_LENGTH + 1)).is_err());
    }
}
