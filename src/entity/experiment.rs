//! Experiment - root entity grouping runs under one artifact root

use serde::{Deserialize, Serialize};

use super::LifecycleStage;

/// A materialized experiment snapshot.
///
/// `experiment_id` is opaque to callers (unique, stable, string-comparable);
/// the auto-incrementing integer underneath is a persistence detail.
/// `artifact_location` is assigned at creation and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Experiment {
    experiment_id: String,
    name: String,
    artifact_location: String,
    lifecycle_stage: LifecycleStage,
    description: Option<String>,
    create_time: i64,
}

impl Experiment {
    /// Construct from trusted storage columns.
    pub(crate) const fn from_parts(
        experiment_id: String,
        name: String,
        artifact_location: String,
        lifecycle_stage: LifecycleStage,
        description: Option<String>,
        create_time: i64,
    ) -> Self {
        Self {
            experiment_id,
            name,
            artifact_location,
            lifecycle_stage,
            description,
            create_time,
        }
    }

    /// Get the experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the experiment name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the root artifact URI for this experiment's runs.
    #[must_use]
    pub fn artifact_location(&self) -> &str {
        &self.artifact_location
    }

    /// Get the lifecycle stage.
    #[must_use]
    pub const fn lifecycle_stage(&self) -> LifecycleStage {
        self.lifecycle_stage
    }

    /// Get the description, if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Get the creation timestamp (epoch milliseconds).
    #[must_use]
    pub const fn create_time(&self) -> i64 {
        self.create_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_experiment_accessors() {
        let experiment = Experiment::from_parts(
            "1".to_string(),
            "mnist".to_string(),
            "file:///tmp/artifacts/1".to_string(),
            LifecycleStage::Active,
            None,
            1_700_000_000_000,
        );
        assert_eq!(experiment.experiment_id(), "1");
        assert_eq!(experiment.name(), "mnist");
        assert_eq!(experiment.lifecycle_stage(), LifecycleStage::Active);
        assert!(experiment.description().is_none());
    }

    #[test]
    fn test_experiment_serialization_round_trip() {
        let experiment = Experiment::from_parts(
            "7".to_string(),
            "cifar sweep".to_string(),
            "s3://bucket/7".to_string(),
            LifecycleStage::Deleted,
            Some("width sweep".to_string()),
            42,
        );
        let json = serde_json::to_string(&experiment).unwrap();
        let decoded: Experiment = serde_json::from_str(&json).unwrap();
        assert_eq!(experiment, decoded);
    }
}
