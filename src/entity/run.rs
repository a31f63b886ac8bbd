//! Run - one execution instance within an experiment

use serde::{Deserialize, Serialize};

use super::{LifecycleStage, Metric, Param, RunTag};

/// Execution status of a run.
///
/// Informational only: transitions are recorded, not gated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    /// Run is created but not yet executing.
    Scheduled,
    /// Run is currently executing.
    Running,
    /// Run completed successfully.
    Finished,
    /// Run terminated with an error.
    Failed,
}

impl RunStatus {
    /// Canonical string form, also used by the schema CHECK constraint.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "SCHEDULED",
            Self::Running => "RUNNING",
            Self::Finished => "FINISHED",
            Self::Failed => "FAILED",
        }
    }

    /// Parse the canonical string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "SCHEDULED" => Some(Self::Scheduled),
            "RUNNING" => Some(Self::Running),
            "FINISHED" => Some(Self::Finished),
            "FAILED" => Some(Self::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Immutable-identity and status fields of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunInfo {
    run_id: String,
    experiment_id: String,
    user_id: Option<String>,
    status: RunStatus,
    start_time: i64,
    end_time: Option<i64>,
    artifact_uri: String,
    lifecycle_stage: LifecycleStage,
}

impl RunInfo {
    /// Construct from trusted storage columns.
    #[allow(clippy::too_many_arguments)]
    pub(crate) const fn from_parts(
        run_id: String,
        experiment_id: String,
        user_id: Option<String>,
        status: RunStatus,
        start_time: i64,
        end_time: Option<i64>,
        artifact_uri: String,
        lifecycle_stage: LifecycleStage,
    ) -> Self {
        Self {
            run_id,
            experiment_id,
            user_id,
            status,
            start_time,
            end_time,
            artifact_uri,
            lifecycle_stage,
        }
    }

    /// Get the run ID (32-char hex UUID).
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Get the owning experiment's ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the user that created the run, if recorded.
    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    /// Get the execution status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Get the start timestamp (epoch milliseconds).
    #[must_use]
    pub const fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Get the end timestamp, if the run has completed.
    #[must_use]
    pub const fn end_time(&self) -> Option<i64> {
        self.end_time
    }

    /// Get the artifact URI derived at creation from the experiment's
    /// artifact location and the run ID.
    #[must_use]
    pub fn artifact_uri(&self) -> &str {
        &self.artifact_uri
    }

    /// Get the lifecycle stage.
    #[must_use]
    pub const fn lifecycle_stage(&self) -> LifecycleStage {
        self.lifecycle_stage
    }
}

/// Logged data of a run: latest-per-key metrics, params, and tags.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunData {
    metrics: Vec<Metric>,
    params: Vec<Param>,
    tags: Vec<RunTag>,
}

impl RunData {
    pub(crate) const fn from_parts(
        metrics: Vec<Metric>,
        params: Vec<Param>,
        tags: Vec<RunTag>,
    ) -> Self {
        Self { metrics, params, tags }
    }

    /// Latest metric entry per key (the current-value projection).
    #[must_use]
    pub fn metrics(&self) -> &[Metric] {
        &self.metrics
    }

    /// All params logged for the run.
    #[must_use]
    pub fn params(&self) -> &[Param] {
        &self.params
    }

    /// All tags set on the run.
    #[must_use]
    pub fn tags(&self) -> &[RunTag] {
        &self.tags
    }
}

/// A materialized run snapshot: info plus resolved data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Run {
    info: RunInfo,
    data: RunData,
}

impl Run {
    pub(crate) const fn from_parts(info: RunInfo, data: RunData) -> Self {
        Self { info, data }
    }

    /// Get the run's identity and status fields.
    #[must_use]
    pub const fn info(&self) -> &RunInfo {
        &self.info
    }

    /// Get the run's logged data.
    #[must_use]
    pub const fn data(&self) -> &RunData {
        &self.data
    }

    /// Current value of a metric key, if any entry was logged.
    #[must_use]
    pub fn latest_metric(&self, key: &str) -> Option<&Metric> {
        self.data.metrics.iter().find(|m| m.key() == key)
    }

    /// Value of a param key, if logged.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&str> {
        self.data
            .params
            .iter()
            .find(|p| p.key() == key)
            .map(Param::value)
    }

    /// Value of a tag key, if set.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.data
            .tags
            .iter()
            .find(|t| t.key() == key)
            .map(RunTag::value)
    }
}
