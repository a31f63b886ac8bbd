//! Lifecycle stages and lookup visibility

use serde::{Deserialize, Serialize};

/// Soft-delete marker carried by experiments and runs.
///
/// Entities are never physically removed; delete/restore flip this stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LifecycleStage {
    /// Entity is live and mutable.
    Active,
    /// Entity is soft-deleted; mutations are rejected until restored.
    Deleted,
}

impl LifecycleStage {
    /// Canonical string form, also used by the schema CHECK constraints.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }

    /// Parse the canonical string form.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "active" => Some(Self::Active),
            "deleted" => Some(Self::Deleted),
            _ => None,
        }
    }
}

impl std::fmt::Display for LifecycleStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Visibility filter applied by lookups and searches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewType {
    /// Only entities in the `active` stage.
    #[default]
    ActiveOnly,
    /// Only entities in the `deleted` stage.
    DeletedOnly,
    /// Entities in any stage.
    All,
}

impl ViewType {
    /// The lifecycle stages this view admits.
    #[must_use]
    pub const fn stages(self) -> &'static [LifecycleStage] {
        match self {
            Self::ActiveOnly => &[LifecycleStage::Active],
            Self::DeletedOnly => &[LifecycleStage::Deleted],
            Self::All => &[LifecycleStage::Active, LifecycleStage::Deleted],
        }
    }

    /// True when `stage` is visible under this view.
    #[must_use]
    pub fn admits(self, stage: LifecycleStage) -> bool {
        self.stages().contains(&stage)
    }
}
