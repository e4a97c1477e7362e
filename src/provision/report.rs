//! Per-step outcomes and the run report.

use crate::cloud::ResourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What a step did (or would do) with its resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    /// A resource carrying the tag already existed and was reused
    Found,
    /// The resource was created
    Created,
    /// Plan mode: the resource would be created
    WouldCreate,
    /// An instance was launched
    Launched,
    /// Plan mode: an instance would be launched
    WouldLaunch,
}

impl StepOutcome {
    /// Whether the step changed (or would change) the account.
    pub fn is_change(&self) -> bool {
        !matches!(self, StepOutcome::Found)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepOutcome::Found => "found",
            StepOutcome::Created => "created",
            StepOutcome::WouldCreate => "would create",
            StepOutcome::Launched => "launched",
            StepOutcome::WouldLaunch => "would launch",
        }
    }
}

/// Result of one provisioning step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub kind: ResourceKind,
    /// Value of the `Name` tag
    pub name: String,
    /// Resource ID; absent only in plan mode for resources not yet created
    pub id: Option<String>,
    pub outcome: StepOutcome,
    /// Failures that were logged but did not abort the run
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl StepReport {
    pub fn new(
        kind: ResourceKind,
        name: impl Into<String>,
        id: Option<String>,
        outcome: StepOutcome,
    ) -> Self {
        Self {
            kind,
            name: name.into(),
            id,
            outcome,
            warnings: Vec::new(),
        }
    }

    pub fn found(kind: ResourceKind, name: impl Into<String>, id: String) -> Self {
        Self::new(kind, name, Some(id), StepOutcome::Found)
    }

    pub fn created(kind: ResourceKind, name: impl Into<String>, id: String) -> Self {
        Self::new(kind, name, Some(id), StepOutcome::Created)
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }
}

/// Whether a run applied changes or only planned them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Apply,
    Plan,
}

/// Everything a provisioning run resolved, in step order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionReport {
    pub mode: RunMode,
    pub backend: String,
    pub region: String,
    pub started_at: DateTime<Utc>,
    pub steps: Vec<StepReport>,
    /// Live instances carrying the instance tag before this run launched one
    pub existing_instances: usize,
}

impl ProvisionReport {
    pub fn new(mode: RunMode, backend: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            mode,
            backend: backend.into(),
            region: region.into(),
            started_at: Utc::now(),
            steps: Vec::new(),
            existing_instances: 0,
        }
    }

    pub fn push(&mut self, step: StepReport) {
        self.steps.push(step);
    }

    pub fn step(&self, kind: ResourceKind) -> Option<&StepReport> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    /// ID resolved for `kind`, if any.
    pub fn id_of(&self, kind: ResourceKind) -> Option<&str> {
        self.step(kind).and_then(|s| s.id.as_deref())
    }

    /// Number of steps that changed (or would change) the account.
    pub fn changed(&self) -> usize {
        self.steps.iter().filter(|s| s.outcome.is_change()).count()
    }

    pub fn unchanged(&self) -> usize {
        self.steps.len() - self.changed()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &str> {
        self.steps
            .iter()
            .flat_map(|s| s.warnings.iter().map(String::as_str))
    }
}
