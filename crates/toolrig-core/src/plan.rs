//! Plan and Step: the resolver's output and the executor's unit of work.

use crate::recipe::Risk;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Packages,
    Repo,
    Tool,
    Command,
    Source,
    Build,
    Install,
    Cleanup,
    Config,
    ShellConfig,
    Service,
    Verify,
    Notification,
    Download,
    GithubRelease,
    /// Ad hoc post-install command (e.g. group membership changes), as
    /// opposed to [`StepType::Command`]'s download-then-execute discipline.
    Exec,
}

impl StepType {
    /// Default timeout per spec §4.4, before any recipe/step override.
    pub fn default_timeout_sec(&self) -> u64 {
        match self {
            Self::Packages => 300,
            Self::Command => 120,
            Self::Tool => 600,
            Self::Source => 120,
            Self::Build => 1800,
            Self::Install => 300,
            Self::Cleanup => 60,
            Self::Config | Self::ShellConfig => 10,
            Self::Service => 30,
            Self::Verify => 30,
            Self::Notification => 5,
            Self::Download | Self::GithubRelease => 300,
            Self::Repo => 60,
            Self::Exec => 60,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RestartRequirement {
    Session,
    Service,
    System,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Ready,
    Running,
    Done,
    Skipped,
    Failed,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: StepType,
    pub label: String,
    #[serde(default)]
    pub command: Option<Vec<String>>,
    #[serde(default)]
    pub needs_sudo: bool,
    pub timeout_sec: u64,
    #[serde(default)]
    pub depends_on: Vec<String>,
    pub risk: Risk,
    #[serde(default)]
    pub restart_required: Option<RestartRequirement>,
    #[serde(default)]
    pub restart_service: Option<String>,
    #[serde(default)]
    pub progress_regex: Option<String>,
    #[serde(default)]
    pub disk_estimate_mb: Option<u64>,
    #[serde(default = "default_pending")]
    pub status: StepStatus,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub output_tail: String,
    /// Tool this step belongs to (for grouping verify/rollback by tool).
    pub tool: String,
    /// Package-manager name this step exercises, if any -- used to derive
    /// the scheduler's per-PM mutual-exclusion mutex.
    #[serde(default)]
    pub package_manager: Option<String>,
    /// Environment prefix contributed by an earlier step in this plan
    /// (post_env), wrapped around this step's command at execution time.
    #[serde(default)]
    pub post_env_prefix: Option<String>,
}

fn default_pending() -> StepStatus {
    StepStatus::Pending
}

impl Step {
    pub fn is_mutating(&self) -> bool {
        !matches!(self.kind, StepType::Verify | StepType::Notification)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanStatus {
    Created,
    Running,
    Paused,
    Done,
    Failed,
    Cancelled,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RiskSummary {
    pub max_risk: Risk,
    pub per_step_risk: HashMap<String, Risk>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfirmationGate {
    pub level: Risk,
    pub prompt: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct VersionConstraintResult {
    pub ok: bool,
    pub reason: String,
    #[serde(default)]
    pub options: Vec<String>,
}

/// A concrete, ordered DAG of steps produced by the resolver for a
/// specific tool, profile, and answer set.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: String,
    pub tool: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub answers: HashMap<String, String>,
    #[serde(default)]
    pub inputs: HashMap<String, String>,
    pub steps: Vec<Step>,
    #[serde(default)]
    pub rollback: Vec<Step>,
    pub risk_summary: RiskSummary,
    #[serde(default)]
    pub confirmation_gate: Option<ConfirmationGate>,
    #[serde(default)]
    pub version_constraint_result: Option<VersionConstraintResult>,
    pub status: PlanStatus,
}

impl Plan {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    pub fn step_mut(&mut self, id: &str) -> Option<&mut Step> {
        self.steps.iter_mut().find(|s| s.id == id)
    }

    /// `true` once every step has reached a terminal status.
    pub fn is_complete(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(s.status, StepStatus::Done | StepStatus::Skipped))
    }

    pub fn has_failed_step(&self) -> bool {
        self.steps.iter().any(|s| s.status == StepStatus::Failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeouts_match_spec_table() {
        assert_eq!(StepType::Packages.default_timeout_sec(), 300);
        assert_eq!(StepType::Build.default_timeout_sec(), 1800);
        assert_eq!(StepType::Verify.default_timeout_sec(), 30);
    }
}
