//! Shared types for the plan pipeline: system profile, recipe schema,
//! plan/step, persisted plan state, and the error taxonomy.
//!
//! This crate is pure data -- no I/O, no subprocess, no filesystem. Every
//! other crate in the workspace depends on it.

pub mod error;
pub mod plan;
pub mod plan_state;
pub mod profile;
pub mod recipe;

pub use error::{ErrorAnalysis, ErrorKind, Result, ToolRigError};
pub use plan::{
    ConfirmationGate, Plan, PlanStatus, RestartRequirement, RiskSummary, Step, StepStatus,
    StepType, VersionConstraintResult,
};
pub use plan_state::PlanState;
pub use profile::{
    Arch, Capabilities, DistroFamily, DistroInfo, GpuInfo, HardwareInfo, LibcType, LibraryInfo,
    NetworkInfo, OsInfo, PackageManagerInfo, PackageManagerKind, ShellInfo, SystemProfile,
    ToolStatus,
};
pub use recipe::{
    BuildSize, BuildSystem, Choice, ChoiceCondition, ChoiceOption, ChoiceType, ChecksumAlgorithm,
    ChecksumSpec, Command, DataPack, GithubReleaseSpec, InputDef, InputType, InstallEntry,
    MethodKey, PostInstallStep, Recipe, Requires, ResolvedOption, Risk, ShellConfigSpec,
    SourceSpec,
};

/// Generate a new plan id (ULID: lexicographically sortable, time-ordered).
pub fn new_plan_id() -> String {
    ulid::Ulid::new().to_string()
}
