//! Error taxonomy (§7) and the top-level crate error type.
//!
//! `ErrorKind` is a classification, not an exception type: handlers never
//! throw across component boundaries, they return a structured result and
//! the domain layer classifies it into one of these kinds.

use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthWrongSudo,
    AuthNoSudo,
    AuthNotInSudoers,
    NetworkOffline,
    NetworkEndpointUnreachable,
    NetworkProxyBlocked,
    NetworkSslCert,
    ResourceDiskFull,
    ResourceOom,
    ResourceTimeout,
    ResourcePmLockHeld,
    PermissionDenied,
    PermissionEaccesNpmGlobal,
    PermissionPep668Blocked,
    BuildMissingHeader,
    BuildMissingLib,
    BuildCompileError,
    BuildLinkerError,
    InstallWrongArchBinary,
    InstallChecksumMismatch,
    InstallNotFoundInRegistry,
    StateDependencyCycle,
    StateVersionConflict,
    StatePlanCorrupt,
    RestartRequiredSession,
    RestartRequiredService,
    RestartRequiredSystem,
    VerifyBinaryNotOnPath,
    VerifyVersionMismatch,
    Unknown,
}

impl ErrorKind {
    /// Whether this kind is worth a bounded automatic retry (transient
    /// network/lock conditions), per §4.5 failure policy.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::NetworkOffline
                | Self::NetworkEndpointUnreachable
                | Self::ResourcePmLockHeld
                | Self::ResourceTimeout
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::AuthWrongSudo => "auth.wrong_sudo",
            Self::AuthNoSudo => "auth.no_sudo",
            Self::AuthNotInSudoers => "auth.not_in_sudoers",
            Self::NetworkOffline => "network.offline",
            Self::NetworkEndpointUnreachable => "network.endpoint_unreachable",
            Self::NetworkProxyBlocked => "network.proxy_blocked",
            Self::NetworkSslCert => "network.ssl_cert",
            Self::ResourceDiskFull => "resource.disk_full",
            Self::ResourceOom => "resource.oom",
            Self::ResourceTimeout => "resource.timeout",
            Self::ResourcePmLockHeld => "resource.pm_lock_held",
            Self::PermissionDenied => "permission.denied",
            Self::PermissionEaccesNpmGlobal => "permission.eacces_npm_global",
            Self::PermissionPep668Blocked => "permission.pep668_blocked",
            Self::BuildMissingHeader => "build.missing_header",
            Self::BuildMissingLib => "build.missing_lib",
            Self::BuildCompileError => "build.compile_error",
            Self::BuildLinkerError => "build.linker_error",
            Self::InstallWrongArchBinary => "install.wrong_arch_binary",
            Self::InstallChecksumMismatch => "install.checksum_mismatch",
            Self::InstallNotFoundInRegistry => "install.not_found_in_registry",
            Self::StateDependencyCycle => "state.dependency_cycle",
            Self::StateVersionConflict => "state.version_conflict",
            Self::StatePlanCorrupt => "state.plan_corrupt",
            Self::RestartRequiredSession => "restart.required_session",
            Self::RestartRequiredService => "restart.required_service",
            Self::RestartRequiredSystem => "restart.required_system",
            Self::VerifyBinaryNotOnPath => "verify.binary_not_on_path",
            Self::VerifyVersionMismatch => "verify.version_mismatch",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

/// A classified failure with a user-facing explanation, built from the
/// taxonomy. Always carries what happened and, when known, why.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ErrorAnalysis {
    pub kind: ErrorKind,
    pub what_happened: String,
    #[serde(default)]
    pub why: Option<String>,
    #[serde(default)]
    pub suggestions: Vec<String>,
}

#[derive(thiserror::Error, Debug)]
pub enum ToolRigError {
    #[error("recipe '{0}' not found in catalog")]
    RecipeNotFound(String),

    #[error("schema violation in recipe '{recipe}': {detail}")]
    SchemaViolation { recipe: String, detail: String },

    #[error("dependency cycle detected: {0}")]
    DependencyCycle(String),

    #[error("no install method available for '{0}' on this host")]
    NoMethodAvailable(String),

    #[error("unsubstituted placeholder '{placeholder}' in command for step '{step}'")]
    UnsubstitutedPlaceholder { step: String, placeholder: String },

    #[error("plan '{0}' not found")]
    PlanNotFound(String),

    #[error("plan '{0}' is corrupt: {1}")]
    PlanCorrupt(String, String),

    #[error("step '{0}' failed: {1}")]
    StepFailed(String, String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, ToolRigError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_taxonomy_spelling() {
        assert_eq!(ErrorKind::AuthWrongSudo.to_string(), "auth.wrong_sudo");
        assert_eq!(ErrorKind::BuildMissingLib.to_string(), "build.missing_lib");
    }

    #[test]
    fn transient_kinds_are_retry_eligible() {
        assert!(ErrorKind::NetworkOffline.is_transient());
        assert!(ErrorKind::ResourcePmLockHeld.is_transient());
        assert!(!ErrorKind::BuildCompileError.is_transient());
    }
}
