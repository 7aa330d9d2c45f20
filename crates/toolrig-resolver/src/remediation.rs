//! Remediation tree construction (§4.3).
//!
//! Built lazily: each call materializes exactly one level, keyed by the
//! breadcrumb chain of tools the user has already walked through to get
//! here. Deeper levels are built on demand, one [`build_remediation`] call
//! per failure.

use serde::{Deserialize, Serialize};
use toolrig_catalog::Catalog;
use toolrig_core::{ErrorAnalysis, ErrorKind, SystemProfile};

use crate::plan::{ResolveRequest, resolve_install_plan};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemediationStrategy {
    InstallDep,
    InstallDepThenSwitch,
    InstallPackages,
    SwitchMethod,
    RetryWithModifier,
    AddRepo,
    UpgradeDep,
    EnvFix,
    Manual,
    CleanupRetry,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    Ready,
    Locked,
    Impossible,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UnlockPreview {
    pub dep: String,
    pub methods: Vec<String>,
    pub ready_methods: Vec<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemediationOption {
    pub strategy: RemediationStrategy,
    pub availability: Availability,
    pub reason: String,
    #[serde(default)]
    pub unlock_deps: Vec<String>,
    #[serde(default)]
    pub unlock_preview: Vec<UnlockPreview>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RemediationTree {
    pub tool: String,
    pub chain: Vec<String>,
    pub options: Vec<RemediationOption>,
}

/// Build one level of the remediation tree for a failure classified as
/// `analysis`, in the context of the breadcrumb chain walked so far.
pub fn build_remediation(
    catalog: &Catalog,
    profile: &SystemProfile,
    tool: &str,
    analysis: &ErrorAnalysis,
    chain: &[String],
) -> RemediationTree {
    if chain.iter().any(|t| t == tool) {
        let mut breadcrumbs = chain.to_vec();
        breadcrumbs.push(tool.to_string());
        return RemediationTree {
            tool: tool.to_string(),
            chain: breadcrumbs,
            options: vec![RemediationOption {
                strategy: RemediationStrategy::Manual,
                availability: Availability::Impossible,
                reason: "circular dependency".to_string(),
                unlock_deps: vec![],
                unlock_preview: vec![],
            }],
        };
    }

    let mut breadcrumbs = chain.to_vec();
    breadcrumbs.push(tool.to_string());

    let options = match analysis.kind {
        ErrorKind::BuildMissingLib | ErrorKind::BuildMissingHeader => {
            missing_package_options(analysis)
        }
        ErrorKind::VerifyBinaryNotOnPath => missing_dep_options(catalog, profile, &analysis.suggestions),
        ErrorKind::NetworkOffline | ErrorKind::NetworkEndpointUnreachable => vec![RemediationOption {
            strategy: RemediationStrategy::RetryWithModifier,
            availability: Availability::Ready,
            reason: "transient network condition, safe to retry".to_string(),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }],
        ErrorKind::ResourcePmLockHeld => vec![RemediationOption {
            strategy: RemediationStrategy::RetryWithModifier,
            availability: Availability::Ready,
            reason: "package manager lock is held by another process; retry after a delay".to_string(),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }],
        ErrorKind::AuthNoSudo | ErrorKind::AuthNotInSudoers => vec![RemediationOption {
            strategy: RemediationStrategy::Manual,
            availability: Availability::Impossible,
            reason: "this account cannot obtain elevated privileges".to_string(),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }],
        ErrorKind::AuthWrongSudo => vec![RemediationOption {
            strategy: RemediationStrategy::RetryWithModifier,
            availability: Availability::Ready,
            reason: "re-enter the sudo password and retry".to_string(),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }],
        ErrorKind::PermissionEaccesNpmGlobal => vec![RemediationOption {
            strategy: RemediationStrategy::EnvFix,
            availability: Availability::Ready,
            reason: "redirect npm's global prefix to a user-writable directory".to_string(),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }],
        ErrorKind::PermissionPep668Blocked => vec![RemediationOption {
            strategy: RemediationStrategy::SwitchMethod,
            availability: Availability::Ready,
            reason: "use pipx or a virtualenv instead of the externally-managed system interpreter".to_string(),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }],
        ErrorKind::ResourceDiskFull => vec![RemediationOption {
            strategy: RemediationStrategy::CleanupRetry,
            availability: Availability::Ready,
            reason: "free disk space and retry".to_string(),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }],
        ErrorKind::StateVersionConflict => vec![RemediationOption {
            strategy: RemediationStrategy::UpgradeDep,
            availability: Availability::Ready,
            reason: "upgrade the conflicting dependency".to_string(),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }],
        ErrorKind::InstallNotFoundInRegistry => vec![RemediationOption {
            strategy: RemediationStrategy::SwitchMethod,
            availability: Availability::Locked,
            reason: "package absent from this registry; try another install method".to_string(),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }],
        _ => vec![RemediationOption {
            strategy: RemediationStrategy::Manual,
            availability: Availability::Impossible,
            reason: analysis.why.clone().unwrap_or_else(|| analysis.what_happened.clone()),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }],
    };

    RemediationTree {
        tool: tool.to_string(),
        chain: breadcrumbs,
        options,
    }
}

/// Missing-package remediations: one `install_packages` option per
/// suggested package, always `ready` since the packages step can be
/// inserted and retried in place (scenario F).
fn missing_package_options(analysis: &ErrorAnalysis) -> Vec<RemediationOption> {
    if analysis.suggestions.is_empty() {
        return vec![RemediationOption {
            strategy: RemediationStrategy::Manual,
            availability: Availability::Impossible,
            reason: analysis.what_happened.clone(),
            unlock_deps: vec![],
            unlock_preview: vec![],
        }];
    }
    vec![RemediationOption {
        strategy: RemediationStrategy::InstallPackages,
        availability: Availability::Ready,
        reason: format!("install missing package(s): {}", analysis.suggestions.join(", ")),
        unlock_deps: analysis.suggestions.clone(),
        unlock_preview: vec![],
    }]
}

/// Missing-binary remediations, with one-level lookahead: for each
/// suggested dependency tool, preview which install methods exist and
/// which are already `ready` on this host.
fn missing_dep_options(
    catalog: &Catalog,
    profile: &SystemProfile,
    deps: &[String],
) -> Vec<RemediationOption> {
    deps.iter()
        .map(|dep| {
            let Some(recipe) = catalog.get(dep) else {
                return RemediationOption {
                    strategy: RemediationStrategy::Manual,
                    availability: Availability::Impossible,
                    reason: format!("'{dep}' is not in the catalog"),
                    unlock_deps: vec![],
                    unlock_preview: vec![],
                };
            };
            let methods: Vec<String> = recipe.install.keys().map(|m| m.to_string()).collect();
            let ready = resolve_install_plan(catalog, dep, profile, &ResolveRequest::default()).is_ok();
            let ready_methods = if ready { methods.clone() } else { vec![] };
            RemediationOption {
                strategy: RemediationStrategy::InstallDepThenSwitch,
                availability: if ready { Availability::Ready } else { Availability::Locked },
                reason: format!("install '{dep}' first, then retry"),
                unlock_deps: vec![dep.clone()],
                unlock_preview: vec![UnlockPreview {
                    dep: dep.clone(),
                    methods,
                    ready_methods,
                }],
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use toolrig_core::{InstallEntry, MethodKey, Recipe};

    fn minimal_recipe(id: &str) -> Recipe {
        let mut install = HashMap::new();
        install.insert(MethodKey::Default, InstallEntry::Command(vec!["echo".into()]));
        Recipe {
            id: id.into(),
            label: id.into(),
            cli: id.into(),
            category: None,
            default_version: None,
            install,
            needs_sudo: HashMap::new(),
            requires: Default::default(),
            checksums: HashMap::new(),
            prefer: vec![],
            post_env: None,
            shell_config: None,
            post_install: vec![],
            verify: None,
            update: HashMap::new(),
            remove: HashMap::new(),
            repo_setup: HashMap::new(),
            choices: vec![],
            inputs: vec![],
            data_packs: vec![],
            disk_requirement_gb: None,
            version_constraint: None,
            arch_exclude: vec![],
            config_templates: vec![],
        }
    }

    fn analysis(kind: ErrorKind, suggestions: Vec<&str>) -> ErrorAnalysis {
        ErrorAnalysis {
            kind,
            what_happened: "step failed".to_string(),
            why: None,
            suggestions: suggestions.into_iter().map(String::from).collect(),
        }
    }

    #[test]
    fn tool_reappearing_in_chain_is_marked_circular() {
        let mut recipes = HashMap::new();
        recipes.insert("cargo-audit".to_string(), minimal_recipe("cargo-audit"));
        let catalog = Catalog::from_recipes(recipes).unwrap();
        let profile = SystemProfile::default();
        let chain = vec!["cargo-audit".to_string(), "openssl".to_string()];
        let tree = build_remediation(
            &catalog,
            &profile,
            "cargo-audit",
            &analysis(ErrorKind::BuildMissingLib, vec!["libssl-dev"]),
            &chain,
        );
        assert_eq!(tree.options[0].availability, Availability::Impossible);
        assert_eq!(tree.options[0].reason, "circular dependency");
    }

    #[test]
    fn missing_lib_yields_ready_install_packages_option() {
        let mut recipes = HashMap::new();
        recipes.insert("cargo-audit".to_string(), minimal_recipe("cargo-audit"));
        let catalog = Catalog::from_recipes(recipes).unwrap();
        let profile = SystemProfile::default();
        let tree = build_remediation(
            &catalog,
            &profile,
            "cargo-audit",
            &analysis(ErrorKind::BuildMissingLib, vec!["libssl-dev"]),
            &[],
        );
        assert_eq!(tree.options[0].strategy, RemediationStrategy::InstallPackages);
        assert_eq!(tree.options[0].availability, Availability::Ready);
        assert_eq!(tree.chain, vec!["cargo-audit".to_string()]);
    }
}
