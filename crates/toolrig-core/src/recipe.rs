//! Recipe schema: the declarative description of a tool.
//!
//! A recipe is external catalog data (see `toolrig-catalog`); these types
//! are the validated, in-memory shape it is parsed into. The runtime never
//! sees an unknown field -- unknown keys are a schema error at load time.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One of the keyed install strategies within a recipe.
///
/// Either a package-manager name, a language-ecosystem name, `source`, or
/// `_default` (curl-pipe-bash / binary download fallback).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MethodKey {
    Apt,
    Dnf,
    Yum,
    Apk,
    Pacman,
    Zypper,
    Brew,
    Snap,
    Pip,
    Npm,
    Cargo,
    Go,
    Source,
    GithubRelease,
    #[serde(rename = "_default")]
    Default,
}

impl MethodKey {
    pub fn is_package_manager(&self) -> bool {
        matches!(
            self,
            Self::Apt | Self::Dnf | Self::Yum | Self::Apk | Self::Pacman | Self::Zypper | Self::Brew
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Dnf => "dnf",
            Self::Yum => "yum",
            Self::Apk => "apk",
            Self::Pacman => "pacman",
            Self::Zypper => "zypper",
            Self::Brew => "brew",
            Self::Snap => "snap",
            Self::Pip => "pip",
            Self::Npm => "npm",
            Self::Cargo => "cargo",
            Self::Go => "go",
            Self::Source => "source",
            Self::GithubRelease => "github_release",
            Self::Default => "_default",
        }
    }
}

impl std::fmt::Display for MethodKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A command is a list-of-strings with `{version}`, `{arch}`, `{os}`, and
/// declared-input placeholders substituted in before execution.
pub type Command = Vec<String>;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InstallEntry {
    Command(Command),
    Source(SourceSpec),
    GithubRelease(GithubReleaseSpec),
}

/// `install.github_release`: fetch a prebuilt binary from a GitHub release
/// asset instead of a package manager or language-ecosystem installer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GithubReleaseSpec {
    /// `owner/name`, used only for labeling -- the download itself goes
    /// through `asset_url_template`.
    pub repo: String,
    /// Full download URL with `{arch}`, `{os}`, `{version}` placeholders;
    /// substituted the same way as any other command token.
    pub asset_url_template: String,
    /// Name to install the fetched binary as; defaults to `recipe.cli`.
    #[serde(default)]
    pub binary_name: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChecksumAlgorithm {
    Sha256,
}

/// A declared checksum for a `github_release` or `_default` (command-script)
/// install method, keyed by [`MethodKey`] on [`Recipe::checksums`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChecksumSpec {
    #[serde(default = "default_checksum_algorithm")]
    pub algorithm: ChecksumAlgorithm,
    /// Either a literal digest or, when `is_url` is set, a templated URL to
    /// a checksums file the digest is extracted from.
    pub value: String,
    #[serde(default)]
    pub is_url: bool,
}

fn default_checksum_algorithm() -> ChecksumAlgorithm {
    ChecksumAlgorithm::Sha256
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSystem {
    Autotools,
    Cmake,
    Cargo,
    Meson,
    Go,
    Make,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildSize {
    Small,
    Medium,
    Large,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SourceSpec {
    pub build_system: BuildSystem,
    #[serde(default)]
    pub git_repo: Option<String>,
    #[serde(default)]
    pub tarball_url: Option<String>,
    /// Required when `tarball_url` contains `{version}`.
    #[serde(default)]
    pub default_version: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub depth: Option<u32>,
    #[serde(default)]
    pub requires_toolchain: Vec<String>,
    #[serde(default)]
    pub configure_args: Vec<String>,
    #[serde(default)]
    pub cmake_args: Vec<String>,
    #[serde(default)]
    pub cargo_args: Vec<String>,
    #[serde(default)]
    pub install_prefix: Option<String>,
    #[serde(default)]
    pub build_size: Option<BuildSize>,
    #[serde(default)]
    pub configure_timeout_sec: Option<u64>,
    #[serde(default)]
    pub install_needs_sudo: bool,
}

impl SourceSpec {
    /// Exactly one of `git_repo`/`tarball_url` must be set; validated at
    /// catalog load time, re-checked here for callers outside that path.
    pub fn source_location_valid(&self) -> bool {
        self.git_repo.is_some() ^ self.tarball_url.is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Risk {
    Low,
    Medium,
    High,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequiresPackages {
    #[serde(flatten)]
    pub by_family: HashMap<String, Vec<String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Requires {
    #[serde(default)]
    pub binaries: Vec<String>,
    #[serde(default)]
    pub packages: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub network: Option<NetworkRequirement>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NetworkRequirement {
    Bool(bool),
    Endpoint(String),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ShellConfigSpec {
    #[serde(default)]
    pub path_append: Vec<String>,
    #[serde(default)]
    pub env_vars: HashMap<String, String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostInstallKind {
    ServiceStart,
    ServiceEnable,
    GroupAdd,
    ConfigWrite,
    Notification,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PostInstallStep {
    pub kind: PostInstallKind,
    #[serde(default)]
    pub command: Option<Command>,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(default)]
    pub restart_required: Option<crate::plan::RestartRequirement>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChoiceType {
    Single,
    Multi,
    Toggle,
    SelectVersion,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChoiceCondition {
    OnChoice { choice: String, value: String },
    OnInput { input: String, predicate: String },
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct OptionRequires {
    #[serde(default)]
    pub hardware: Option<String>,
    #[serde(default)]
    pub binaries: Vec<String>,
    #[serde(default)]
    pub network: bool,
    #[serde(default)]
    pub auth: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChoiceOption {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub warning: Option<String>,
    pub risk: Risk,
    #[serde(default)]
    pub requires: OptionRequires,
    #[serde(default)]
    pub disabled_reason: Option<String>,
    #[serde(default)]
    pub enable_hint: Option<String>,
    #[serde(default)]
    pub learn_more: Option<String>,
}

/// A single option as returned from pass-1 resolution, with availability
/// computed against a profile.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedOption {
    #[serde(flatten)]
    pub option: ChoiceOption,
    pub available: bool,
    #[serde(default)]
    pub computed_disabled_reason: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Choice {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ChoiceType,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    pub options: Vec<ChoiceOption>,
    #[serde(default)]
    pub min_select: Option<u32>,
    #[serde(default)]
    pub max_select: Option<u32>,
    #[serde(default)]
    pub condition: Option<ChoiceCondition>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    Text,
    Number,
    Select,
    Password,
    Path,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct InputDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: InputType,
    #[serde(default)]
    pub validation: Option<String>,
    #[serde(default)]
    pub condition: Option<ChoiceCondition>,
    #[serde(default)]
    pub default: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DataPack {
    pub id: String,
    pub label: String,
    pub url: String,
    #[serde(default)]
    pub size_mb: Option<u64>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConfigTemplate {
    pub path: String,
    pub contents: String,
}

/// A declarative description of a tool: how to install, verify, update,
/// and remove it across platforms.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Recipe {
    pub id: String,
    pub label: String,
    /// Binary name used for `cli --version` detection.
    pub cli: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub default_version: Option<String>,
    pub install: HashMap<MethodKey, InstallEntry>,
    #[serde(default)]
    pub needs_sudo: HashMap<MethodKey, bool>,
    #[serde(default)]
    pub requires: Requires,
    /// Declared checksums for `github_release`/`_default` install methods,
    /// keyed by the method they apply to.
    #[serde(default)]
    pub checksums: HashMap<MethodKey, ChecksumSpec>,
    #[serde(default)]
    pub prefer: Vec<MethodKey>,
    #[serde(default)]
    pub post_env: Option<String>,
    #[serde(default)]
    pub shell_config: Option<ShellConfigSpec>,
    #[serde(default)]
    pub post_install: Vec<PostInstallStep>,
    #[serde(default)]
    pub verify: Option<Command>,
    #[serde(default)]
    pub update: HashMap<MethodKey, Command>,
    #[serde(default)]
    pub remove: HashMap<MethodKey, Command>,
    #[serde(default)]
    pub repo_setup: HashMap<String, Vec<Command>>,
    #[serde(default)]
    pub choices: Vec<Choice>,
    #[serde(default)]
    pub inputs: Vec<InputDef>,
    #[serde(default)]
    pub data_packs: Vec<DataPack>,
    #[serde(default)]
    pub disk_requirement_gb: Option<f64>,
    #[serde(default)]
    pub version_constraint: Option<String>,
    #[serde(default)]
    pub arch_exclude: Vec<String>,
    #[serde(default)]
    pub config_templates: Vec<ConfigTemplate>,
}

impl Recipe {
    pub fn needs_sudo_for(&self, method: &MethodKey) -> bool {
        self.needs_sudo.get(method).copied().unwrap_or(false)
    }

    pub fn source_spec(&self) -> Option<&SourceSpec> {
        match self.install.get(&MethodKey::Source)? {
            InstallEntry::Source(spec) => Some(spec),
            _ => None,
        }
    }

    pub fn github_release_spec(&self) -> Option<&GithubReleaseSpec> {
        match self.install.get(&MethodKey::GithubRelease)? {
            InstallEntry::GithubRelease(spec) => Some(spec),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_key_display_matches_catalog_spelling() {
        assert_eq!(MethodKey::Default.to_string(), "_default");
        assert_eq!(MethodKey::Apt.to_string(), "apt");
    }

    #[test]
    fn source_spec_requires_exactly_one_location() {
        let mut spec = SourceSpec {
            build_system: BuildSystem::Cmake,
            git_repo: Some("https://example.invalid/repo.git".into()),
            tarball_url: None,
            default_version: None,
            branch: None,
            depth: None,
            requires_toolchain: vec![],
            configure_args: vec![],
            cmake_args: vec![],
            cargo_args: vec![],
            install_prefix: None,
            build_size: None,
            configure_timeout_sec: None,
            install_needs_sudo: false,
        };
        assert!(spec.source_location_valid());
        spec.tarball_url = Some("https://example.invalid/x.tar.gz".into());
        assert!(!spec.source_location_valid());
        spec.git_repo = None;
        spec.tarball_url = None;
        assert!(!spec.source_location_valid());
    }
}
