//! Pass 2: `resolve_install_plan` (§4.2 pass 2, steps 1-8).
//!
//! Pure given `(catalog, recipe, profile, answers, inputs)`: repeated
//! calls produce byte-identical plans modulo `plan_id` and timestamps
//! (§8 invariant 1).

use std::collections::{HashMap, HashSet};
use toolrig_catalog::{Catalog, SubstitutionContext, substitute_command};
use toolrig_core::{
    Arch, ConfirmationGate, InstallEntry, MethodKey, PackageManagerKind, PlanStatus,
    PostInstallStep, Recipe, RestartRequirement, RiskSummary, Step, StepStatus, StepType,
    SystemProfile, ToolRigError, VersionConstraintResult, recipe::PostInstallKind,
};

/// Inputs to pass 2, gathered from pass-1 answers plus any free-text
/// input values the user supplied.
#[derive(Clone, Debug, Default)]
pub struct ResolveRequest {
    pub answers: HashMap<String, String>,
    pub inputs: HashMap<String, String>,
    /// Peer tool versions supplied as answers, used by `version_constraint`.
    pub peer_versions: HashMap<String, String>,
}

struct StepIdGen {
    tool: String,
    counter: u32,
}

impl StepIdGen {
    fn new(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            counter: 0,
        }
    }

    fn next(&mut self, kind: &str) -> String {
        self.counter += 1;
        format!("{}-{}-{}", self.tool, kind, self.counter)
    }
}

/// Build the full install plan for `tool`. Recursively walks transitive
/// tool dependencies, inlining their steps ahead of the target's own.
pub fn resolve_install_plan(
    catalog: &Catalog,
    tool: &str,
    profile: &SystemProfile,
    request: &ResolveRequest,
) -> toolrig_core::Result<toolrig_core::Plan> {
    let mut emitted: HashSet<String> = HashSet::new();
    let mut visiting: Vec<String> = Vec::new();
    let mut steps = Vec::new();

    build_steps_for_tool(
        catalog,
        tool,
        profile,
        request,
        &mut visiting,
        &mut emitted,
        &mut steps,
    )?;

    toolrig_domain::validate_dag(&steps)?;

    let risk_summary: RiskSummary = toolrig_domain::summarize_risk(&steps);
    let confirmation_gate: Option<ConfirmationGate> =
        toolrig_domain::confirmation_gate_for(tool, &steps, &risk_summary);
    let version_constraint_result = evaluate_version_constraint(catalog, tool, profile, request)?;
    let rollback = toolrig_domain::synthesize_rollback(&steps);

    Ok(toolrig_core::Plan {
        plan_id: toolrig_core::new_plan_id(),
        tool: tool.to_string(),
        created_at: chrono::Utc::now(),
        answers: request.answers.clone(),
        inputs: request.inputs.clone(),
        steps,
        rollback,
        risk_summary,
        confirmation_gate,
        version_constraint_result,
        status: PlanStatus::Created,
    })
}

fn evaluate_version_constraint(
    catalog: &Catalog,
    tool: &str,
    profile: &SystemProfile,
    request: &ResolveRequest,
) -> toolrig_core::Result<Option<VersionConstraintResult>> {
    let Some(recipe) = catalog.get(tool) else {
        return Ok(None);
    };
    let Some(raw) = &recipe.version_constraint else {
        return Ok(None);
    };
    let Some(constraint) = toolrig_domain::version_constraint::parse_constraint(raw) else {
        return Ok(None);
    };
    let Some(installed) = profile.tools.get(tool).and_then(|t| t.version.as_deref()) else {
        return Ok(None);
    };
    let peer_version = match &constraint {
        toolrig_domain::version_constraint::Constraint::WithinMinorOfPeer { peer, .. } => {
            request.peer_versions.get(peer).map(String::as_str)
        }
        _ => None,
    };
    Ok(Some(toolrig_domain::version_constraint::evaluate(
        &constraint,
        installed,
        peer_version,
    )))
}

/// Depth-first build of one tool's steps, recursing into its binary
/// dependencies first. `emitted` prevents a shared dependency from being
/// duplicated; `visiting` detects and rejects cycles.
fn build_steps_for_tool(
    catalog: &Catalog,
    tool: &str,
    profile: &SystemProfile,
    request: &ResolveRequest,
    visiting: &mut Vec<String>,
    emitted: &mut HashSet<String>,
    out: &mut Vec<Step>,
) -> toolrig_core::Result<()> {
    if emitted.contains(tool) {
        return Ok(());
    }
    if visiting.contains(&tool.to_string()) {
        visiting.push(tool.to_string());
        return Err(ToolRigError::DependencyCycle(visiting.join(" -> ")));
    }
    if profile.binary_on_path(tool) {
        emitted.insert(tool.to_string());
        return Ok(());
    }

    let recipe = catalog
        .get(tool)
        .ok_or_else(|| ToolRigError::RecipeNotFound(tool.to_string()))?;
    visiting.push(tool.to_string());

    for dep in &recipe.requires.binaries {
        build_steps_for_tool(catalog, dep, profile, request, visiting, emitted, out)?;
    }

    let method = select_method(recipe, profile)
        .ok_or_else(|| ToolRigError::NoMethodAvailable(tool.to_string()))?;

    let post_env_prefix = dependency_post_env(catalog, &recipe.requires.binaries);
    emit_tool_steps(recipe, &method, profile, request, post_env_prefix, out)?;

    visiting.pop();
    emitted.insert(tool.to_string());
    Ok(())
}

/// Combined `post_env` prefix contributed by already-installed deps, in
/// declaration order, space-joined so it can be prepended verbatim.
fn dependency_post_env(catalog: &Catalog, deps: &[String]) -> Option<String> {
    let joined: Vec<&str> = deps
        .iter()
        .filter_map(|d| catalog.get(d))
        .filter_map(|r| r.post_env.as_deref())
        .collect();
    if joined.is_empty() {
        None
    } else {
        Some(joined.join(" && "))
    }
}

fn method_to_pm(method: &MethodKey) -> Option<PackageManagerKind> {
    Some(match method {
        MethodKey::Apt => PackageManagerKind::Apt,
        MethodKey::Dnf => PackageManagerKind::Dnf,
        MethodKey::Yum => PackageManagerKind::Yum,
        MethodKey::Apk => PackageManagerKind::Apk,
        MethodKey::Pacman => PackageManagerKind::Pacman,
        MethodKey::Zypper => PackageManagerKind::Zypper,
        MethodKey::Brew => PackageManagerKind::Brew,
        _ => return None,
    })
}

fn toolchain_binary_for(method: &MethodKey) -> Option<&'static str> {
    match method {
        MethodKey::Pip => Some("pip3"),
        MethodKey::Npm => Some("npm"),
        MethodKey::Cargo => Some("cargo"),
        MethodKey::Go => Some("go"),
        _ => None,
    }
}

fn method_available(method: &MethodKey, recipe: &Recipe, profile: &SystemProfile) -> bool {
    match method {
        MethodKey::Snap => profile.package_manager.snap_available,
        MethodKey::Source => recipe
            .source_spec()
            .map(|spec| {
                spec.requires_toolchain
                    .iter()
                    .all(|bin| profile.binary_on_path(bin))
            })
            .unwrap_or(false),
        MethodKey::Default | MethodKey::GithubRelease => true,
        MethodKey::Pip | MethodKey::Npm | MethodKey::Cargo | MethodKey::Go => {
            toolchain_binary_for(method).is_some_and(|bin| profile.binary_on_path(bin))
        }
        pm => method_to_pm(pm).is_some_and(|kind| profile.package_manager.available.contains(&kind)),
    }
}

/// Method selection, §4.2 step 1, in the declared priority order.
fn select_method(recipe: &Recipe, profile: &SystemProfile) -> Option<MethodKey> {
    for method in &recipe.prefer {
        if recipe.install.contains_key(method) && method_available(method, recipe, profile) {
            return Some(method.clone());
        }
    }

    if let Some(primary) = profile.package_manager.primary {
        let primary_key = pm_to_method(primary);
        if recipe.install.contains_key(&primary_key) && method_available(&primary_key, recipe, profile) {
            return Some(primary_key);
        }
    }

    if profile.package_manager.snap_available && recipe.install.contains_key(&MethodKey::Snap) {
        return Some(MethodKey::Snap);
    }

    if recipe.install.contains_key(&MethodKey::Default) {
        return Some(MethodKey::Default);
    }

    if recipe.install.contains_key(&MethodKey::Source) && method_available(&MethodKey::Source, recipe, profile) {
        return Some(MethodKey::Source);
    }

    recipe
        .install
        .keys()
        .find(|m| method_available(m, recipe, profile))
        .cloned()
}

fn pm_to_method(pm: PackageManagerKind) -> MethodKey {
    match pm {
        PackageManagerKind::Apt => MethodKey::Apt,
        PackageManagerKind::Dnf => MethodKey::Dnf,
        PackageManagerKind::Yum => MethodKey::Yum,
        PackageManagerKind::Apk => MethodKey::Apk,
        PackageManagerKind::Pacman => MethodKey::Pacman,
        PackageManagerKind::Zypper => MethodKey::Zypper,
        PackageManagerKind::Brew => MethodKey::Brew,
        PackageManagerKind::None => MethodKey::Default,
    }
}

fn substitution_context(recipe: &Recipe, profile: &SystemProfile, request: &ResolveRequest) -> SubstitutionContext {
    let mut inputs = request.answers.clone();
    inputs.extend(request.inputs.clone());
    SubstitutionContext {
        arch: profile.os.arch,
        os: profile.os.system.clone(),
        version: request
            .answers
            .get("version")
            .cloned()
            .or_else(|| recipe.default_version.clone()),
        inputs,
    }
}

fn substitute_step_command(
    step_id: &str,
    command: &[String],
    ctx: &SubstitutionContext,
) -> toolrig_core::Result<Vec<String>> {
    substitute_command(step_id, command, ctx)
}

/// Emit all steps for one tool at the chosen method, in canonical order
/// (§4.2 step 3): repo_setup, packages, install command, post_install,
/// shell_config, verify. `source` is handled by [`emit_source_steps`].
fn emit_tool_steps(
    recipe: &Recipe,
    method: &MethodKey,
    profile: &SystemProfile,
    request: &ResolveRequest,
    post_env_prefix: Option<String>,
    out: &mut Vec<Step>,
) -> toolrig_core::Result<()> {
    let ctx = substitution_context(recipe, profile, request);
    let mut ids = StepIdGen::new(&recipe.id);
    let needs_sudo = recipe.needs_sudo_for(method);
    let mut last_mutating_id: Option<String> = None;

    if let Some(repo_commands) = recipe.repo_setup.get(method.as_str()) {
        for command in repo_commands {
            let id = ids.next("repo");
            let substituted = substitute_step_command(&id, command, &ctx)?;
            out.push(Step {
                id: id.clone(),
                kind: StepType::Repo,
                label: format!("configure repository for {}", recipe.id),
                command: Some(substituted),
                needs_sudo,
                timeout_sec: StepType::Repo.default_timeout_sec(),
                depends_on: last_mutating_id.iter().cloned().collect(),
                risk: toolrig_domain::infer_step_risk(StepType::Repo),
                restart_required: None,
                restart_service: None,
                progress_regex: None,
                disk_estimate_mb: None,
                status: StepStatus::Pending,
                attempts: 0,
                output_tail: String::new(),
                tool: recipe.id.clone(),
                package_manager: method_to_pm(method).map(|k| k.as_str().to_string()),
                post_env_prefix: post_env_prefix.clone(),
            });
            last_mutating_id = Some(id);
        }
    }

    // §4.2 step 2: every method merges `requires.packages[family]` into the
    // plan -- package-manager methods fold it into their own install step
    // (below), everything else gets a standalone `packages` step first.
    if method_to_pm(method).is_none() && method != &MethodKey::Snap {
        if let Some(pm) = profile.package_manager.primary {
            let family = catalog_family_key(&pm_to_method(pm));
            if let Some(packages) = family
                .and_then(|f| recipe.requires.packages.get(f))
                .filter(|p| !p.is_empty())
            {
                let id = ids.next("packages");
                let argv = pm_install_argv(pm, packages);
                let substituted = substitute_step_command(&id, &argv, &ctx)?;
                let needs_sudo_pkg = pm != PackageManagerKind::Brew;
                out.push(Step {
                    id: id.clone(),
                    kind: StepType::Packages,
                    label: format!("install system packages for {}", recipe.id),
                    command: Some(substituted),
                    needs_sudo: needs_sudo_pkg,
                    timeout_sec: StepType::Packages.default_timeout_sec(),
                    depends_on: last_mutating_id.iter().cloned().collect(),
                    risk: toolrig_domain::infer_step_risk(StepType::Packages),
                    restart_required: None,
                    restart_service: None,
                    progress_regex: None,
                    disk_estimate_mb: None,
                    status: StepStatus::Pending,
                    attempts: 0,
                    output_tail: String::new(),
                    tool: recipe.id.clone(),
                    package_manager: Some(pm.as_str().to_string()),
                    post_env_prefix: post_env_prefix.clone(),
                });
                last_mutating_id = Some(id);
            }
        }
    }

    if method == &MethodKey::Source {
        if let Some(spec) = recipe.source_spec() {
            let last = emit_source_steps(recipe, spec, &ctx, &mut ids, needs_sudo, last_mutating_id, out)?;
            last_mutating_id = Some(last);
        }
    } else if method == &MethodKey::GithubRelease {
        if let Some(spec) = recipe.github_release_spec() {
            let last = emit_github_release_step(
                recipe,
                spec,
                &ctx,
                &mut ids,
                needs_sudo,
                last_mutating_id.clone(),
                post_env_prefix.clone(),
                out,
            )?;
            last_mutating_id = Some(last);
        }
    } else {
        let install_id = emit_install_step(
            recipe,
            method,
            &ctx,
            &mut ids,
            needs_sudo,
            last_mutating_id.clone(),
            post_env_prefix.clone(),
            out,
        )?;
        last_mutating_id = Some(install_id);
    }

    for post in &recipe.post_install {
        if !post_install_condition_holds(post, &request.answers) {
            continue;
        }
        let id = ids.next("post");
        let command = match &post.command {
            Some(cmd) => Some(substitute_step_command(&id, cmd, &ctx)?),
            None => None,
        };
        let kind = match post.kind {
            PostInstallKind::ServiceStart | PostInstallKind::ServiceEnable => StepType::Service,
            PostInstallKind::GroupAdd => StepType::Exec,
            PostInstallKind::ConfigWrite => StepType::Config,
            PostInstallKind::Notification => StepType::Notification,
        };
        out.push(Step {
            id: id.clone(),
            kind,
            label: post.message.clone().unwrap_or_else(|| format!("{:?}", post.kind)),
            command,
            needs_sudo: needs_sudo && kind != StepType::Notification,
            timeout_sec: kind.default_timeout_sec(),
            depends_on: last_mutating_id.iter().cloned().collect(),
            risk: toolrig_domain::infer_step_risk(kind),
            restart_required: post.restart_required,
            restart_service: None,
            progress_regex: None,
            disk_estimate_mb: None,
            status: StepStatus::Pending,
            attempts: 0,
            output_tail: String::new(),
            tool: recipe.id.clone(),
            package_manager: None,
            post_env_prefix: post_env_prefix.clone(),
        });
        if kind != StepType::Notification {
            last_mutating_id = Some(id);
        }
    }

    if let Some(shell_config) = &recipe.shell_config {
        let id = ids.next("shell-config");
        let mut command = vec!["toolrig-shell-append".to_string()];
        command.extend(shell_config.path_append.iter().cloned());
        for (key, value) in &shell_config.env_vars {
            command.push(format!("{key}={value}"));
        }
        out.push(Step {
            id: id.clone(),
            kind: StepType::ShellConfig,
            label: format!("update shell profile for {}", recipe.id),
            command: Some(command),
            needs_sudo: false,
            timeout_sec: StepType::ShellConfig.default_timeout_sec(),
            depends_on: last_mutating_id.iter().cloned().collect(),
            risk: toolrig_domain::infer_step_risk(StepType::ShellConfig),
            restart_required: Some(RestartRequirement::Session),
            restart_service: None,
            progress_regex: None,
            disk_estimate_mb: None,
            status: StepStatus::Pending,
            attempts: 0,
            output_tail: String::new(),
            tool: recipe.id.clone(),
            package_manager: None,
            post_env_prefix: None,
        });
        last_mutating_id = Some(id);
    }

    if let Some(verify_cmd) = &recipe.verify {
        let id = ids.next("verify");
        let substituted = substitute_step_command(&id, verify_cmd, &ctx)?;
        out.push(Step {
            id,
            kind: StepType::Verify,
            label: format!("verify {}", recipe.id),
            command: Some(substituted),
            needs_sudo: false,
            timeout_sec: StepType::Verify.default_timeout_sec(),
            depends_on: last_mutating_id.into_iter().collect(),
            risk: toolrig_domain::infer_step_risk(StepType::Verify),
            restart_required: None,
            restart_service: None,
            progress_regex: None,
            disk_estimate_mb: None,
            status: StepStatus::Pending,
            attempts: 0,
            output_tail: String::new(),
            tool: recipe.id.clone(),
            package_manager: None,
            post_env_prefix: post_env_prefix.clone(),
        });
    }

    Ok(())
}

/// `post_install.condition` is a small `choice_id==value` expression
/// checked against the flattened answer set; absent condition always runs.
fn post_install_condition_holds(post: &PostInstallStep, answers: &HashMap<String, String>) -> bool {
    let Some(condition) = &post.condition else {
        return true;
    };
    let Some((key, value)) = condition.split_once("==") else {
        return true;
    };
    answers
        .get(key.trim())
        .is_some_and(|answer| answer.split(',').any(|v| v == value.trim()))
}

/// Canonical argv for installing `packages` via `pm`, e.g.
/// `apt-get install -y curl pkg-config libssl-dev`.
fn pm_install_argv(pm: PackageManagerKind, packages: &[String]) -> Vec<String> {
    let mut argv = match pm {
        PackageManagerKind::Apt => vec!["apt-get".to_string(), "install".to_string(), "-y".to_string()],
        PackageManagerKind::Dnf => vec!["dnf".to_string(), "install".to_string(), "-y".to_string()],
        PackageManagerKind::Yum => vec!["yum".to_string(), "install".to_string(), "-y".to_string()],
        PackageManagerKind::Apk => vec!["apk".to_string(), "add".to_string()],
        PackageManagerKind::Pacman => vec!["pacman".to_string(), "-S".to_string(), "--noconfirm".to_string()],
        PackageManagerKind::Zypper => vec!["zypper".to_string(), "install".to_string(), "-y".to_string()],
        PackageManagerKind::Brew => vec!["brew".to_string(), "install".to_string()],
        PackageManagerKind::None => return Vec::new(),
    };
    argv.extend(packages.iter().cloned());
    argv
}

/// §4.4: pip/npm default to 120s, cargo/go to 600s -- both classify to
/// [`StepType::Tool`], so the per-method default can't be read off the
/// step kind alone.
fn tool_timeout_sec(method: &MethodKey) -> u64 {
    match method {
        MethodKey::Pip | MethodKey::Npm => 120,
        MethodKey::Cargo | MethodKey::Go => 600,
        _ => StepType::Tool.default_timeout_sec(),
    }
}

/// The last `http(s)://`-prefixed token in a declared command, i.e. the
/// asset this `_default` command-script method ultimately fetches.
fn extract_url(command: &[String]) -> Option<&str> {
    command
        .iter()
        .rev()
        .map(String::as_str)
        .find(|tok| tok.starts_with("http://") || tok.starts_with("https://"))
}

/// Sentinel prefix for a `command`-kind step: the executor downloads this
/// URL to a tempfile, checksum-verifies it if declared, and executes the
/// tempfile directly -- never piping the download straight to a shell.
const COMMAND_SCRIPT_SENTINEL: &str = "toolrig-download-script";

/// Build the packages/tool/command install step for a non-source,
/// non-github_release method, merging `requires.packages[family]` into a
/// package-manager step.
fn emit_install_step(
    recipe: &Recipe,
    method: &MethodKey,
    ctx: &SubstitutionContext,
    ids: &mut StepIdGen,
    needs_sudo: bool,
    depends_on: Option<String>,
    post_env_prefix: Option<String>,
    out: &mut Vec<Step>,
) -> toolrig_core::Result<String> {
    let Some(InstallEntry::Command(base_command)) = recipe.install.get(method) else {
        return Err(ToolRigError::NoMethodAvailable(recipe.id.clone()));
    };

    let (kind, id_prefix) = if method_to_pm(method).is_some() || method == &MethodKey::Snap {
        (StepType::Packages, "packages")
    } else if matches!(method, MethodKey::Pip | MethodKey::Npm | MethodKey::Cargo | MethodKey::Go) {
        (StepType::Tool, "tool")
    } else {
        (StepType::Command, "command")
    };

    let mut command = base_command.clone();
    if kind == StepType::Packages {
        let family = catalog_family_key(method);
        if let Some(extra) = family.and_then(|f| recipe.requires.packages.get(f)) {
            for package in extra {
                if !command.contains(package) {
                    command.push(package.clone());
                }
            }
        }
    }

    let id = ids.next(id_prefix);
    let command = if kind == StepType::Command {
        let url = extract_url(&command).ok_or_else(|| ToolRigError::SchemaViolation {
            recipe: recipe.id.clone(),
            detail: format!("install.{method} has no http(s) URL token to download and execute"),
        })?;
        let mut sentinel = vec![COMMAND_SCRIPT_SENTINEL.to_string(), url.to_string()];
        if let Some(checksum) = recipe.checksums.get(method) {
            let resolved = substitute_step_command(&id, std::slice::from_ref(&checksum.value), ctx)?;
            let value = resolved.into_iter().next().unwrap_or_default();
            let key = if checksum.is_url { "checksum_url" } else { "checksum" };
            sentinel.push(format!("{key}={value}"));
        }
        sentinel
    } else {
        substitute_step_command(&id, &command, ctx)?
    };

    let timeout_sec = if kind == StepType::Tool { tool_timeout_sec(method) } else { kind.default_timeout_sec() };

    out.push(Step {
        id: id.clone(),
        kind,
        label: format!("install {} via {method}", recipe.id),
        command: Some(command),
        needs_sudo,
        timeout_sec,
        depends_on: depends_on.into_iter().collect(),
        risk: toolrig_domain::infer_step_risk(kind),
        restart_required: None,
        restart_service: None,
        progress_regex: None,
        disk_estimate_mb: None,
        status: StepStatus::Pending,
        attempts: 0,
        output_tail: String::new(),
        tool: recipe.id.clone(),
        package_manager: method_to_pm(method).map(|k| k.as_str().to_string()).or_else(|| {
            (method == &MethodKey::Snap).then(|| "snap".to_string())
        }),
        post_env_prefix,
    });
    Ok(id)
}

const GITHUB_RELEASE_SENTINEL: &str = "toolrig-github-release";

/// Build a `github_release` install step: the sentinel command carries the
/// repo (for labeling), the templated asset URL, the binary name to install
/// as, and an optional checksum token -- the executor resolves and fetches
/// the asset at execution time.
fn emit_github_release_step(
    recipe: &Recipe,
    spec: &toolrig_core::GithubReleaseSpec,
    ctx: &SubstitutionContext,
    ids: &mut StepIdGen,
    needs_sudo: bool,
    depends_on: Option<String>,
    post_env_prefix: Option<String>,
    out: &mut Vec<Step>,
) -> toolrig_core::Result<String> {
    let id = ids.next("github-release");
    let asset = substitute_step_command(&id, std::slice::from_ref(&spec.asset_url_template), ctx)?;
    let url = asset.into_iter().next().unwrap_or_default();
    let binary_name = spec.binary_name.clone().unwrap_or_else(|| recipe.cli.clone());
    let mut command = vec![
        GITHUB_RELEASE_SENTINEL.to_string(),
        spec.repo.clone(),
        url,
        format!("bin={binary_name}"),
    ];
    if let Some(checksum) = recipe.checksums.get(&MethodKey::GithubRelease) {
        let resolved = substitute_step_command(&id, std::slice::from_ref(&checksum.value), ctx)?;
        let value = resolved.into_iter().next().unwrap_or_default();
        let key = if checksum.is_url { "checksum_url" } else { "checksum" };
        command.push(format!("{key}={value}"));
    }
    out.push(Step {
        id: id.clone(),
        kind: StepType::GithubRelease,
        label: format!("install {} from GitHub release", recipe.id),
        command: Some(command),
        needs_sudo,
        timeout_sec: StepType::GithubRelease.default_timeout_sec(),
        depends_on: depends_on.into_iter().collect(),
        risk: toolrig_domain::infer_step_risk(StepType::GithubRelease),
        restart_required: None,
        restart_service: None,
        progress_regex: None,
        disk_estimate_mb: None,
        status: StepStatus::Pending,
        attempts: 0,
        output_tail: String::new(),
        tool: recipe.id.clone(),
        package_manager: None,
        post_env_prefix,
    });
    Ok(id)
}

fn catalog_family_key(method: &MethodKey) -> Option<&'static str> {
    Some(match method {
        MethodKey::Apt => "debian",
        MethodKey::Dnf | MethodKey::Yum => "rhel",
        MethodKey::Apk => "alpine",
        MethodKey::Pacman => "arch",
        MethodKey::Zypper => "suse",
        MethodKey::Brew => "macos",
        _ => return None,
    })
}

/// Source method expansion (§4.2 step 5): source -> build -> install ->
/// optional cleanup. Toolchain binaries are validated by [`method_available`]
/// before this method is ever selected.
fn emit_source_steps(
    recipe: &Recipe,
    spec: &toolrig_core::SourceSpec,
    ctx: &SubstitutionContext,
    ids: &mut StepIdGen,
    needs_sudo: bool,
    depends_on: Option<String>,
    out: &mut Vec<Step>,
) -> toolrig_core::Result<String> {
    let source_id = ids.next("source");
    let mut fetch = Vec::new();
    if let Some(repo) = &spec.git_repo {
        fetch.push("git".to_string());
        fetch.push("clone".to_string());
        if let Some(depth) = spec.depth {
            fetch.push("--depth".to_string());
            fetch.push(depth.to_string());
        }
        if let Some(branch) = &spec.branch {
            fetch.push("--branch".to_string());
            fetch.push(branch.clone());
        }
        fetch.push(repo.clone());
    } else if let Some(url) = &spec.tarball_url {
        fetch.push("curl".to_string());
        fetch.push("-Lo".to_string());
        fetch.push("source.tar.gz".to_string());
        fetch.push(url.clone());
    }
    let fetch = substitute_step_command(&source_id, &fetch, ctx)?;
    out.push(Step {
        id: source_id.clone(),
        kind: StepType::Source,
        label: format!("fetch source for {}", recipe.id),
        command: Some(fetch),
        needs_sudo: false,
        timeout_sec: StepType::Source.default_timeout_sec(),
        depends_on: depends_on.into_iter().collect(),
        risk: toolrig_domain::infer_step_risk(StepType::Source),
        restart_required: None,
        restart_service: None,
        progress_regex: None,
        disk_estimate_mb: None,
        status: StepStatus::Pending,
        attempts: 0,
        output_tail: String::new(),
        tool: recipe.id.clone(),
        package_manager: None,
        post_env_prefix: None,
    });

    let build_id = ids.next("build");
    let build_command = build_command_for(spec);
    let build_command = substitute_step_command(&build_id, &build_command, ctx)?;
    out.push(Step {
        id: build_id.clone(),
        kind: StepType::Build,
        label: format!("build {}", recipe.id),
        command: Some(build_command),
        needs_sudo: false,
        timeout_sec: spec.configure_timeout_sec.unwrap_or(StepType::Build.default_timeout_sec()),
        depends_on: vec![source_id],
        risk: toolrig_domain::infer_step_risk(StepType::Build),
        restart_required: None,
        restart_service: None,
        progress_regex: Some(r"(\d{1,3})%".to_string()),
        disk_estimate_mb: None,
        status: StepStatus::Pending,
        attempts: 0,
        output_tail: String::new(),
        tool: recipe.id.clone(),
        package_manager: None,
        post_env_prefix: None,
    });

    let install_id = ids.next("install");
    let prefix = spec.install_prefix.clone().unwrap_or_else(|| "/usr/local".to_string());
    let install_command = vec![
        "cmake".to_string(),
        "--install".to_string(),
        "build".to_string(),
        "--prefix".to_string(),
        prefix,
    ];
    let install_command = substitute_step_command(&install_id, &install_command, ctx)?;
    out.push(Step {
        id: install_id.clone(),
        kind: StepType::Install,
        label: format!("install built {} to prefix", recipe.id),
        command: Some(install_command),
        needs_sudo: needs_sudo || spec.install_needs_sudo,
        timeout_sec: StepType::Install.default_timeout_sec(),
        depends_on: vec![build_id],
        risk: toolrig_domain::infer_step_risk(StepType::Install),
        restart_required: None,
        restart_service: None,
        progress_regex: None,
        disk_estimate_mb: None,
        status: StepStatus::Pending,
        attempts: 0,
        output_tail: String::new(),
        tool: recipe.id.clone(),
        package_manager: None,
        post_env_prefix: None,
    });

    let cleanup_id = ids.next("cleanup");
    out.push(Step {
        id: cleanup_id,
        kind: StepType::Cleanup,
        label: format!("clean up source tree for {}", recipe.id),
        command: Some(vec!["rm".to_string(), "-rf".to_string(), "source".to_string()]),
        needs_sudo: false,
        timeout_sec: StepType::Cleanup.default_timeout_sec(),
        depends_on: vec![install_id.clone()],
        risk: toolrig_domain::infer_step_risk(StepType::Cleanup),
        restart_required: None,
        restart_service: None,
        progress_regex: None,
        disk_estimate_mb: None,
        status: StepStatus::Pending,
        attempts: 0,
        output_tail: String::new(),
        tool: recipe.id.clone(),
        package_manager: None,
        post_env_prefix: None,
    });

    Ok(install_id)
}

fn build_command_for(spec: &toolrig_core::SourceSpec) -> Vec<String> {
    use toolrig_core::BuildSystem;
    match spec.build_system {
        BuildSystem::Cmake => {
            let mut cmd = vec!["cmake".to_string(), "-B".to_string(), "build".to_string()];
            cmd.extend(spec.cmake_args.iter().cloned());
            cmd.push("&&".to_string());
            cmd.push("make".to_string());
            cmd.push("-C".to_string());
            cmd.push("build".to_string());
            cmd.push("-j".to_string());
            cmd
        }
        BuildSystem::Autotools => vec![
            "./configure".to_string(),
            "&&".to_string(),
            "make".to_string(),
            "-j".to_string(),
        ],
        BuildSystem::Cargo => {
            let mut cmd = vec!["cargo".to_string(), "build".to_string(), "--release".to_string()];
            cmd.extend(spec.cargo_args.iter().cloned());
            cmd
        }
        BuildSystem::Meson => vec![
            "meson".to_string(),
            "setup".to_string(),
            "build".to_string(),
            "&&".to_string(),
            "ninja".to_string(),
            "-C".to_string(),
            "build".to_string(),
        ],
        BuildSystem::Go => vec!["go".to_string(), "build".to_string(), "./...".to_string()],
        BuildSystem::Make => vec!["make".to_string(), "-j".to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolrig_catalog::Catalog;
    use toolrig_core::{BuildSystem, Requires, Risk, SourceSpec};

    fn package_recipe(id: &str, prefer: Vec<MethodKey>) -> Recipe {
        let mut install = HashMap::new();
        install.insert(
            MethodKey::Apt,
            InstallEntry::Command(vec!["apt-get".into(), "install".into(), "-y".into(), id.into()]),
        );
        install.insert(MethodKey::Default, InstallEntry::Command(vec!["curl".into(), "-fsSL".into(), format!("https://get.{id}.dev")]));
        let mut needs_sudo = HashMap::new();
        needs_sudo.insert(MethodKey::Apt, true);
        Recipe {
            id: id.into(),
            label: id.into(),
            cli: id.into(),
            category: None,
            default_version: None,
            install,
            needs_sudo,
            requires: Requires::default(),
            checksums: HashMap::new(),
            prefer,
            post_env: None,
            shell_config: None,
            post_install: vec![],
            verify: Some(vec![id.into(), "--version".into()]),
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

    fn debian_profile() -> SystemProfile {
        let mut profile = SystemProfile::default();
        profile.distro.family = Some(toolrig_core::DistroFamily::Debian);
        profile.package_manager.primary = Some(PackageManagerKind::Apt);
        profile.package_manager.available = vec![PackageManagerKind::Apt];
        profile.os.arch = Some(Arch::Amd64);
        profile.os.system = Some("linux".into());
        profile
    }

    #[test]
    fn resolves_apt_method_via_primary_pm() {
        let mut recipes = HashMap::new();
        recipes.insert("ripgrep".to_string(), package_recipe("ripgrep", vec![]));
        let catalog = Catalog::from_recipes(recipes).unwrap();
        let plan = resolve_install_plan(&catalog, "ripgrep", &debian_profile(), &ResolveRequest::default()).unwrap();
        let packages_step = plan.steps.iter().find(|s| s.kind == StepType::Packages).unwrap();
        assert_eq!(packages_step.package_manager.as_deref(), Some("apt"));
        assert!(packages_step.needs_sudo);
        assert!(plan.steps.iter().any(|s| s.kind == StepType::Verify));
    }

    #[test]
    fn prefer_list_overrides_primary_pm_when_available() {
        let mut recipe = package_recipe("docker", vec![MethodKey::Default]);
        recipe.install.remove(&MethodKey::Apt);
        recipe.install.insert(MethodKey::Apt, InstallEntry::Command(vec!["apt-get".into(), "install".into(), "docker-ce".into()]));
        let mut recipes = HashMap::new();
        recipes.insert("docker".to_string(), recipe);
        let catalog = Catalog::from_recipes(recipes).unwrap();
        let plan = resolve_install_plan(&catalog, "docker", &debian_profile(), &ResolveRequest::default()).unwrap();
        assert!(plan.steps.iter().any(|s| s.kind == StepType::Command));
    }

    #[test]
    fn missing_method_yields_no_method_available_error() {
        let mut install = HashMap::new();
        install.insert(MethodKey::Snap, InstallEntry::Command(vec!["snap".into(), "install".into()]));
        let recipe = Recipe {
            install,
            ..package_recipe("obscure-tool", vec![])
        };
        let mut recipes = HashMap::new();
        recipes.insert("obscure-tool".to_string(), recipe);
        let catalog = Catalog::from_recipes(recipes).unwrap();
        let err = resolve_install_plan(&catalog, "obscure-tool", &debian_profile(), &ResolveRequest::default()).unwrap_err();
        assert!(matches!(err, ToolRigError::NoMethodAvailable(_)));
    }

    #[test]
    fn source_method_expands_into_fetch_build_install_cleanup() {
        let mut install = HashMap::new();
        install.insert(
            MethodKey::Source,
            InstallEntry::Source(SourceSpec {
                build_system: BuildSystem::Cmake,
                git_repo: Some("https://example.invalid/opencv.git".into()),
                tarball_url: None,
                default_version: Some("4.9.0".into()),
                branch: None,
                depth: Some(1),
                requires_toolchain: vec![],
                configure_args: vec![],
                cmake_args: vec!["-DWITH_CUDA=OFF".into()],
                cargo_args: vec![],
                install_prefix: Some("/usr/local".into()),
                build_size: Some(toolrig_core::BuildSize::Large),
                configure_timeout_sec: Some(1800),
                install_needs_sudo: true,
            }),
        );
        let recipe = Recipe {
            install,
            prefer: vec![MethodKey::Source],
            ..package_recipe("opencv", vec![])
        };
        let mut recipes = HashMap::new();
        recipes.insert("opencv".to_string(), recipe);
        let catalog = Catalog::from_recipes(recipes).unwrap();
        let plan = resolve_install_plan(&catalog, "opencv", &debian_profile(), &ResolveRequest::default()).unwrap();
        let kinds: Vec<StepType> = plan.steps.iter().map(|s| s.kind).collect();
        assert!(kinds.contains(&StepType::Source));
        assert!(kinds.contains(&StepType::Build));
        assert!(kinds.contains(&StepType::Install));
        assert!(kinds.contains(&StepType::Cleanup));
        let install_step = plan.steps.iter().find(|s| s.kind == StepType::Install).unwrap();
        assert!(install_step.needs_sudo);
    }

    #[test]
    fn dependency_cycle_is_rejected() {
        let mut a = package_recipe("a", vec![]);
        a.requires.binaries = vec!["b".into()];
        let mut b = package_recipe("b", vec![]);
        b.requires.binaries = vec!["a".into()];
        let mut recipes = HashMap::new();
        recipes.insert("a".to_string(), a);
        recipes.insert("b".to_string(), b);
        let catalog_result = Catalog::from_recipes(recipes);
        assert!(catalog_result.is_err(), "catalog load already rejects this cycle");
    }

    #[test]
    fn resolving_twice_is_deterministic_modulo_plan_id_and_timestamp() {
        let mut recipes = HashMap::new();
        recipes.insert("ripgrep".to_string(), package_recipe("ripgrep", vec![]));
        let catalog = Catalog::from_recipes(recipes).unwrap();
        let profile = debian_profile();
        let a = resolve_install_plan(&catalog, "ripgrep", &profile, &ResolveRequest::default()).unwrap();
        let b = resolve_install_plan(&catalog, "ripgrep", &profile, &ResolveRequest::default()).unwrap();
        assert_eq!(a.steps.len(), b.steps.len());
        for (sa, sb) in a.steps.iter().zip(b.steps.iter()) {
            assert_eq!(sa.command, sb.command);
            assert_eq!(sa.kind, sb.kind);
        }
    }

    #[test]
    fn risk_rank_import_is_used_directly() {
        assert_eq!(toolrig_domain::infer_step_risk(StepType::Command), Risk::High);
    }

    /// Scenario B: `cargo-audit` needs build dependencies (`curl`,
    /// `pkg-config`, `libssl-dev`) even though its install method is
    /// `cargo`, not a package manager.
    #[test]
    fn non_package_manager_method_still_gets_a_packages_step() {
        let mut recipe = package_recipe("cargo-audit", vec![MethodKey::Cargo]);
        recipe.install.insert(
            MethodKey::Cargo,
            InstallEntry::Command(vec!["cargo".into(), "install".into(), "cargo-audit".into()]),
        );
        recipe
            .requires
            .packages
            .insert("debian".into(), vec!["curl".into(), "pkg-config".into(), "libssl-dev".into()]);
        let mut recipes = HashMap::new();
        recipes.insert("cargo-audit".to_string(), recipe);
        let catalog = Catalog::from_recipes(recipes).unwrap();
        let mut profile = debian_profile();
        profile.tools.insert(
            "cargo".into(),
            toolrig_core::ToolStatus { installed: true, version: None, path: None },
        );
        let plan = resolve_install_plan(&catalog, "cargo-audit", &profile, &ResolveRequest::default()).unwrap();

        let packages_step = plan
            .steps
            .iter()
            .find(|s| s.kind == StepType::Packages)
            .expect("a packages step must be emitted even for a cargo install method");
        let command = packages_step.command.as_ref().unwrap();
        assert!(command.contains(&"curl".to_string()));
        assert!(command.contains(&"pkg-config".to_string()));
        assert!(command.contains(&"libssl-dev".to_string()));

        let tool_step = plan.steps.iter().find(|s| s.kind == StepType::Tool).unwrap();
        assert!(tool_step.depends_on.contains(&packages_step.id));
    }

    #[test]
    fn pip_and_npm_default_to_120s_while_cargo_and_go_default_to_600s() {
        let mut recipe = package_recipe("black", vec![MethodKey::Pip]);
        recipe.install.insert(MethodKey::Pip, InstallEntry::Command(vec!["pip3".into(), "install".into(), "black".into()]));
        recipe.install.insert(
            MethodKey::Cargo,
            InstallEntry::Command(vec!["cargo".into(), "install".into(), "black-rs".into()]),
        );
        let mut recipes = HashMap::new();
        recipes.insert("black".to_string(), recipe);
        let catalog = Catalog::from_recipes(recipes).unwrap();

        let mut profile = debian_profile();
        profile.tools.insert(
            "pip3".into(),
            toolrig_core::ToolStatus { installed: true, version: None, path: None },
        );

        let pip_plan = resolve_install_plan(&catalog, "black", &profile, &ResolveRequest::default()).unwrap();
        let pip_step = pip_plan.steps.iter().find(|s| s.kind == StepType::Tool).unwrap();
        assert_eq!(pip_step.timeout_sec, 120);

        let cargo_timeout = tool_timeout_sec(&MethodKey::Cargo);
        assert_eq!(cargo_timeout, 600);
        assert_ne!(cargo_timeout, pip_step.timeout_sec);
    }

    #[test]
    fn github_release_method_emits_a_github_release_step() {
        let mut install = HashMap::new();
        install.insert(
            MethodKey::GithubRelease,
            InstallEntry::GithubRelease(toolrig_core::GithubReleaseSpec {
                repo: "sharkdp/bat".into(),
                asset_url_template: "https://github.com/sharkdp/bat/releases/download/latest/bat-{arch}".into(),
                binary_name: Some("bat".into()),
            }),
        );
        let mut recipe = Recipe { install, prefer: vec![MethodKey::GithubRelease], ..package_recipe("bat", vec![]) };
        recipe
            .checksums
            .insert(MethodKey::GithubRelease, toolrig_core::ChecksumSpec {
                algorithm: toolrig_core::ChecksumAlgorithm::Sha256,
                value: "deadbeef".into(),
                is_url: false,
            });
        let mut recipes = HashMap::new();
        recipes.insert("bat".to_string(), recipe);
        let catalog = Catalog::from_recipes(recipes).unwrap();
        let plan = resolve_install_plan(&catalog, "bat", &debian_profile(), &ResolveRequest::default()).unwrap();

        let step = plan
            .steps
            .iter()
            .find(|s| s.kind == StepType::GithubRelease)
            .expect("github_release method must produce a StepType::GithubRelease step");
        let command = step.command.as_ref().unwrap();
        assert_eq!(command[0], "toolrig-github-release");
        assert!(command.iter().any(|t| t == "checksum=deadbeef"));
    }
}
