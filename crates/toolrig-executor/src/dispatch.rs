//! Per-step-type dispatch (§4.4): builds a [`toolrig_process::RunSpec`]
//! from a [`Step`] and runs it, or handles `shell_config` directly.

use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;

use toolrig_core::{ErrorAnalysis, Step, StepType, SystemProfile};
use toolrig_process::{RunOutcome, RunSpec, run};

use crate::asset_fetch::{self, AssetFetchError};
use crate::shell_append;

/// Everything a step needs beyond its own fields: the host profile (for
/// `has_systemd`/shell detection), the sudo password for this plan's
/// lifetime, and the invoking user's home directory.
#[derive(Clone)]
pub struct ExecutionContext {
    pub profile: SystemProfile,
    pub sudo_password: Option<String>,
    pub home_dir: PathBuf,
    pub running_as_root_via_sudo: bool,
    pub http: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct StepOutcome {
    pub ok: bool,
    pub returncode: i32,
    pub stdout_tail: String,
    pub stderr_tail: String,
    pub duration_ms: u64,
    pub analysis: Option<ErrorAnalysis>,
}

impl From<RunOutcome> for StepOutcome {
    fn from(outcome: RunOutcome) -> Self {
        let analysis = (!outcome.ok)
            .then(|| toolrig_domain::classify(&outcome.stderr_tail, outcome.returncode, outcome.timed_out));
        StepOutcome {
            ok: outcome.ok,
            returncode: outcome.returncode,
            stdout_tail: outcome.stdout_tail,
            stderr_tail: outcome.stderr_tail,
            duration_ms: outcome.duration_ms,
            analysis,
        }
    }
}

/// Dispatch one step to completion.
pub async fn execute_step(
    step: &Step,
    ctx: &ExecutionContext,
    on_progress: impl FnMut(u32) + Send + 'static,
) -> StepOutcome {
    match step.kind {
        StepType::ShellConfig => execute_shell_config(step, ctx),
        StepType::Service if !ctx.profile.capabilities.has_systemd => StepOutcome {
            ok: true,
            returncode: 0,
            stdout_tail: String::new(),
            stderr_tail: "no systemd on this host; service step skipped".to_string(),
            duration_ms: 0,
            analysis: None,
        },
        StepType::Command => execute_command_script(step, ctx).await,
        StepType::GithubRelease => execute_github_release(step, ctx).await,
        _ => execute_subprocess(step, ctx, on_progress).await,
    }
}

fn fetch_error_outcome(err: AssetFetchError) -> StepOutcome {
    let stderr_tail = match &err {
        AssetFetchError::NotFound { url } => format!("404 not found: {url}"),
        AssetFetchError::ChecksumMismatch { .. } => format!("checksum mismatch: {err}"),
        other => other.to_string(),
    };
    StepOutcome {
        ok: false,
        returncode: -1,
        stdout_tail: String::new(),
        analysis: Some(toolrig_domain::classify(&stderr_tail, -1, false)),
        stderr_tail,
        duration_ms: 0,
    }
}

/// Resolve (and, if declared, verify) a checksum token parsed from a
/// sentinel command's trailing `checksum=<hex>`/`checksum_url=<url>` entry.
async fn resolve_checksum(
    http: &reqwest::Client,
    bytes: &[u8],
    url: &str,
    tokens: &[String],
) -> Result<(), AssetFetchError> {
    for token in tokens {
        if let Some(hex) = token.strip_prefix("checksum=") {
            return asset_fetch::verify(url, bytes, hex);
        }
        if let Some(checksum_url) = token.strip_prefix("checksum_url=") {
            let body = asset_fetch::download(http, checksum_url).await?;
            let body = String::from_utf8_lossy(&body);
            let digest = asset_fetch::extract_digest(&body)
                .ok_or_else(|| AssetFetchError::NoDigestInChecksumsFile { url: checksum_url.to_string() })?;
            return asset_fetch::verify(url, bytes, &digest);
        }
    }
    Ok(())
}

/// §4.4 `command`: download to a tempfile, checksum-verify if declared,
/// execute the tempfile directly -- never pipe the download to a shell.
async fn execute_command_script(step: &Step, ctx: &ExecutionContext) -> StepOutcome {
    let Some(command) = &step.command else {
        return StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: "command step missing its sentinel command".to_string(),
            duration_ms: 0,
            analysis: None,
        };
    };
    let Some(url) = command.get(1) else {
        return StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: "command step sentinel carries no download URL".to_string(),
            duration_ms: 0,
            analysis: None,
        };
    };

    let started = std::time::Instant::now();
    let bytes = match asset_fetch::download(&ctx.http, url).await {
        Ok(bytes) => bytes,
        Err(err) => return fetch_error_outcome(err),
    };
    if let Err(err) = resolve_checksum(&ctx.http, &bytes, url, &command[2..]).await {
        return fetch_error_outcome(err);
    }

    let dir = match tempfile::tempdir() {
        Ok(dir) => dir,
        Err(err) => {
            return StepOutcome {
                ok: false,
                returncode: -1,
                stdout_tail: String::new(),
                stderr_tail: format!("failed to create tempdir: {err}"),
                duration_ms: started.elapsed().as_millis() as u64,
                analysis: None,
            };
        }
    };
    let script_path = dir.path().join("toolrig-install-script");
    if let Err(err) = std::fs::write(&script_path, &bytes) {
        return StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: format!("failed to write downloaded script: {err}"),
            duration_ms: started.elapsed().as_millis() as u64,
            analysis: None,
        };
    }
    if let Err(err) = std::fs::set_permissions(&script_path, std::fs::Permissions::from_mode(0o700)) {
        return StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: format!("failed to chmod downloaded script: {err}"),
            duration_ms: started.elapsed().as_millis() as u64,
            analysis: None,
        };
    }

    let spec = RunSpec {
        argv: vec![script_path.to_string_lossy().into_owned()],
        needs_sudo: step.needs_sudo,
        sudo_password: ctx.sudo_password.clone(),
        timeout: Some(std::time::Duration::from_secs(step.timeout_sec)),
        post_env_prefix: wraps_post_env(step.kind).then(|| step.post_env_prefix.clone()).flatten(),
        progress_regex: step.progress_regex.clone(),
        cwd: None,
    };
    run(spec, |_| {}).await.into()
}

/// §4.4 `github_release`: resolve the (already-templated) asset URL,
/// checksum-verify when declared, install to `/usr/local/bin` if
/// writable-with-sudo else `~/.local/bin`, `chmod +x`.
async fn execute_github_release(step: &Step, ctx: &ExecutionContext) -> StepOutcome {
    let Some(command) = &step.command else {
        return StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: "github_release step missing its sentinel command".to_string(),
            duration_ms: 0,
            analysis: None,
        };
    };
    let (Some(url), Some(bin_token)) = (command.get(2), command.get(3)) else {
        return StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: "github_release step sentinel missing asset URL or binary name".to_string(),
            duration_ms: 0,
            analysis: None,
        };
    };
    let binary_name = bin_token.strip_prefix("bin=").unwrap_or(bin_token);

    let started = std::time::Instant::now();
    let bytes = match asset_fetch::download(&ctx.http, url).await {
        Ok(bytes) => bytes,
        Err(err) => return fetch_error_outcome(err),
    };
    if let Err(err) = resolve_checksum(&ctx.http, &bytes, url, &command[4..]).await {
        return fetch_error_outcome(err);
    }

    let install_dir = if ctx.profile.capabilities.has_sudo || ctx.profile.capabilities.is_root {
        PathBuf::from("/usr/local/bin")
    } else {
        ctx.home_dir.join(".local/bin")
    };
    if let Err(err) = std::fs::create_dir_all(&install_dir) {
        return StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: format!("failed to create {}: {err}", install_dir.display()),
            duration_ms: started.elapsed().as_millis() as u64,
            analysis: None,
        };
    }
    let target = install_dir.join(binary_name);
    if let Err(err) = std::fs::write(&target, &bytes) {
        return StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: format!("failed to write {}: {err}", target.display()),
            duration_ms: started.elapsed().as_millis() as u64,
            analysis: None,
        };
    }
    if let Err(err) = std::fs::set_permissions(&target, std::fs::Permissions::from_mode(0o755)) {
        return StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: format!("failed to chmod {}: {err}", target.display()),
            duration_ms: started.elapsed().as_millis() as u64,
            analysis: None,
        };
    }

    StepOutcome {
        ok: true,
        returncode: 0,
        stdout_tail: format!("installed {}", target.display()),
        stderr_tail: String::new(),
        duration_ms: started.elapsed().as_millis() as u64,
        analysis: None,
    }
}

async fn execute_subprocess(
    step: &Step,
    ctx: &ExecutionContext,
    on_progress: impl FnMut(u32) + Send + 'static,
) -> StepOutcome {
    let Some(argv) = &step.command else {
        return StepOutcome {
            ok: true,
            returncode: 0,
            stdout_tail: String::new(),
            stderr_tail: String::new(),
            duration_ms: 0,
            analysis: None,
        };
    };

    let spec = RunSpec {
        argv: argv.clone(),
        needs_sudo: step.needs_sudo,
        sudo_password: ctx.sudo_password.clone(),
        timeout: Some(std::time::Duration::from_secs(step.timeout_sec)),
        post_env_prefix: wraps_post_env(step.kind).then(|| step.post_env_prefix.clone()).flatten(),
        progress_regex: step.progress_regex.clone(),
        cwd: None,
    };

    run(spec, on_progress).await.into()
}

/// §4.4: `post_env` is prepended only for these step types.
fn wraps_post_env(kind: StepType) -> bool {
    matches!(
        kind,
        StepType::Tool | StepType::Verify | StepType::Command | StepType::Build | StepType::Install | StepType::Exec
    )
}

fn execute_shell_config(step: &Step, ctx: &ExecutionContext) -> StepOutcome {
    let Some(command) = &step.command else {
        return StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: "shell_config step missing its sentinel command".to_string(),
            duration_ms: 0,
            analysis: None,
        };
    };

    match shell_append::apply(command, &ctx.profile.shell, &ctx.home_dir, ctx.running_as_root_via_sudo) {
        Ok(outcome) => StepOutcome {
            ok: true,
            returncode: 0,
            stdout_tail: if outcome.already_present {
                format!("already present in {}", outcome.rc_file.display())
            } else {
                format!("appended {} line(s) to {}", outcome.lines_added.len(), outcome.rc_file.display())
            },
            stderr_tail: String::new(),
            duration_ms: 0,
            analysis: None,
        },
        Err(err) => StepOutcome {
            ok: false,
            returncode: -1,
            stdout_tail: String::new(),
            stderr_tail: err.to_string(),
            duration_ms: 0,
            analysis: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolrig_core::{Risk, StepStatus};

    fn base_step(kind: StepType, command: Option<Vec<String>>) -> Step {
        Step {
            id: "s1".to_string(),
            kind,
            label: "test step".to_string(),
            command,
            needs_sudo: false,
            timeout_sec: kind.default_timeout_sec(),
            depends_on: vec![],
            risk: Risk::Low,
            restart_required: None,
            restart_service: None,
            progress_regex: None,
            disk_estimate_mb: None,
            status: StepStatus::Pending,
            attempts: 0,
            output_tail: String::new(),
            tool: "demo".to_string(),
            package_manager: None,
            post_env_prefix: None,
        }
    }

    fn base_ctx() -> ExecutionContext {
        ExecutionContext {
            profile: SystemProfile::default(),
            sudo_password: None,
            home_dir: std::env::temp_dir(),
            running_as_root_via_sudo: false,
            http: reqwest::Client::new(),
        }
    }

    #[tokio::test]
    async fn runs_generic_step_successfully() {
        let step = base_step(StepType::Verify, Some(vec!["true".to_string()]));
        let outcome = execute_step(&step, &base_ctx(), |_| {}).await;
        assert!(outcome.ok);
        assert!(outcome.analysis.is_none());
    }

    #[tokio::test]
    async fn failed_step_gets_classified() {
        let step = base_step(StepType::Tool, Some(vec!["false".to_string()]));
        let outcome = execute_step(&step, &base_ctx(), |_| {}).await;
        assert!(!outcome.ok);
        assert!(outcome.analysis.is_some());
    }

    #[tokio::test]
    async fn service_step_skips_without_systemd() {
        let step = base_step(StepType::Service, Some(vec!["systemctl".to_string(), "start".to_string()]));
        let outcome = execute_step(&step, &base_ctx(), |_| {}).await;
        assert!(outcome.ok);
    }

    #[tokio::test]
    async fn command_step_without_a_url_token_fails_without_a_network_call() {
        let step = base_step(StepType::Command, Some(vec!["toolrig-download-script".to_string()]));
        let outcome = execute_step(&step, &base_ctx(), |_| {}).await;
        assert!(!outcome.ok);
        assert!(outcome.stderr_tail.contains("URL"));
    }

    #[tokio::test]
    async fn github_release_step_missing_asset_url_fails_without_a_network_call() {
        let step = base_step(StepType::GithubRelease, Some(vec!["toolrig-github-release".to_string(), "sharkdp/bat".to_string()]));
        let outcome = execute_step(&step, &base_ctx(), |_| {}).await;
        assert!(!outcome.ok);
        assert!(outcome.stderr_tail.contains("sentinel"));
    }

    #[tokio::test]
    async fn shell_config_step_writes_rc_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut ctx = base_ctx();
        ctx.home_dir = dir.path().to_path_buf();
        ctx.profile.shell.kind = Some("bash".to_string());
        let step = base_step(
            StepType::ShellConfig,
            Some(vec![shell_append::SENTINEL.to_string(), "/opt/tool/bin".to_string()]),
        );
        let outcome = execute_step(&step, &ctx, |_| {}).await;
        assert!(outcome.ok);
        assert!(outcome.stdout_tail.contains("appended"));
    }
}
