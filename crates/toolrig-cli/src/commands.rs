use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use tokio::sync::mpsc;
use toolrig_core::{Plan, PlanState, PlanStatus, Step, ToolRigError};
use toolrig_executor::ExecutionContext;
use toolrig_resolver::plan::ResolveRequest;

use crate::context::AppContext;
use crate::error::CliError;
use crate::events_printer;

const PROBE_BINARIES: &[&str] = &["git", "curl", "python3"];

async fn detect_profile(ctx: &AppContext) -> toolrig_core::SystemProfile {
    toolrig_detect::detect_system(&ctx.http, &ctx.probe_hosts, PROBE_BINARIES).await
}

fn load_catalog(ctx: &AppContext) -> toolrig_core::Result<toolrig_catalog::Catalog> {
    toolrig_catalog::load_dir(&ctx.catalog_dir)
}

fn home_dir() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(std::env::temp_dir)
}

fn running_as_root_via_sudo() -> bool {
    // SAFETY: geteuid() takes no arguments and cannot fail.
    let is_root = unsafe { libc::geteuid() == 0 };
    is_root && std::env::var_os("SUDO_USER").is_some()
}

/// `SUDO_ASKPASS`, per §6: a helper program whose stdout is the password.
fn resolve_sudo_password(explicit: Option<String>) -> Option<String> {
    if explicit.is_some() {
        return explicit;
    }
    let askpass = std::env::var("SUDO_ASKPASS").ok()?;
    let output = std::process::Command::new(askpass).output().ok()?;
    Some(String::from_utf8_lossy(&output.stdout).trim_end().to_string())
}

pub async fn detect(ctx: &AppContext) -> Result<i32, CliError> {
    let profile = detect_profile(ctx).await;
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(crate::exit::SUCCESS)
}

fn build_request(answers: Vec<(String, String)>) -> ResolveRequest {
    ResolveRequest { answers: answers.into_iter().collect::<HashMap<_, _>>(), inputs: HashMap::new(), peer_versions: HashMap::new() }
}

pub async fn plan(ctx: &AppContext, tool: &str, answers: Vec<(String, String)>) -> Result<i32, CliError> {
    let catalog = load_catalog(ctx)?;
    if !catalog.contains(tool) {
        return Err(CliError::UnknownTool(tool.to_string()));
    }
    let profile = detect_profile(ctx).await;
    let request = build_request(answers);
    let plan = toolrig_resolver::resolve_install_plan(&catalog, tool, &profile, &request)?;
    println!("{}", serde_json::to_string_pretty(&plan)?);
    Ok(crate::exit::SUCCESS)
}

pub async fn install(
    ctx: &AppContext,
    tool: &str,
    answers: Vec<(String, String)>,
    yes: bool,
    sudo_password: Option<String>,
) -> Result<i32, CliError> {
    let catalog = load_catalog(ctx)?;
    if !catalog.contains(tool) {
        return Err(CliError::UnknownTool(tool.to_string()));
    }
    let profile = detect_profile(ctx).await;
    let request = build_request(answers);
    let plan = toolrig_resolver::resolve_install_plan(&catalog, tool, &profile, &request)?;

    if let Some(gate) = &plan.confirmation_gate
        && !yes
    {
        return Err(CliError::ConfirmationRequired { tool: tool.to_string(), prompt: gate.prompt.clone() });
    }

    let mut state = PlanState::new(plan);
    run_plan_to_completion(ctx, &mut state, profile, sudo_password).await
}

pub async fn remove(ctx: &AppContext, tool: &str, yes: bool, sudo_password: Option<String>) -> Result<i32, CliError> {
    let last = find_latest_done_plan(&ctx.state_dir, tool)?;
    let rollback_steps: Vec<Step> = last.plan.rollback.clone();
    if rollback_steps.is_empty() {
        println!("nothing to roll back for '{tool}'");
        return Ok(crate::exit::SUCCESS);
    }

    let risk_summary = toolrig_domain::summarize_risk(&rollback_steps);
    let confirmation_gate = toolrig_domain::confirmation_gate_for(tool, &rollback_steps, &risk_summary);

    let plan = Plan {
        plan_id: toolrig_core::new_plan_id(),
        tool: tool.to_string(),
        created_at: chrono::Utc::now(),
        answers: HashMap::new(),
        inputs: HashMap::new(),
        steps: rollback_steps,
        rollback: Vec::new(),
        risk_summary,
        confirmation_gate,
        version_constraint_result: None,
        status: PlanStatus::Created,
    };

    if let Some(gate) = &plan.confirmation_gate
        && !yes
    {
        return Err(CliError::ConfirmationRequired { tool: tool.to_string(), prompt: gate.prompt.clone() });
    }

    let profile = detect_profile(ctx).await;
    let mut state = PlanState::new(plan);
    run_plan_to_completion(ctx, &mut state, profile, sudo_password).await
}

pub async fn resume(ctx: &AppContext, plan_id: &str, sudo_password: Option<String>) -> Result<i32, CliError> {
    let mut state = toolrig_state::load_plan_state(&ctx.state_dir, plan_id)?;
    if !matches!(state.plan.status, PlanStatus::Paused | PlanStatus::Running) {
        return Err(CliError::NotResumable(plan_id.to_string()));
    }
    let profile = match state.system_profile_snapshot.clone() {
        Some(snapshot) => snapshot,
        None => detect_profile(ctx).await,
    };
    state.pause_reason = None;
    state.paused_at = None;
    run_plan_to_completion(ctx, &mut state, profile, sudo_password).await
}

pub async fn cancel(ctx: &AppContext, plan_id: &str) -> Result<i32, CliError> {
    let mut state = toolrig_state::load_plan_state(&ctx.state_dir, plan_id)?;
    state.plan.status = PlanStatus::Cancelled;
    toolrig_state::save_plan_state(&ctx.state_dir, &state)?;
    println!("{{\"ok\":true}}");
    Ok(crate::exit::SUCCESS)
}

pub async fn list_plans(ctx: &AppContext) -> Result<i32, CliError> {
    let plans = toolrig_state::list_pending_plans(&ctx.state_dir)?;
    println!("{}", serde_json::to_string_pretty(&plans)?);
    Ok(crate::exit::SUCCESS)
}

async fn run_plan_to_completion(
    ctx: &AppContext,
    state: &mut PlanState,
    profile: toolrig_core::SystemProfile,
    sudo_password: Option<String>,
) -> Result<i32, CliError> {
    std::fs::create_dir_all(&ctx.state_dir)?;
    let _lock = toolrig_lock::acquire_plan_lock(&ctx.state_dir, &state.plan.plan_id, "cli execute")?;

    let exec_ctx = Arc::new(ExecutionContext {
        profile,
        sudo_password: resolve_sudo_password(sudo_password),
        home_dir: home_dir(),
        running_as_root_via_sudo: running_as_root_via_sudo(),
        http: ctx.http.clone(),
    });

    toolrig_state::save_plan_state(&ctx.state_dir, state)?;

    let (tx, rx) = mpsc::unbounded_channel();
    let cancel = Arc::new(AtomicBool::new(false));
    let parallelism = toolrig_orchestrator::default_parallelism_limit();

    let printer = tokio::spawn(events_printer::drain(rx));
    let outcome = toolrig_orchestrator::run_plan(state, exec_ctx, &ctx.state_dir, parallelism, tx, cancel).await;
    let _ = printer.await;

    toolrig_state::save_plan_state(&ctx.state_dir, state)?;

    Ok(match outcome.status {
        PlanStatus::Done => crate::exit::SUCCESS,
        PlanStatus::Failed => crate::exit::PLAN_FAILED,
        _ => crate::exit::SUCCESS,
    })
}

fn find_latest_done_plan(state_dir: &std::path::Path, tool: &str) -> Result<PlanState, CliError> {
    let mut best: Option<PlanState> = None;
    let entries = std::fs::read_dir(state_dir).map_err(ToolRigError::Io)?;
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let Some(plan_id) = path.file_stem().and_then(|s| s.to_str()) else { continue };
        let Ok(candidate) = toolrig_state::load_plan_state(state_dir, plan_id) else { continue };
        if candidate.plan.tool != tool || candidate.plan.status != PlanStatus::Done {
            continue;
        }
        if best.as_ref().is_none_or(|b| candidate.plan.created_at > b.plan.created_at) {
            best = Some(candidate);
        }
    }
    best.ok_or_else(|| CliError::UnknownTool(format!("no completed install found for '{tool}'")))
}
