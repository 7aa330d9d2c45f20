//! The DAG scheduler (§4.5): a single coordinator driving a bounded
//! worker pool, one tick at a time. Subprocesses are the only true
//! parallelism; the coordinator itself never runs two ticks concurrently.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::{Semaphore, mpsc};
use toolrig_core::{ErrorAnalysis, ErrorKind, PlanState, PlanStatus, Step, StepStatus, StepType};
use toolrig_executor::ExecutionContext;
use toolrig_lock::slot::{SlotAcquireResult, try_acquire_slot};

use crate::events::{Event, EventPayload};

/// Default worker-pool size absent an explicit override, per §4.5.
pub fn default_parallelism_limit() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1).min(4)
}

/// Bounded, classic-backoff: attempts up to `max_retries` on a transient
/// failure (network, PM lock) before giving up on a step for good.
const DEFAULT_MAX_RETRIES: u32 = 3;
const POLL_INTERVAL: Duration = Duration::from_millis(50);

pub struct RunOutcome {
    pub status: PlanStatus,
}

/// Drive `state`'s DAG to completion, pause, or failure, emitting events
/// on `events_tx` as it goes. `state_dir` is used for per-plan-manager
/// mutex slots; `cancel` is checked between ticks.
pub async fn run_plan(
    state: &mut PlanState,
    ctx: Arc<ExecutionContext>,
    state_dir: &Path,
    parallelism_limit: usize,
    events_tx: mpsc::UnboundedSender<Event>,
    cancel: Arc<AtomicBool>,
) -> RunOutcome {
    let now = || chrono::Utc::now();
    let send = |tx: &mpsc::UnboundedSender<Event>, payload: EventPayload| {
        let _ = tx.send(Event::new(state.plan.plan_id.clone(), payload, now()));
    };

    send(&events_tx, EventPayload::PlanStarted);
    state.plan.status = PlanStatus::Running;

    let semaphore = Arc::new(Semaphore::new(parallelism_limit.max(1)));

    loop {
        if cancel.load(Ordering::SeqCst) {
            state.plan.status = PlanStatus::Cancelled;
            break;
        }

        if state.plan.is_complete() {
            state.plan.status = PlanStatus::Done;
            break;
        }

        if state.plan.has_failed_step() {
            state.plan.status = PlanStatus::Failed;
            break;
        }

        let done: HashSet<&str> =
            state.plan.steps.iter().filter(|s| s.status == StepStatus::Done).map(|s| s.id.as_str()).collect();
        let running_pms: HashSet<&str> = state
            .plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::Running)
            .filter_map(|s| s.package_manager.as_deref())
            .collect();
        let ready_ids: Vec<String> =
            toolrig_domain::ready_steps(&state.plan.steps, &done, &running_pms).into_iter().map(|s| s.id.clone()).collect();

        if ready_ids.is_empty() {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }

        let mut handles = Vec::new();
        for step_id in ready_ids {
            let build_failure = state
                .plan
                .step(&step_id)
                .filter(|s| s.kind == StepType::Build)
                .and_then(|s| build_preflight_failure(s, &ctx));
            if let Some(reason) = build_failure {
                let step = state.plan.step_mut(&step_id).expect("ready step exists");
                step.status = StepStatus::Failed;
                step.output_tail = reason.clone();
                let analysis = ErrorAnalysis {
                    kind: ErrorKind::ResourceDiskFull,
                    what_happened: reason,
                    why: None,
                    suggestions: vec!["free up disk space or reduce the build's estimated footprint".to_string()],
                };
                send(&events_tx, EventPayload::StepFinished {
                    step_id: step_id.clone(),
                    status: StepStatus::Failed,
                    analysis: Some(analysis),
                });
                continue;
            }

            let Some(permit) = semaphore.clone().try_acquire_owned().ok() else { break };
            let Some(slot) = acquire_pm_slot(state_dir, &state.plan.steps, &step_id, &state.plan.plan_id) else {
                continue;
            };
            let step = state.plan.step_mut(&step_id).expect("ready step exists");
            step.status = StepStatus::Running;
            let step_snapshot = step.clone();

            send(&events_tx, EventPayload::StepStarted { step_id: step_id.clone(), label: step_snapshot.label.clone() });

            let ctx = ctx.clone();
            let tx = events_tx.clone();
            let plan_id = state.plan.plan_id.clone();
            let handle = tokio::spawn(async move {
                let _permit = permit;
                let _slot = slot;
                let progress_tx = tx.clone();
                let progress_step_id = step_id.clone();
                let progress_plan_id = plan_id.clone();
                let outcome = toolrig_executor::execute_step(&step_snapshot, &ctx, move |percent| {
                    let _ = progress_tx.send(Event::new(
                        progress_plan_id.clone(),
                        EventPayload::StepProgress { step_id: progress_step_id.clone(), percent: Some(percent), line: String::new() },
                        chrono::Utc::now(),
                    ));
                })
                .await;
                (step_id, outcome)
            });
            handles.push(handle);
        }

        if handles.is_empty() {
            tokio::time::sleep(POLL_INTERVAL).await;
            continue;
        }

        for handle in handles {
            let Ok((step_id, outcome)) = handle.await else { continue };
            let step = state.plan.step_mut(&step_id).expect("step exists");
            step.attempts += 1;
            step.output_tail = format!("{}\n{}", outcome.stdout_tail, outcome.stderr_tail);

            if outcome.ok {
                step.status = StepStatus::Done;
                send(&events_tx, EventPayload::StepFinished { step_id: step_id.clone(), status: StepStatus::Done, analysis: None });
                continue;
            }

            let is_transient = outcome.analysis.as_ref().is_some_and(|a| a.kind.is_transient());

            if is_transient && step.attempts < DEFAULT_MAX_RETRIES {
                step.status = StepStatus::Pending;
                send(&events_tx, EventPayload::StepProgress { step_id: step_id.clone(), percent: None, line: format!("retrying after transient failure (attempt {})", step.attempts) });
                continue;
            }

            step.status = StepStatus::Failed;
            send(&events_tx, EventPayload::StepFinished { step_id: step_id.clone(), status: StepStatus::Failed, analysis: outcome.analysis.clone() });
        }

        if let Err(err) = toolrig_state::save_plan_state(state_dir, state) {
            tracing::warn!(%err, "failed to checkpoint plan state mid-run");
        }

        let just_done: Vec<Step> =
            state.plan.steps.iter().filter(|s| s.status == StepStatus::Done).cloned().collect();
        if let Some(requirement) = toolrig_domain::strongest_requirement(&just_done)
            && toolrig_domain::requires_pause(requirement)
            && state.plan.status == PlanStatus::Running
        {
            state.plan.status = PlanStatus::Paused;
            state.pause_reason = Some(toolrig_domain::pause_instructions(requirement, None));
            state.paused_at = Some(now());
            if matches!(requirement, toolrig_core::RestartRequirement::System) {
                state.system_profile_snapshot = Some(ctx.profile.clone());
            }
            send(&events_tx, EventPayload::PlanPaused { reason: state.pause_reason.clone().unwrap_or_default() });
            break;
        }
    }

    send(&events_tx, EventPayload::PlanFinished { status: state.plan.status });
    RunOutcome { status: state.plan.status }
}

/// §4.4: pre-check disk and RAM before starting a `build` step, so a
/// doomed build fails immediately instead of after twenty minutes.
fn build_preflight_failure(step: &Step, ctx: &ExecutionContext) -> Option<String> {
    let report = toolrig_resource::check_build_preflight(&ctx.profile.hardware, step.disk_estimate_mb, ctx.home_dir.to_string_lossy().as_ref());
    (!report.ok).then(|| report.reasons.join("; "))
}

fn acquire_pm_slot(
    state_dir: &Path,
    steps: &[Step],
    step_id: &str,
    plan_id: &str,
) -> Option<Option<toolrig_lock::slot::PmSlot>> {
    let step = steps.iter().find(|s| s.id == step_id)?;
    let Some(pm) = &step.package_manager else {
        return Some(None);
    };
    match try_acquire_slot(state_dir, pm, 1, Some(plan_id)) {
        Ok(SlotAcquireResult::Acquired(slot)) => Some(Some(slot)),
        Ok(SlotAcquireResult::Exhausted(_)) => None,
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use toolrig_core::{Plan, Risk, RiskSummary, StepType, SystemProfile};

    fn step(id: &str, command: &str, depends_on: Vec<&str>) -> Step {
        let kind = StepType::Verify;
        Step {
            id: id.to_string(),
            kind,
            label: format!("run {command}"),
            command: Some(vec![command.to_string()]),
            needs_sudo: false,
            timeout_sec: 5,
            depends_on: depends_on.into_iter().map(String::from).collect(),
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

    fn plan_state(steps: Vec<Step>) -> PlanState {
        PlanState::new(Plan {
            plan_id: "plan-1".to_string(),
            tool: "demo".to_string(),
            created_at: chrono::Utc::now(),
            answers: HashMap::new(),
            inputs: HashMap::new(),
            steps,
            rollback: vec![],
            risk_summary: RiskSummary { max_risk: Risk::Low, per_step_risk: HashMap::new() },
            confirmation_gate: None,
            version_constraint_result: None,
            status: PlanStatus::Created,
        })
    }

    #[tokio::test]
    async fn runs_dependent_steps_in_order_to_completion() {
        let mut state = plan_state(vec![step("s1", "true", vec![]), step("s2", "true", vec!["s1"])]);
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(ExecutionContext {
            profile: SystemProfile::default(),
            sudo_password: None,
            home_dir: dir.path().to_path_buf(),
            running_as_root_via_sudo: false,
            http: reqwest::Client::new(),
        });
        let (tx, mut rx) = mpsc::unbounded_channel();
        let outcome = run_plan(&mut state, ctx, dir.path(), 2, tx, Arc::new(AtomicBool::new(false))).await;

        assert_eq!(outcome.status, PlanStatus::Done);
        assert!(state.plan.steps.iter().all(|s| s.status == StepStatus::Done));

        let mut saw_plan_started = false;
        let mut saw_plan_finished = false;
        while let Ok(event) = rx.try_recv() {
            match event.payload {
                EventPayload::PlanStarted => saw_plan_started = true,
                EventPayload::PlanFinished { status } => {
                    saw_plan_finished = true;
                    assert_eq!(status, PlanStatus::Done);
                }
                _ => {}
            }
        }
        assert!(saw_plan_started);
        assert!(saw_plan_finished);
    }

    #[tokio::test]
    async fn a_failed_step_fails_the_plan() {
        let mut state = plan_state(vec![step("s1", "false", vec![])]);
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(ExecutionContext {
            profile: SystemProfile::default(),
            sudo_password: None,
            home_dir: dir.path().to_path_buf(),
            running_as_root_via_sudo: false,
            http: reqwest::Client::new(),
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let outcome = run_plan(&mut state, ctx, dir.path(), 2, tx, Arc::new(AtomicBool::new(false))).await;
        assert_eq!(outcome.status, PlanStatus::Failed);
    }

    #[tokio::test]
    async fn cancellation_stops_scheduling_new_steps() {
        let mut state = plan_state(vec![step("s1", "true", vec![])]);
        let dir = tempfile::tempdir().unwrap();
        let ctx = Arc::new(ExecutionContext {
            profile: SystemProfile::default(),
            sudo_password: None,
            home_dir: dir.path().to_path_buf(),
            running_as_root_via_sudo: false,
            http: reqwest::Client::new(),
        });
        let (tx, _rx) = mpsc::unbounded_channel();
        let cancel = Arc::new(AtomicBool::new(true));
        let outcome = run_plan(&mut state, ctx, dir.path(), 2, tx, cancel).await;
        assert_eq!(outcome.status, PlanStatus::Cancelled);
    }
}
