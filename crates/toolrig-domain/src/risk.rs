//! Risk classification and confirmation-gate computation (§4.2 step 6).

use toolrig_core::{ConfirmationGate, RestartRequirement, Risk, RiskSummary, Step, StepType};

/// Infer a step's risk from its type when the recipe doesn't declare one
/// explicitly. Recipe-declared risk (carried on the step already) always
/// wins; this is the fallback for steps synthesized by the resolver
/// (package batches, rollback, verify).
pub fn infer_step_risk(kind: StepType) -> Risk {
    match kind {
        StepType::Verify | StepType::Notification | StepType::Config => Risk::Low,
        StepType::Packages | StepType::Repo | StepType::ShellConfig | StepType::Download => {
            Risk::Low
        }
        StepType::Tool | StepType::Source | StepType::Build | StepType::Cleanup => Risk::Medium,
        StepType::Install | StepType::Service | StepType::GithubRelease => Risk::Medium,
        StepType::Command | StepType::Exec => Risk::High,
    }
}

fn risk_rank(risk: Risk) -> u8 {
    match risk {
        Risk::Low => 0,
        Risk::Medium => 1,
        Risk::High => 2,
    }
}

/// Compute the plan's risk summary: per-step risk plus the overall max.
pub fn summarize_risk(steps: &[Step]) -> RiskSummary {
    let mut per_step_risk = std::collections::HashMap::new();
    let mut max_risk = Risk::Low;
    for step in steps {
        per_step_risk.insert(step.id.clone(), step.risk);
        if risk_rank(step.risk) > risk_rank(max_risk) {
            max_risk = step.risk;
        }
    }
    RiskSummary {
        max_risk,
        per_step_risk,
    }
}

/// Plans with `max_risk = high`, or with any `restart_required = system`,
/// require an explicit type-to-confirm acknowledgement before execution.
pub fn confirmation_gate_for(tool: &str, steps: &[Step], summary: &RiskSummary) -> Option<ConfirmationGate> {
    let has_system_restart = steps
        .iter()
        .any(|s| s.restart_required == Some(RestartRequirement::System));
    if summary.max_risk == Risk::High || has_system_restart {
        let reason = if has_system_restart {
            "requires a system reboot"
        } else {
            "includes a high-risk step"
        };
        Some(ConfirmationGate {
            level: summary.max_risk,
            prompt: format!("Installing '{tool}' {reason}. Type the tool name to confirm."),
        })
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolrig_core::StepStatus;

    fn step(id: &str, kind: StepType, risk: Risk, restart: Option<RestartRequirement>) -> Step {
        Step {
            id: id.into(),
            kind,
            label: id.into(),
            command: None,
            needs_sudo: false,
            timeout_sec: 30,
            depends_on: vec![],
            risk,
            restart_required: restart,
            restart_service: None,
            progress_regex: None,
            disk_estimate_mb: None,
            status: StepStatus::Pending,
            attempts: 0,
            output_tail: String::new(),
            tool: "demo".into(),
            package_manager: None,
            post_env_prefix: None,
        }
    }

    #[test]
    fn max_risk_is_the_maximum_across_steps() {
        let steps = vec![
            step("a", StepType::Verify, Risk::Low, None),
            step("b", StepType::Command, Risk::High, None),
        ];
        let summary = summarize_risk(&steps);
        assert_eq!(summary.max_risk, Risk::High);
    }

    #[test]
    fn high_risk_triggers_confirmation_gate() {
        let steps = vec![step("a", StepType::Command, Risk::High, None)];
        let summary = summarize_risk(&steps);
        let gate = confirmation_gate_for("opencv", &steps, &summary);
        assert!(gate.is_some());
    }

    #[test]
    fn system_restart_triggers_confirmation_gate_even_at_low_risk() {
        let steps = vec![step(
            "a",
            StepType::Packages,
            Risk::Low,
            Some(RestartRequirement::System),
        )];
        let summary = summarize_risk(&steps);
        assert!(confirmation_gate_for("kernel-tool", &steps, &summary).is_some());
    }

    #[test]
    fn low_risk_plan_has_no_gate() {
        let steps = vec![step("a", StepType::Verify, Risk::Low, None)];
        let summary = summarize_risk(&steps);
        assert!(confirmation_gate_for("ruff", &steps, &summary).is_none());
    }
}
