//! Rollback synthesis: the undo catalog (§4.2 step 8, §8 invariant 5).
//!
//! For each mutating step the resolver emits, this module derives its
//! inverse (remove/uninstall/delete-line/disable-service) keyed by step
//! type and, where relevant, package manager / method.

use toolrig_core::{Risk, Step, StepStatus, StepType};

/// Build the inverse of a single completed mutating step. Returns `None`
/// for step types with no meaningful undo (verify, notification, cleanup,
/// config writes that are naturally idempotent to leave in place).
pub fn inverse_step(step: &Step) -> Option<Step> {
    if !step.is_mutating() {
        return None;
    }

    let (label, command) = match step.kind {
        StepType::Packages => (
            format!("remove packages installed for {}", step.tool),
            remove_packages_command(step),
        ),
        StepType::Repo => (
            format!("remove repository added for {}", step.tool),
            step.command.clone().map(|_| vec!["true".to_string()]),
        ),
        StepType::Tool | StepType::GithubRelease => (
            format!("uninstall {}", step.tool),
            step.command.clone(),
        ),
        StepType::Install => (
            format!("remove installed files for {}", step.tool),
            step.command.clone(),
        ),
        StepType::Service => (
            format!("stop and disable service for {}", step.tool),
            step.restart_service.clone().map(|svc| {
                vec![
                    "systemctl".to_string(),
                    "disable".to_string(),
                    "--now".to_string(),
                    svc,
                ]
            }),
        ),
        StepType::ShellConfig => (
            format!("remove shell profile line added for {}", step.tool),
            step.command.clone(),
        ),
        StepType::Source | StepType::Build | StepType::Download => {
            return None;
        }
        StepType::Config | StepType::Notification | StepType::Verify | StepType::Cleanup => {
            return None;
        }
        // `command` (download-then-execute scripts) and `exec` (ad hoc
        // post-install commands, e.g. group membership changes) have no
        // generically safe inverse.
        StepType::Command | StepType::Exec => {
            return None;
        }
    };

    Some(Step {
        id: format!("rollback-{}", step.id),
        kind: step.kind,
        label,
        command,
        needs_sudo: step.needs_sudo,
        timeout_sec: step.timeout_sec,
        depends_on: vec![],
        risk: Risk::Medium,
        restart_required: None,
        restart_service: None,
        progress_regex: None,
        disk_estimate_mb: None,
        status: StepStatus::Pending,
        attempts: 0,
        output_tail: String::new(),
        tool: step.tool.clone(),
        package_manager: step.package_manager.clone(),
        post_env_prefix: None,
    })
}

fn remove_packages_command(step: &Step) -> Option<Vec<String>> {
    let pm = step.package_manager.as_deref()?;
    let packages: Vec<String> = step
        .command
        .as_ref()?
        .iter()
        .skip_while(|tok| tok.starts_with('-') || *tok == pm || *tok == "install")
        .cloned()
        .collect();
    let mut cmd = match pm {
        "apt" => vec!["apt-get".to_string(), "remove".to_string(), "-y".to_string()],
        "dnf" => vec!["dnf".to_string(), "remove".to_string(), "-y".to_string()],
        "yum" => vec!["yum".to_string(), "remove".to_string(), "-y".to_string()],
        "apk" => vec!["apk".to_string(), "del".to_string()],
        "pacman" => vec!["pacman".to_string(), "-R".to_string(), "--noconfirm".to_string()],
        "zypper" => vec!["zypper".to_string(), "remove".to_string(), "-y".to_string()],
        "brew" => vec!["brew".to_string(), "uninstall".to_string()],
        _ => return None,
    };
    cmd.extend(packages);
    Some(cmd)
}

/// Build the ordered rollback sequence for a set of completed mutating
/// steps: the inverse of each, in reverse completion order.
pub fn synthesize_rollback(completed_steps: &[Step]) -> Vec<Step> {
    completed_steps
        .iter()
        .rev()
        .filter_map(inverse_step)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packages_step(tool: &str, pm: &str, packages: &[&str]) -> Step {
        let mut cmd = vec![pm.to_string(), "install".to_string(), "-y".to_string()];
        cmd.extend(packages.iter().map(|s| s.to_string()));
        Step {
            id: format!("{tool}-packages"),
            kind: StepType::Packages,
            label: "install packages".into(),
            command: Some(cmd),
            needs_sudo: true,
            timeout_sec: 300,
            depends_on: vec![],
            risk: Risk::Low,
            restart_required: None,
            restart_service: None,
            progress_regex: None,
            disk_estimate_mb: None,
            status: StepStatus::Done,
            attempts: 1,
            output_tail: String::new(),
            tool: tool.into(),
            package_manager: Some(pm.into()),
            post_env_prefix: None,
        }
    }

    #[test]
    fn packages_step_inverts_to_remove_command() {
        let step = packages_step("cargo-audit", "apt", &["libssl-dev", "pkg-config"]);
        let undo = inverse_step(&step).unwrap();
        let cmd = undo.command.unwrap();
        assert_eq!(cmd[0], "apt-get");
        assert_eq!(cmd[1], "remove");
        assert!(cmd.contains(&"libssl-dev".to_string()));
    }

    #[test]
    fn verify_step_has_no_inverse() {
        let step = Step {
            id: "verify".into(),
            kind: StepType::Verify,
            label: "verify".into(),
            command: Some(vec!["tool".into(), "--version".into()]),
            needs_sudo: false,
            timeout_sec: 30,
            depends_on: vec![],
            risk: Risk::Low,
            restart_required: None,
            restart_service: None,
            progress_regex: None,
            disk_estimate_mb: None,
            status: StepStatus::Done,
            attempts: 1,
            output_tail: String::new(),
            tool: "ruff".into(),
            package_manager: None,
            post_env_prefix: None,
        };
        assert!(inverse_step(&step).is_none());
    }

    #[test]
    fn rollback_sequence_is_reverse_completion_order() {
        let steps = vec![
            packages_step("a", "apt", &["x"]),
            packages_step("b", "apt", &["y"]),
        ];
        let rollback = synthesize_rollback(&steps);
        assert_eq!(rollback[0].tool, "b");
        assert_eq!(rollback[1].tool, "a");
    }
}
