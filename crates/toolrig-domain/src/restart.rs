//! Restart-requirement detection (§4.5 restart handling).

use toolrig_core::{RestartRequirement, Step};

/// A human-readable instruction for the user, keyed by restart kind.
pub fn pause_instructions(requirement: RestartRequirement, service: Option<&str>) -> String {
    match requirement {
        RestartRequirement::Session => {
            "log out and back in (or run `newgrp`) for the group membership change to take effect"
                .to_string()
        }
        RestartRequirement::Service => match service {
            Some(svc) => format!("service '{svc}' was restarted automatically"),
            None => "the affected service was restarted automatically".to_string(),
        },
        RestartRequirement::System => "reboot this machine, then resume the plan".to_string(),
    }
}

/// Whether a just-completed step's restart requirement should pause the
/// plan (`session`/`system`) or be handled transparently (`service`).
pub fn requires_pause(requirement: RestartRequirement) -> bool {
    matches!(
        requirement,
        RestartRequirement::Session | RestartRequirement::System
    )
}

/// The strongest restart requirement among a set of completed steps, if
/// any. `system` outranks `session` outranks `service`.
pub fn strongest_requirement(steps: &[Step]) -> Option<RestartRequirement> {
    steps
        .iter()
        .filter_map(|s| s.restart_required)
        .max_by_key(|r| match r {
            RestartRequirement::Service => 0,
            RestartRequirement::Session => 1,
            RestartRequirement::System => 2,
        })
}
