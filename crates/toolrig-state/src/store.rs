//! Plan state document store (§4.6): one JSON document per plan under a
//! `0700` state directory, written atomically (temp file + rename), with
//! corrupt documents quarantined rather than dropped.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use toolrig_core::{PlanState, PlanStatus};

const ARCHIVE_AFTER_DAYS: i64 = 30;
const PAUSE_WARNING_AFTER_DAYS: i64 = 7;

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("failed to create state directory {path}: {source}")]
    CreateDir { path: PathBuf, source: io::Error },
    #[error("failed to set permissions on {path}: {source}")]
    Permissions { path: PathBuf, source: io::Error },
    #[error("failed to write plan document {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
    #[error("failed to read plan document {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("plan '{plan_id}' document is corrupt; quarantined at {quarantine_path}")]
    Corrupt { plan_id: String, quarantine_path: PathBuf },
    #[error("plan '{0}' not found")]
    NotFound(String),
}

#[derive(Debug, Clone)]
pub struct PlanSummary {
    pub plan_id: String,
    pub tool: String,
    pub status: PlanStatus,
    pub paused_at: Option<DateTime<Utc>>,
}

fn ensure_state_dir(state_dir: &Path) -> Result<(), StateError> {
    fs::create_dir_all(state_dir).map_err(|source| StateError::CreateDir { path: state_dir.to_path_buf(), source })?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(state_dir, fs::Permissions::from_mode(0o700))
            .map_err(|source| StateError::Permissions { path: state_dir.to_path_buf(), source })?;
    }
    Ok(())
}

fn document_path(state_dir: &Path, plan_id: &str) -> PathBuf {
    state_dir.join(format!("{plan_id}.json"))
}

/// Persist `state` under `state_dir`, replacing any prior document for
/// the same plan. Writes to a sibling temp file first and renames it
/// into place, so a crash mid-write never leaves a half-written document.
pub fn save_plan_state(state_dir: &Path, state: &PlanState) -> Result<(), StateError> {
    ensure_state_dir(state_dir)?;
    let path = document_path(state_dir, &state.plan.plan_id);
    let json = serde_json::to_string_pretty(state).expect("PlanState always serializes");

    let mut tmp = tempfile::NamedTempFile::new_in(state_dir)
        .map_err(|source| StateError::Write { path: path.clone(), source })?;
    use std::io::Write;
    tmp.write_all(json.as_bytes()).map_err(|source| StateError::Write { path: path.clone(), source })?;
    tmp.flush().map_err(|source| StateError::Write { path: path.clone(), source })?;
    tmp.persist(&path).map_err(|err| StateError::Write { path: path.clone(), source: err.error })?;
    Ok(())
}

/// Load a plan document, quarantining it (renaming to `.corrupt`, not
/// deleting) if it fails to parse.
pub fn load_plan_state(state_dir: &Path, plan_id: &str) -> Result<PlanState, StateError> {
    let path = document_path(state_dir, plan_id);
    let contents = fs::read_to_string(&path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
            StateError::NotFound(plan_id.to_string())
        } else {
            StateError::Read { path: path.clone(), source }
        }
    })?;

    match serde_json::from_str::<PlanState>(&contents) {
        Ok(state) => Ok(state),
        Err(err) => {
            let quarantine_path = path.with_extension("json.corrupt");
            if let Err(rename_err) = fs::rename(&path, &quarantine_path) {
                tracing::warn!(plan_id, error = %rename_err, "failed to quarantine corrupt plan document");
            } else {
                tracing::warn!(plan_id, parse_error = %err, quarantine_path = %quarantine_path.display(), "quarantined corrupt plan document");
            }
            Err(StateError::Corrupt { plan_id: plan_id.to_string(), quarantine_path })
        }
    }
}

/// Enumerate non-terminal plan documents, newest first.
pub fn list_pending_plans(state_dir: &Path) -> Result<Vec<PlanSummary>, StateError> {
    let mut summaries = list_all_in(state_dir)?
        .into_iter()
        .filter(|s| !matches!(s.1.plan.status, PlanStatus::Done | PlanStatus::Failed | PlanStatus::Cancelled))
        .map(|(_, state)| PlanSummary {
            plan_id: state.plan.plan_id.clone(),
            tool: state.plan.tool.clone(),
            status: state.plan.status,
            paused_at: state.paused_at,
        })
        .collect::<Vec<_>>();
    summaries.sort_by(|a, b| b.paused_at.cmp(&a.paused_at));
    Ok(summaries)
}

fn list_all_in(state_dir: &Path) -> Result<Vec<(PathBuf, PlanState)>, StateError> {
    if !state_dir.exists() {
        return Ok(Vec::new());
    }
    let mut out = Vec::new();
    let entries = fs::read_dir(state_dir).map_err(|source| StateError::Read { path: state_dir.to_path_buf(), source })?;
    for entry in entries {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        if !name.ends_with(".json") {
            continue;
        }
        let plan_id = name.trim_end_matches(".json");
        if let Ok(state) = load_plan_state(state_dir, plan_id) {
            out.push((path, state));
        }
    }
    Ok(out)
}

/// Move terminal plans older than 30 days into `{state_dir}/archive`.
/// Returns the number archived.
pub fn archive_stale_plans(state_dir: &Path, now: DateTime<Utc>) -> Result<usize, StateError> {
    let archive_dir = state_dir.join("archive");
    fs::create_dir_all(&archive_dir).map_err(|source| StateError::CreateDir { path: archive_dir.clone(), source })?;

    let mut archived = 0;
    for (path, state) in list_all_in(state_dir)? {
        let terminal = matches!(state.plan.status, PlanStatus::Done | PlanStatus::Failed | PlanStatus::Cancelled);
        if !terminal {
            continue;
        }
        let age_days = (now - state.plan.created_at).num_days();
        if age_days < ARCHIVE_AFTER_DAYS {
            continue;
        }
        let dest = archive_dir.join(path.file_name().expect("document path always has a file name"));
        if let Err(err) = fs::rename(&path, &dest) {
            tracing::warn!(plan_id = %state.plan.plan_id, error = %err, "failed to archive terminal plan");
            continue;
        }
        archived += 1;
    }
    Ok(archived)
}

/// A human-readable warning once a paused plan has sat for a week,
/// surfaced by `list-plans` and friends; `None` while still within grace.
pub fn pause_warning(state: &PlanState, now: DateTime<Utc>) -> Option<String> {
    let paused_at = state.paused_at?;
    let days = (now - paused_at).num_days();
    if days < PAUSE_WARNING_AFTER_DAYS {
        return None;
    }
    Some(format!(
        "plan '{}' has been paused for {days} day(s); resume it or cancel to free the lock",
        state.plan.plan_id
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolrig_core::{Plan, PlanStatus, Risk, RiskSummary};
    use std::collections::HashMap;

    fn plan_state(plan_id: &str, status: PlanStatus, created_at: DateTime<Utc>) -> PlanState {
        PlanState::new(Plan {
            plan_id: plan_id.to_string(),
            tool: "demo".to_string(),
            created_at,
            answers: HashMap::new(),
            inputs: HashMap::new(),
            steps: vec![],
            rollback: vec![],
            risk_summary: RiskSummary { max_risk: Risk::Low, per_step_risk: HashMap::new() },
            confirmation_gate: None,
            version_constraint_result: None,
            status,
        })
    }

    #[test]
    fn round_trips_a_plan_document() {
        let dir = tempfile::tempdir().unwrap();
        let state = plan_state("01ABC", PlanStatus::Running, Utc::now());
        save_plan_state(dir.path(), &state).unwrap();
        let loaded = load_plan_state(dir.path(), "01ABC").unwrap();
        assert_eq!(loaded.plan.plan_id, "01ABC");
    }

    #[test]
    fn corrupt_document_is_quarantined_not_deleted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let result = load_plan_state(dir.path(), "broken");
        assert!(matches!(result, Err(StateError::Corrupt { .. })));
        assert!(dir.path().join("broken.json.corrupt").exists());
        assert!(!dir.path().join("broken.json").exists());
    }

    #[test]
    fn list_pending_excludes_terminal_plans() {
        let dir = tempfile::tempdir().unwrap();
        save_plan_state(dir.path(), &plan_state("running", PlanStatus::Running, Utc::now())).unwrap();
        save_plan_state(dir.path(), &plan_state("done", PlanStatus::Done, Utc::now())).unwrap();
        let pending = list_pending_plans(dir.path()).unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].plan_id, "running");
    }

    #[test]
    fn archive_moves_old_terminal_plans() {
        let dir = tempfile::tempdir().unwrap();
        let old = Utc::now() - chrono::Duration::days(40);
        save_plan_state(dir.path(), &plan_state("stale", PlanStatus::Done, old)).unwrap();
        let archived = archive_stale_plans(dir.path(), Utc::now()).unwrap();
        assert_eq!(archived, 1);
        assert!(dir.path().join("archive").join("stale.json").exists());
        assert!(!dir.path().join("stale.json").exists());
    }

    #[test]
    fn archive_leaves_recent_terminal_plans() {
        let dir = tempfile::tempdir().unwrap();
        save_plan_state(dir.path(), &plan_state("fresh", PlanStatus::Failed, Utc::now())).unwrap();
        let archived = archive_stale_plans(dir.path(), Utc::now()).unwrap();
        assert_eq!(archived, 0);
    }

    #[test]
    fn pause_warning_fires_after_a_week() {
        let mut state = plan_state("p1", PlanStatus::Paused, Utc::now());
        state.paused_at = Some(Utc::now() - chrono::Duration::days(8));
        assert!(pause_warning(&state, Utc::now()).is_some());
    }

    #[test]
    fn pause_warning_silent_within_grace() {
        let mut state = plan_state("p1", PlanStatus::Paused, Utc::now());
        state.paused_at = Some(Utc::now() - chrono::Duration::days(1));
        assert!(pause_warning(&state, Utc::now()).is_none());
    }
}
