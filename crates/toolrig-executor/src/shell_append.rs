//! Idempotent shell-profile editing for `shell_config` steps (§4.4).
//!
//! The resolver never knows which shell the invoking user runs, so it
//! emits a sentinel command (`toolrig-shell-append <path>... <k=v>...`)
//! and leaves line generation and the idempotency check to execution
//! time, when the profile's detected shell is available.

use std::fs::OpenOptions;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use toolrig_core::ShellInfo;

pub const SENTINEL: &str = "toolrig-shell-append";

#[derive(Debug, Clone, Default)]
pub struct ShellAppendOutcome {
    pub rc_file: PathBuf,
    pub lines_added: Vec<String>,
    pub already_present: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ShellAppendError {
    #[error("refusing to edit root's profile while running with sudo")]
    RootProfileUnderSudo,
    #[error("no writable rc file for this shell")]
    NoRcFile,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Parse the sentinel command's tail: tokens containing `=` are env vars,
/// everything else is a PATH entry to append.
fn parse_entries(command: &[String]) -> (Vec<String>, Vec<(String, String)>) {
    let mut paths = Vec::new();
    let mut env_vars = Vec::new();
    for token in command.iter().skip(1) {
        match token.split_once('=') {
            Some((key, value)) => env_vars.push((key.to_string(), value.to_string())),
            None => paths.push(token.clone()),
        }
    }
    (paths, env_vars)
}

fn rc_file_for(shell: &ShellInfo, home: &Path) -> Option<PathBuf> {
    if let Some(rc) = &shell.rc_file {
        let path = PathBuf::from(rc);
        return Some(if path.is_absolute() { path } else { home.join(path) });
    }
    match shell.kind.as_deref() {
        Some("fish") => Some(home.join(".config/fish/config.fish")),
        Some("zsh") => Some(home.join(".zshrc")),
        Some("bash") | None => Some(home.join(".bashrc")),
        Some(_) => Some(home.join(".profile")),
    }
}

fn line_for_path(shell_kind: Option<&str>, path: &str) -> String {
    match shell_kind {
        Some("fish") => format!("set -gx PATH $PATH {path}"),
        _ => format!("export PATH=\"$PATH:{path}\""),
    }
}

fn line_for_env(shell_kind: Option<&str>, key: &str, value: &str) -> String {
    match shell_kind {
        Some("fish") => format!("set -gx {key} {value}"),
        _ => format!("export {key}=\"{value}\""),
    }
}

/// Apply a `toolrig-shell-append` sentinel command, writing only the
/// lines not already present in the target rc file.
pub fn apply(
    command: &[String],
    shell: &ShellInfo,
    home: &Path,
    running_as_root_via_sudo: bool,
) -> Result<ShellAppendOutcome, ShellAppendError> {
    if running_as_root_via_sudo && home == Path::new("/root") {
        return Err(ShellAppendError::RootProfileUnderSudo);
    }
    let rc_file = rc_file_for(shell, home).ok_or(ShellAppendError::NoRcFile)?;
    let (paths, env_vars) = parse_entries(command);

    let mut desired = Vec::new();
    for path in &paths {
        desired.push(line_for_path(shell.kind.as_deref(), path));
    }
    for (key, value) in &env_vars {
        desired.push(line_for_env(shell.kind.as_deref(), key, value));
    }

    let existing = {
        let mut buf = String::new();
        if let Ok(mut file) = std::fs::File::open(&rc_file) {
            let _ = file.read_to_string(&mut buf);
        }
        buf
    };

    let to_add: Vec<String> = desired.into_iter().filter(|line| !existing.lines().any(|l| l == line)).collect();

    if to_add.is_empty() {
        return Ok(ShellAppendOutcome { rc_file, lines_added: vec![], already_present: true });
    }

    if let Some(parent) = rc_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(&rc_file)?;
    for line in &to_add {
        writeln!(file, "{line}")?;
    }

    Ok(ShellAppendOutcome { rc_file, lines_added: to_add, already_present: false })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_paths_and_env_vars() {
        let command = vec![
            SENTINEL.to_string(),
            "/opt/tool/bin".to_string(),
            "TOOL_HOME=/opt/tool".to_string(),
        ];
        let (paths, env_vars) = parse_entries(&command);
        assert_eq!(paths, vec!["/opt/tool/bin".to_string()]);
        assert_eq!(env_vars, vec![("TOOL_HOME".to_string(), "/opt/tool".to_string())]);
    }

    #[test]
    fn second_apply_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path();
        let shell = ShellInfo { kind: Some("bash".to_string()), ..Default::default() };
        let command = vec![SENTINEL.to_string(), "/opt/tool/bin".to_string()];

        let first = apply(&command, &shell, home, false).unwrap();
        assert!(!first.already_present);
        assert_eq!(first.lines_added.len(), 1);

        let second = apply(&command, &shell, home, false).unwrap();
        assert!(second.already_present);
    }

    #[test]
    fn refuses_root_profile_under_sudo() {
        let shell = ShellInfo { kind: Some("bash".to_string()), ..Default::default() };
        let command = vec![SENTINEL.to_string(), "/opt/tool/bin".to_string()];
        let result = apply(&command, &shell, Path::new("/root"), true);
        assert!(matches!(result, Err(ShellAppendError::RootProfileUnderSudo)));
    }

    #[test]
    fn fish_shell_uses_set_gx() {
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path();
        let shell = ShellInfo { kind: Some("fish".to_string()), ..Default::default() };
        let command = vec![SENTINEL.to_string(), "/opt/tool/bin".to_string()];
        let outcome = apply(&command, &shell, home, false).unwrap();
        assert!(outcome.lines_added[0].starts_with("set -gx PATH"));
    }
}
