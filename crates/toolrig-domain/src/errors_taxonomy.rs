//! Stderr classification into the error taxonomy (§7), with attached
//! one-click remediations.

use regex::Regex;
use std::sync::LazyLock;
use toolrig_core::{ErrorAnalysis, ErrorKind};

struct Rule {
    pattern: &'static str,
    kind: ErrorKind,
    why: &'static str,
    suggest: fn(&regex::Captures) -> Vec<String>,
}

fn no_suggestions(_: &regex::Captures) -> Vec<String> {
    Vec::new()
}

fn missing_lib_suggestion(caps: &regex::Captures) -> Vec<String> {
    let lib = caps.name("lib").map(|m| m.as_str()).unwrap_or("unknown");
    vec![format!("install the '{lib}' development package")]
}

fn missing_header_suggestion(caps: &regex::Captures) -> Vec<String> {
    let header = caps.name("header").map(|m| m.as_str()).unwrap_or("unknown");
    vec![format!("install the development package providing '{header}'")]
}

static RULES: LazyLock<Vec<(Regex, Rule)>> = LazyLock::new(|| {
    let specs: &[(&str, ErrorKind, &str, fn(&regex::Captures) -> Vec<String>)] = &[
        (
            r"(?i)sudo: \d+ incorrect password attempts|sorry, try again",
            ErrorKind::AuthWrongSudo,
            "the sudo password was rejected",
            no_suggestions,
        ),
        (
            r"(?i)sudo: a password is required",
            ErrorKind::AuthNoSudo,
            "no sudo password was supplied for a command that requires one",
            no_suggestions,
        ),
        (
            r"(?i)is not in the sudoers file",
            ErrorKind::AuthNotInSudoers,
            "the invoking user is not permitted to use sudo",
            no_suggestions,
        ),
        (
            r"(?i)could not resolve host|network is unreachable|temporary failure in name resolution",
            ErrorKind::NetworkOffline,
            "the host has no working network path to the internet",
            no_suggestions,
        ),
        (
            r"(?i)connection timed out|couldn't connect to host",
            ErrorKind::NetworkEndpointUnreachable,
            "a required endpoint did not respond within its timeout",
            no_suggestions,
        ),
        (
            r"(?i)ssl certificate problem|certificate verify failed",
            ErrorKind::NetworkSslCert,
            "TLS certificate verification failed, often caused by an intercepting proxy",
            no_suggestions,
        ),
        (
            r"(?i)no space left on device",
            ErrorKind::ResourceDiskFull,
            "the filesystem backing the install path is full",
            no_suggestions,
        ),
        (
            r"(?i)could not get lock .*apt|unable to acquire the dpkg frontend lock|another instance of .*is running",
            ErrorKind::ResourcePmLockHeld,
            "another package-manager transaction is already holding the index lock",
            no_suggestions,
        ),
        (
            r"(?i)permission denied",
            ErrorKind::PermissionDenied,
            "the process lacked permission to write to the target path",
            no_suggestions,
        ),
        (
            r"(?i)error: externally-managed-environment",
            ErrorKind::PermissionPep668Blocked,
            "the system Python refuses global pip installs (PEP 668)",
            no_suggestions,
        ),
        (
            r"(?i)eacces.*npm|npm err.*eacces",
            ErrorKind::PermissionEaccesNpmGlobal,
            "npm's global prefix is not writable by the invoking user",
            no_suggestions,
        ),
        (
            r"(?i)fatal error: (?P<header>[a-zA-Z0-9_./-]+\.h): no such file",
            ErrorKind::BuildMissingHeader,
            "a C header required by the build is not installed",
            missing_header_suggestion,
        ),
        (
            r"(?i)cannot find -l(?P<lib>[a-zA-Z0-9_+-]+)",
            ErrorKind::BuildMissingLib,
            "the linker could not find a required shared library",
            missing_lib_suggestion,
        ),
        (
            r"(?i)undefined reference to",
            ErrorKind::BuildLinkerError,
            "the linker could not resolve a symbol",
            no_suggestions,
        ),
        (
            r"(?i)error\[e\d+\]|error: expected|syntax error",
            ErrorKind::BuildCompileError,
            "the source failed to compile",
            no_suggestions,
        ),
        (
            r"(?i)checksum mismatch|sha256 mismatch",
            ErrorKind::InstallChecksumMismatch,
            "the downloaded artifact's checksum did not match the declared value",
            no_suggestions,
        ),
        (
            r"(?i)404 not found|no matching distribution found",
            ErrorKind::InstallNotFoundInRegistry,
            "the requested version does not exist in the upstream registry",
            no_suggestions,
        ),
    ];
    specs
        .iter()
        .map(|(pattern, kind, why, suggest)| {
            (
                Regex::new(pattern).expect("valid regex"),
                Rule {
                    pattern,
                    kind: *kind,
                    why,
                    suggest: *suggest,
                },
            )
        })
        .collect()
});

/// Classify a step's stderr tail into the error taxonomy. Falls back to
/// `ErrorKind::Unknown` when no rule matches, exit-code heuristics aside.
pub fn classify(stderr_tail: &str, exit_code: i32, timed_out: bool) -> ErrorAnalysis {
    if timed_out {
        return ErrorAnalysis {
            kind: ErrorKind::ResourceTimeout,
            what_happened: "the step exceeded its timeout and was terminated".into(),
            why: None,
            suggestions: vec!["retry with an extended timeout".into()],
        };
    }
    if exit_code == 137 {
        return ErrorAnalysis {
            kind: ErrorKind::ResourceOom,
            what_happened: "the process was killed, most likely by the OOM killer".into(),
            why: Some("exit code 137 corresponds to SIGKILL (128 + 9)".into()),
            suggestions: vec!["free memory or reduce build parallelism".into()],
        };
    }

    for (re, rule) in RULES.iter() {
        if let Some(caps) = re.captures(stderr_tail) {
            let _ = rule.pattern;
            return ErrorAnalysis {
                kind: rule.kind,
                what_happened: format!("command exited {exit_code}"),
                why: Some(rule.why.to_string()),
                suggestions: (rule.suggest)(&caps),
            };
        }
    }

    ErrorAnalysis {
        kind: ErrorKind::Unknown,
        what_happened: format!("command exited {exit_code}"),
        why: None,
        suggestions: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_missing_lib() {
        let analysis = classify("ld: cannot find -lssl", 1, false);
        assert_eq!(analysis.kind, ErrorKind::BuildMissingLib);
        assert!(analysis.suggestions[0].contains("ssl"));
    }

    #[test]
    fn classifies_oom_by_exit_code() {
        let analysis = classify("", 137, false);
        assert_eq!(analysis.kind, ErrorKind::ResourceOom);
    }

    #[test]
    fn classifies_timeout_before_stderr_inspection() {
        let analysis = classify("some half-written output", 1, true);
        assert_eq!(analysis.kind, ErrorKind::ResourceTimeout);
    }

    #[test]
    fn classifies_pep668() {
        let analysis = classify("error: externally-managed-environment", 1, false);
        assert_eq!(analysis.kind, ErrorKind::PermissionPep668Blocked);
    }

    #[test]
    fn unknown_when_nothing_matches() {
        let analysis = classify("something went wrong in a way we've never seen", 1, false);
        assert_eq!(analysis.kind, ErrorKind::Unknown);
    }
}
