//! Typed template substitution over recipe commands.
//!
//! A finite set of placeholders is recognized: `{arch}`, `{os}`, `{version}`,
//! and any declared `inputs.id`. After substitution, any remaining
//! `{identifier}` token is a hard error -- the resolver never emits a plan
//! with an unsubstituted placeholder (§8 invariant 6).

use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use toolrig_core::{Arch, ToolRigError};

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-zA-Z_][a-zA-Z0-9_]*)\}").expect("valid regex"));

/// Values available for substitution into a single command.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionContext {
    pub arch: Option<Arch>,
    pub os: Option<String>,
    pub version: Option<String>,
    pub inputs: HashMap<String, String>,
}

impl SubstitutionContext {
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            "arch" => self.arch.map(|a| a.as_str().to_string()),
            "os" => self.os.clone(),
            "version" => self.version.clone(),
            other => self.inputs.get(other).cloned(),
        }
    }
}

/// Substitute placeholders into every token of `command`. Returns an error
/// naming the first unsubstituted placeholder and the owning step id.
pub fn substitute_command(
    step_id: &str,
    command: &[String],
    ctx: &SubstitutionContext,
) -> toolrig_core::Result<Vec<String>> {
    command
        .iter()
        .map(|token| substitute_token(step_id, token, ctx))
        .collect()
}

fn substitute_token(
    step_id: &str,
    token: &str,
    ctx: &SubstitutionContext,
) -> toolrig_core::Result<String> {
    let mut out = String::with_capacity(token.len());
    let mut last_end = 0;
    for caps in PLACEHOLDER.captures_iter(token) {
        let whole = caps.get(0).expect("group 0 always matches");
        let name = &caps[1];
        out.push_str(&token[last_end..whole.start()]);
        match ctx.lookup(name) {
            Some(value) => out.push_str(&value),
            None => {
                return Err(ToolRigError::UnsubstitutedPlaceholder {
                    step: step_id.to_string(),
                    placeholder: name.to_string(),
                });
            }
        }
        last_end = whole.end();
    }
    out.push_str(&token[last_end..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> SubstitutionContext {
        let mut inputs = HashMap::new();
        inputs.insert("prefix".to_string(), "/usr/local".to_string());
        SubstitutionContext {
            arch: Some(Arch::Amd64),
            os: Some("linux".to_string()),
            version: Some("1.2.3".to_string()),
            inputs,
        }
    }

    #[test]
    fn substitutes_known_placeholders() {
        let cmd = vec![
            "curl".to_string(),
            "-Lo".to_string(),
            "tool-{arch}-{os}-{version}".to_string(),
        ];
        let result = substitute_command("s1", &cmd, &ctx()).unwrap();
        assert_eq!(result[2], "tool-amd64-linux-1.2.3");
    }

    #[test]
    fn substitutes_declared_input() {
        let cmd = vec!["--prefix={prefix}".to_string()];
        let result = substitute_command("s1", &cmd, &ctx()).unwrap();
        assert_eq!(result[0], "--prefix=/usr/local");
    }

    #[test]
    fn rejects_unknown_placeholder() {
        let cmd = vec!["tool-{unknown_thing}".to_string()];
        let err = substitute_command("s1", &cmd, &ctx()).unwrap_err();
        match err {
            ToolRigError::UnsubstitutedPlaceholder { step, placeholder } => {
                assert_eq!(step, "s1");
                assert_eq!(placeholder, "unknown_thing");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn leaves_tokens_without_braces_untouched() {
        let cmd = vec!["install".to_string(), "-y".to_string()];
        let result = substitute_command("s1", &cmd, &ctx()).unwrap();
        assert_eq!(result, cmd);
    }
}
