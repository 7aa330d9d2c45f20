//! Version constraint parsing and evaluation (§4.2 step 7, scenario E).
//!
//! Recipes declare constraints like `>=18` or `±1 minor of cluster`; this
//! module is the pure evaluator, fed the installed version and (when the
//! constraint references a peer) the peer's version from an answer.

use toolrig_core::VersionConstraintResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Version {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl Version {
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('v');
        let mut parts = s.split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
        Some(Self { major, minor, patch })
    }
}

impl std::fmt::Display for Version {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    AtLeast(Version),
    WithinMinorOfPeer { n: u32, peer: String },
}

/// Parse a recipe's `version_constraint` string. Recognizes `>=X[.Y[.Z]]`
/// and `±N minor of <peer>`. Unrecognized strings are treated as
/// unconstrained (no parse, no error -- the resolver skips the check).
pub fn parse_constraint(s: &str) -> Option<Constraint> {
    let s = s.trim();
    if let Some(rest) = s.strip_prefix(">=") {
        return Version::parse(rest).map(Constraint::AtLeast);
    }
    if let Some(rest) = s.strip_prefix('±').or_else(|| s.strip_prefix("+/-")) {
        let rest = rest.trim();
        let mut words = rest.split_whitespace();
        let n: u32 = words.next()?.parse().ok()?;
        if words.next()? != "minor" {
            return None;
        }
        if words.next()? != "of" {
            return None;
        }
        let peer = words.next()?.to_string();
        return Some(Constraint::WithinMinorOfPeer { n, peer });
    }
    None
}

/// Evaluate a constraint against the currently installed version of the
/// named tool and (if needed) a peer version supplied as an answer.
pub fn evaluate(
    constraint: &Constraint,
    installed: &str,
    peer_version: Option<&str>,
) -> VersionConstraintResult {
    match constraint {
        Constraint::AtLeast(min) => {
            let Some(have) = Version::parse(installed) else {
                return VersionConstraintResult {
                    ok: false,
                    reason: format!("could not parse installed version '{installed}'"),
                    options: vec![],
                };
            };
            let ok = (have.major, have.minor, have.patch) >= (min.major, min.minor, min.patch);
            VersionConstraintResult {
                ok,
                reason: if ok {
                    format!("{have} satisfies >={min}")
                } else {
                    format!("{have} is below the required >={min}")
                },
                options: if ok {
                    vec![]
                } else {
                    vec![format!("upgrade-to-{min}")]
                },
            }
        }
        Constraint::WithinMinorOfPeer { n, peer } => {
            let (Some(have), Some(peer_v)) = (
                Version::parse(installed),
                peer_version.and_then(Version::parse),
            ) else {
                return VersionConstraintResult {
                    ok: false,
                    reason: format!("could not determine {peer}'s version to compare against"),
                    options: vec![],
                };
            };
            let diff = have.minor.abs_diff(peer_v.minor);
            let ok = have.major == peer_v.major && diff <= *n;
            VersionConstraintResult {
                ok,
                reason: if ok {
                    format!("{have} is within ±{n} minor of {peer} {peer_v}")
                } else {
                    format!("{installed} more than ±{n} minor from {peer_v}")
                },
                options: if ok {
                    vec![]
                } else {
                    vec![
                        format!("upgrade-to-{}.{}.x", peer_v.major, peer_v.minor + 1),
                        "stay-and-acknowledge".to_string(),
                    ]
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_at_least_constraint() {
        assert_eq!(
            parse_constraint(">=18"),
            Some(Constraint::AtLeast(Version {
                major: 18,
                minor: 0,
                patch: 0
            }))
        );
    }

    #[test]
    fn parses_within_minor_of_peer() {
        assert_eq!(
            parse_constraint("±1 minor of cluster"),
            Some(Constraint::WithinMinorOfPeer {
                n: 1,
                peer: "cluster".to_string()
            })
        );
    }

    #[test]
    fn scenario_e_kubectl_fails_constraint() {
        let constraint = parse_constraint("±1 minor of cluster").unwrap();
        let result = evaluate(&constraint, "1.26.0", Some("1.30.0"));
        assert!(!result.ok);
        assert!(result.reason.contains("more than"));
        assert!(result.options.contains(&"stay-and-acknowledge".to_string()));
    }

    #[test]
    fn at_least_constraint_passes_when_satisfied() {
        let constraint = parse_constraint(">=18").unwrap();
        let result = evaluate(&constraint, "20.1.0", None);
        assert!(result.ok);
    }
}
