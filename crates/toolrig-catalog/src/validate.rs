//! Catalog schema validation (§3.2 invariants, §8 cycle rejection).
//!
//! Validation happens once at load time; the runtime never encounters an
//! unknown field or a recipe that violates these invariants.

use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;
use toolrig_core::{InstallEntry, Recipe, ToolRigError};

static ARCH_LITERAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(x86_64|amd64|aarch64|arm64)\b").expect("valid regex"));

fn violation(recipe: &str, detail: impl Into<String>) -> ToolRigError {
    ToolRigError::SchemaViolation {
        recipe: recipe.to_string(),
        detail: detail.into(),
    }
}

/// Validate every recipe in the catalog and the static dependency graph
/// formed by their `requires.binaries` edges.
pub fn validate_catalog(recipes: &HashMap<String, Recipe>) -> toolrig_core::Result<()> {
    for recipe in recipes.values() {
        validate_recipe(recipe)?;
    }
    detect_static_cycle(recipes)?;
    Ok(())
}

fn validate_recipe(recipe: &Recipe) -> toolrig_core::Result<()> {
    // Exactly one of git_repo/tarball_url per source spec.
    if let Some(spec) = recipe.source_spec()
        && !spec.source_location_valid()
    {
        return Err(violation(
            &recipe.id,
            "source spec must declare exactly one of git_repo or tarball_url",
        ));
    }

    // Every method in `prefer` must appear in `install`.
    for method in &recipe.prefer {
        if !recipe.install.contains_key(method) {
            return Err(violation(
                &recipe.id,
                format!("prefer references method '{method}' absent from install"),
            ));
        }
    }

    // Every choice.id referenced by a condition must exist.
    let choice_ids: HashSet<&str> = recipe.choices.iter().map(|c| c.id.as_str()).collect();
    for choice in &recipe.choices {
        if let Some(toolrig_core::ChoiceCondition::OnChoice { choice: referenced, .. }) =
            &choice.condition
            && !choice_ids.contains(referenced.as_str())
        {
            return Err(violation(
                &recipe.id,
                format!(
                    "choice '{}' condition references unknown choice '{referenced}'",
                    choice.id
                ),
            ));
        }
        for dep in &choice.depends_on {
            if !choice_ids.contains(dep.as_str()) {
                return Err(violation(
                    &recipe.id,
                    format!("choice '{}' depends_on unknown choice '{dep}'", choice.id),
                ));
            }
        }
    }

    // Commands containing a literal arch substring without {arch} templating
    // are flagged -- they will silently misbehave on other architectures.
    for (method, entry) in &recipe.install {
        if let InstallEntry::Command(cmd) = entry {
            for token in cmd {
                if ARCH_LITERAL.is_match(token) && !token.contains("{arch}") {
                    return Err(violation(
                        &recipe.id,
                        format!(
                            "install[{method}] contains a literal arch substring without {{arch}} templating: '{token}'"
                        ),
                    ));
                }
            }
        }
    }

    Ok(())
}

/// Walk the `requires.binaries` edges across the whole catalog (binary
/// names that are themselves recipe ids) and reject any cycle.
fn detect_static_cycle(recipes: &HashMap<String, Recipe>) -> toolrig_core::Result<()> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    let mut marks: HashMap<&str, Mark> = HashMap::new();
    let mut stack: Vec<&str> = Vec::new();

    fn visit<'a>(
        id: &'a str,
        recipes: &'a HashMap<String, Recipe>,
        marks: &mut HashMap<&'a str, Mark>,
        stack: &mut Vec<&'a str>,
    ) -> toolrig_core::Result<()> {
        match marks.get(id) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                stack.push(id);
                let cycle_start = stack.iter().position(|s| *s == id).unwrap_or(0);
                let cycle: Vec<&str> = stack[cycle_start..].to_vec();
                return Err(ToolRigError::DependencyCycle(cycle.join(" -> ")));
            }
            None => {}
        }
        let Some(recipe) = recipes.get(id) else {
            return Ok(());
        };
        marks.insert(id, Mark::Visiting);
        stack.push(id);
        for dep in &recipe.requires.binaries {
            if recipes.contains_key(dep.as_str()) {
                visit(dep, recipes, marks, stack)?;
            }
        }
        stack.pop();
        marks.insert(id, Mark::Done);
        Ok(())
    }

    for id in recipes.keys() {
        visit(id, recipes, &mut marks, &mut stack)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolrig_core::{InstallEntry, MethodKey, Recipe};

    fn recipe_requiring(id: &str, binaries: Vec<&str>) -> Recipe {
        let mut install = HashMap::new();
        install.insert(
            MethodKey::Default,
            InstallEntry::Command(vec!["echo".into()]),
        );
        Recipe {
            id: id.into(),
            label: id.into(),
            cli: id.into(),
            category: None,
            default_version: None,
            install,
            needs_sudo: HashMap::new(),
            requires: toolrig_core::Requires {
                binaries: binaries.into_iter().map(String::from).collect(),
                packages: HashMap::new(),
                network: None,
            },
            checksums: HashMap::new(),
            prefer: vec![],
            post_env: None,
            shell_config: None,
            post_install: vec![],
            verify: None,
            update: HashMap::new(),
            remove: HashMap::new(),
            repo_setup: HashMap::new(),
            choices: vec![],
            inputs: vec![],
            data_packs: vec![],
            disk_requirement_gb: None,
            version_constraint: None,
            arch_exclude: vec![],
            config_templates: vec![],
        }
    }

    #[test]
    fn rejects_dependency_cycle() {
        let mut recipes = HashMap::new();
        recipes.insert("a".to_string(), recipe_requiring("a", vec!["b"]));
        recipes.insert("b".to_string(), recipe_requiring("b", vec!["a"]));
        let err = validate_catalog(&recipes).unwrap_err();
        assert!(matches!(err, ToolRigError::DependencyCycle(_)));
    }

    #[test]
    fn accepts_acyclic_dependency_chain() {
        let mut recipes = HashMap::new();
        recipes.insert("cargo-audit".to_string(), recipe_requiring("cargo-audit", vec!["cargo"]));
        recipes.insert("cargo".to_string(), recipe_requiring("cargo", vec![]));
        assert!(validate_catalog(&recipes).is_ok());
    }

    #[test]
    fn rejects_literal_arch_without_templating() {
        let mut recipes = HashMap::new();
        let mut r = recipe_requiring("kubectl", vec![]);
        r.install.insert(
            MethodKey::Default,
            InstallEntry::Command(vec![
                "curl".into(),
                "-Lo".into(),
                "kubectl".into(),
                "https://dl.k8s.io/release/v1/bin/linux/amd64/kubectl".into(),
            ]),
        );
        recipes.insert("kubectl".to_string(), r);
        let err = validate_catalog(&recipes).unwrap_err();
        assert!(matches!(err, ToolRigError::SchemaViolation { .. }));
    }

    #[test]
    fn rejects_prefer_referencing_absent_method() {
        let mut recipes = HashMap::new();
        let mut r = recipe_requiring("docker", vec![]);
        r.prefer = vec![MethodKey::Snap];
        recipes.insert("docker".to_string(), r);
        let err = validate_catalog(&recipes).unwrap_err();
        assert!(matches!(err, ToolRigError::SchemaViolation { .. }));
    }
}
