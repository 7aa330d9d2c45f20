//! Recipe catalog loading.
//!
//! The catalog is external input: a directory of `*.toml` files, one
//! recipe per file. Loading validates against the schema immediately --
//! a violation is fatal and identifies the offending recipe and field,
//! per spec §6.

use crate::validate::validate_catalog;
use std::collections::HashMap;
use std::path::Path;
use toolrig_core::{Recipe, Result, ToolRigError};

/// An immutable, process-wide catalog of recipes, keyed by recipe id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    recipes: HashMap<String, Recipe>,
}

impl Catalog {
    pub fn get(&self, id: &str) -> Option<&Recipe> {
        self.recipes.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.recipes.contains_key(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.recipes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.recipes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.recipes.is_empty()
    }

    /// Build and validate a catalog from an in-memory recipe set. Used by
    /// tests and by `load_dir` once files are parsed.
    pub fn from_recipes(recipes: HashMap<String, Recipe>) -> Result<Self> {
        validate_catalog(&recipes)?;
        Ok(Self { recipes })
    }
}

/// Load every `*.toml` file in `dir` as a recipe and validate the result.
pub fn load_dir(dir: &Path) -> Result<Catalog> {
    let mut recipes = HashMap::new();

    let entries = std::fs::read_dir(dir)?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("toml") {
            continue;
        }
        let text = std::fs::read_to_string(&path)?;
        let recipe: Recipe = toml::from_str(&text).map_err(|e| ToolRigError::SchemaViolation {
            recipe: path.display().to_string(),
            detail: e.to_string(),
        })?;
        if recipe.id != path.file_stem().and_then(|s| s.to_str()).unwrap_or("") {
            tracing::debug!(
                recipe_id = %recipe.id,
                file = %path.display(),
                "recipe id does not match filename; keyed by declared id"
            );
        }
        recipes.insert(recipe.id.clone(), recipe);
    }

    Catalog::from_recipes(recipes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use toolrig_core::{InstallEntry, MethodKey, Recipe};

    fn minimal_recipe(id: &str) -> Recipe {
        let mut install = HashMap::new();
        install.insert(
            MethodKey::Default,
            InstallEntry::Command(vec!["echo".into(), "install".into()]),
        );
        Recipe {
            id: id.into(),
            label: id.into(),
            cli: id.into(),
            category: None,
            default_version: None,
            install,
            needs_sudo: HashMap::new(),
            requires: Default::default(),
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
    fn builds_catalog_from_valid_recipes() {
        let mut recipes = HashMap::new();
        recipes.insert("ruff".to_string(), minimal_recipe("ruff"));
        let catalog = Catalog::from_recipes(recipes).unwrap();
        assert!(catalog.contains("ruff"));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn load_dir_reads_toml_files() {
        let dir = tempfile::tempdir().unwrap();
        let recipe = minimal_recipe("ruff");
        let text = toml::to_string(&recipe).unwrap();
        std::fs::write(dir.path().join("ruff.toml"), text).unwrap();
        let catalog = load_dir(dir.path()).unwrap();
        assert!(catalog.contains("ruff"));
    }
}
