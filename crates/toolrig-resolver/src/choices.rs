//! Pass 1: choice resolution (§4.2 pass 1).
//!
//! Pure function of `(recipe, profile)`. Every option is always emitted,
//! annotated with availability -- nothing is silently dropped (§8
//! invariant 7).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use toolrig_core::{Capabilities, ChoiceCondition, GpuInfo, InputDef, OptionRequires, Recipe, ResolvedOption, SystemProfile};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolvedChoice {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: toolrig_core::ChoiceType,
    pub label: String,
    pub options: Vec<ResolvedOption>,
    pub min_select: Option<u32>,
    pub max_select: Option<u32>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChoiceResolution {
    pub tool: String,
    #[serde(default)]
    pub auto_resolve: bool,
    #[serde(default)]
    pub choices: Vec<ResolvedChoice>,
    #[serde(default)]
    pub inputs: Vec<InputDef>,
    #[serde(default)]
    pub defaults: HashMap<String, String>,
}

/// `resolve_choices(tool, profile)`: load the recipe, evaluate every
/// choice's options against the profile, and pre-compute a default
/// answer set so the UI can present a fully defaulted form.
pub fn resolve_choices(recipe: &Recipe, profile: &SystemProfile) -> ChoiceResolution {
    if recipe.choices.is_empty() && recipe.inputs.is_empty() {
        return ChoiceResolution {
            tool: recipe.id.clone(),
            auto_resolve: true,
            choices: vec![],
            inputs: vec![],
            defaults: HashMap::new(),
        };
    }

    let mut defaults: HashMap<String, String> = HashMap::new();
    let mut resolved = Vec::new();

    for choice in &recipe.choices {
        if let Some(condition) = &choice.condition
            && !condition_holds(condition, &defaults)
        {
            continue;
        }

        let mut options = Vec::with_capacity(choice.options.len());
        let mut chosen_ids = Vec::new();
        for option in &choice.options {
            let (available, reason) = evaluate_requires(&option.requires, profile);
            if available && option.default {
                chosen_ids.push(option.id.clone());
            }
            options.push(ResolvedOption {
                option: option.clone(),
                available,
                computed_disabled_reason: if available {
                    None
                } else {
                    Some(option.disabled_reason.clone().unwrap_or(reason))
                },
            });
        }
        if chosen_ids.is_empty()
            && let Some(first_available) = options.iter().find(|o| o.available)
        {
            chosen_ids.push(first_available.option.id.clone());
        }
        defaults.insert(choice.id.clone(), chosen_ids.join(","));

        resolved.push(ResolvedChoice {
            id: choice.id.clone(),
            kind: choice.kind,
            label: choice.label.clone(),
            options,
            min_select: choice.min_select,
            max_select: choice.max_select,
        });
    }

    for input in &recipe.inputs {
        if let Some(default) = &input.default {
            defaults.insert(input.id.clone(), default.clone());
        }
    }

    ChoiceResolution {
        tool: recipe.id.clone(),
        auto_resolve: false,
        choices: resolved,
        inputs: recipe.inputs.clone(),
        defaults,
    }
}

/// `choice==value` conditions are checked against defaults computed so
/// far (earlier choices in declaration order); `input==value` conditions
/// have no value yet at pass 1 and are treated as satisfied so the input
/// still surfaces in the form.
fn condition_holds(condition: &ChoiceCondition, defaults_so_far: &HashMap<String, String>) -> bool {
    match condition {
        ChoiceCondition::OnChoice { choice, value } => defaults_so_far
            .get(choice)
            .is_some_and(|answer| answer.split(',').any(|v| v == value)),
        ChoiceCondition::OnInput { .. } => true,
    }
}

/// Evaluate one option's `requires` against the profile. Returns
/// `(available, reason)`; `reason` is only meaningful when `!available`.
fn evaluate_requires(requires: &OptionRequires, profile: &SystemProfile) -> (bool, String) {
    if let Some(hardware) = &requires.hardware
        && let Err(reason) = evaluate_hardware(hardware, &profile.gpu)
    {
        return (false, reason);
    }
    for binary in &requires.binaries {
        if !profile.binary_on_path(binary) {
            return (false, format!("'{binary}' is not on PATH"));
        }
    }
    if requires.network && profile.network.online != Some(true) {
        return (false, "requires network access".to_string());
    }
    if requires.auth && !has_auth(&profile.capabilities) {
        return (false, "requires sudo/root privileges".to_string());
    }
    (true, String::new())
}

fn has_auth(capabilities: &Capabilities) -> bool {
    capabilities.is_root || capabilities.has_sudo
}

/// Hardware predicates: `gpu.nvidia`, `gpu.nvidia>=7.0` (compute
/// capability), `gpu.amd`.
fn evaluate_hardware(spec: &str, gpu: &GpuInfo) -> Result<(), String> {
    if let Some(threshold) = spec.strip_prefix("gpu.nvidia>=") {
        let min: f32 = threshold
            .parse()
            .map_err(|_| format!("malformed hardware requirement '{spec}'"))?;
        return match gpu.nvidia.compute_capability {
            Some(cap) if gpu.nvidia.present && cap >= min => Ok(()),
            _ => Err("no NVIDIA GPU".to_string()),
        };
    }
    match spec {
        "gpu.nvidia" if gpu.nvidia.present => Ok(()),
        "gpu.nvidia" => Err("no NVIDIA GPU".to_string()),
        "gpu.amd" if gpu.amd.present => Ok(()),
        "gpu.amd" => Err("no AMD GPU".to_string()),
        other => Err(format!("unrecognized hardware requirement '{other}'")),
    }
}
