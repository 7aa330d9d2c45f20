//! DAG validation and scheduling helpers shared by the resolver and the
//! orchestrator (§3.4 invariants, §8 invariant 2/3).

use std::collections::{HashMap, HashSet};
use toolrig_core::{Step, StepType, ToolRigError};

/// Verify that `{step.id}` is unique and `depends_on` forms a DAG, and
/// that every `verify` step depends (transitively) on a mutating step for
/// the same tool.
pub fn validate_dag(steps: &[Step]) -> toolrig_core::Result<()> {
    let mut seen = HashSet::new();
    for step in steps {
        if !seen.insert(step.id.as_str()) {
            return Err(ToolRigError::SchemaViolation {
                recipe: step.tool.clone(),
                detail: format!("duplicate step id '{}'", step.id),
            });
        }
    }

    let by_id: HashMap<&str, &Step> = steps.iter().map(|s| (s.id.as_str(), s)).collect();
    for step in steps {
        for dep in &step.depends_on {
            if !by_id.contains_key(dep.as_str()) {
                return Err(ToolRigError::SchemaViolation {
                    recipe: step.tool.clone(),
                    detail: format!("step '{}' depends on unknown step '{dep}'", step.id),
                });
            }
        }
    }

    topo_order(steps)?;

    for step in steps.iter().filter(|s| s.kind == StepType::Verify) {
        let reachable = transitive_deps(step, &by_id);
        let has_mutating_dep = reachable
            .iter()
            .any(|id| by_id[id].is_mutating() && by_id[id].tool == step.tool);
        if !reachable.is_empty() && !has_mutating_dep {
            return Err(ToolRigError::SchemaViolation {
                recipe: step.tool.clone(),
                detail: format!(
                    "verify step '{}' does not transitively depend on a mutating step for its tool",
                    step.id
                ),
            });
        }
    }

    Ok(())
}

fn transitive_deps<'a>(step: &'a Step, by_id: &HashMap<&'a str, &'a Step>) -> HashSet<&'a str> {
    let mut visited = HashSet::new();
    let mut stack: Vec<&str> = step.depends_on.iter().map(String::as_str).collect();
    while let Some(id) = stack.pop() {
        if !visited.insert(id) {
            continue;
        }
        if let Some(dep_step) = by_id.get(id) {
            stack.extend(dep_step.depends_on.iter().map(String::as_str));
        }
    }
    visited
}

/// Kahn's algorithm; returns an error naming the cycle if one exists.
pub fn topo_order(steps: &[Step]) -> toolrig_core::Result<Vec<String>> {
    let by_id: HashMap<&str, &Step> = steps.iter().map(|s| (s.id.as_str(), s)).collect();
    let mut in_degree: HashMap<&str, usize> = steps.iter().map(|s| (s.id.as_str(), 0)).collect();
    let mut edges: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in steps {
        for dep in &step.depends_on {
            edges.entry(dep.as_str()).or_default().push(step.id.as_str());
            *in_degree.get_mut(step.id.as_str()).expect("step present") += 1;
        }
    }

    let mut ready: Vec<&str> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(id, _)| *id)
        .collect();
    ready.sort_unstable();

    let mut order = Vec::with_capacity(steps.len());
    while let Some(id) = ready.pop() {
        order.push(id.to_string());
        if let Some(dependents) = edges.get(id) {
            let mut newly_ready = Vec::new();
            for dependent in dependents {
                let deg = in_degree.get_mut(dependent).expect("tracked degree");
                *deg -= 1;
                if *deg == 0 {
                    newly_ready.push(*dependent);
                }
            }
            newly_ready.sort_unstable();
            ready.extend(newly_ready);
        }
    }

    if order.len() != steps.len() {
        let stuck: Vec<&str> = by_id
            .keys()
            .filter(|id| !order.contains(&id.to_string()))
            .copied()
            .collect();
        return Err(ToolRigError::DependencyCycle(stuck.join(" -> ")));
    }

    Ok(order)
}

/// The ready set: steps whose dependencies are all `Done`/`Skipped` and
/// which are not blocked by a package-manager peer already running.
pub fn ready_steps<'a>(
    steps: &'a [Step],
    done: &HashSet<&str>,
    running_pms: &HashSet<&str>,
) -> Vec<&'a Step> {
    steps
        .iter()
        .filter(|s| matches!(s.status, toolrig_core::StepStatus::Pending | toolrig_core::StepStatus::Ready))
        .filter(|s| s.depends_on.iter().all(|d| done.contains(d.as_str())))
        .filter(|s| match &s.package_manager {
            Some(pm) => !running_pms.contains(pm.as_str()),
            None => true,
        })
        .collect()
}
