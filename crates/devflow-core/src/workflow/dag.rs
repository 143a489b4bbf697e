//! DAG builder, cycle detection, and execution ordering.
//!
//! Uses `petgraph` to model step dependencies as a directed graph. Topological
//! sort detects cycles, and a Kahn pass that always picks the earliest
//! declared ready step yields a deterministic sequential execution order.

use std::collections::{BTreeSet, HashMap};

use devflow_types::workflow::StepDefinition;
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::definition::WorkflowError;

// ---------------------------------------------------------------------------
// Graph construction
// ---------------------------------------------------------------------------

/// Build a `DiGraph` whose node weights are declared step indices, with an
/// edge from each dependency to its dependent.
fn build_graph(steps: &[StepDefinition]) -> Result<DiGraph<usize, ()>, WorkflowError> {
    let id_to_idx: HashMap<&str, usize> = steps
        .iter()
        .enumerate()
        .map(|(i, s)| (s.id.as_str(), i))
        .collect();

    let mut graph = DiGraph::<usize, ()>::with_capacity(steps.len(), 0);
    let nodes: Vec<NodeIndex> = (0..steps.len()).map(|i| graph.add_node(i)).collect();

    for (to_idx, step) in steps.iter().enumerate() {
        for dep in &step.dependencies {
            let from_idx = id_to_idx.get(dep.as_str()).ok_or_else(|| {
                WorkflowError::UnknownDependency(format!(
                    "step '{}' depends on unknown step '{}'",
                    step.id, dep
                ))
            })?;
            graph.add_edge(nodes[*from_idx], nodes[to_idx], ());
        }
    }

    toposort(&graph, None).map_err(|cycle| {
        let step_id = &steps[graph[cycle.node_id()]].id;
        WorkflowError::CycleDetected(format!("cycle detected involving step '{}'", step_id))
    })?;

    Ok(graph)
}

// ---------------------------------------------------------------------------
// Execution order
// ---------------------------------------------------------------------------

/// Compute the order in which a run visits its steps.
///
/// Every step appears after all of its dependencies. Among steps that are
/// ready at the same time, the one declared first goes first, so a workflow
/// already declared in dependency order runs exactly in declared order.
pub fn execution_order(steps: &[StepDefinition]) -> Result<Vec<&StepDefinition>, WorkflowError> {
    if steps.is_empty() {
        return Ok(vec![]);
    }

    let graph = build_graph(steps)?;

    let mut in_degree: Vec<usize> = graph
        .node_indices()
        .map(|n| graph.neighbors_directed(n, Direction::Incoming).count())
        .collect();
    let mut ready: BTreeSet<usize> = (0..steps.len()).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(steps.len());

    while let Some(idx) = ready.pop_first() {
        order.push(&steps[idx]);
        for next in graph.neighbors_directed(NodeIndex::new(idx), Direction::Outgoing) {
            let next_idx = graph[next];
            in_degree[next_idx] -= 1;
            if in_degree[next_idx] == 0 {
                ready.insert(next_idx);
            }
        }
    }

    Ok(order)
}

/// Validate that the step graph has no unknown dependencies and no cycles.
pub fn validate_dag(steps: &[StepDefinition]) -> Result<(), WorkflowError> {
    build_graph(steps).map(|_| ())
}

/// Get the dependency IDs of a specific step.
pub fn get_step_dependencies<'a>(steps: &'a [StepDefinition], step_id: &str) -> Vec<&'a str> {
    steps
        .iter()
        .find(|s| s.id == step_id)
        .map(|s| s.dependencies.iter().map(|d| d.as_str()).collect())
        .unwrap_or_default()
}

/// Get the IDs of steps that list `step_id` as a direct dependency.
pub fn get_step_dependents<'a>(steps: &'a [StepDefinition], step_id: &str) -> Vec<&'a str> {
    steps
        .iter()
        .filter(|s| s.dependencies.iter().any(|d| d == step_id))
        .map(|s| s.id.as_str())
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use devflow_types::workflow::StepType;

    /// Helper: build a custom step with the given dependencies.
    fn custom_step(id: &str, deps: Vec<&str>) -> StepDefinition {
        let mut step = StepDefinition::new(id, StepType::Custom);
        step.dependencies = deps.into_iter().map(String::from).collect();
        step
    }

    fn ids(order: &[&StepDefinition]) -> Vec<String> {
        order.iter().map(|s| s.id.clone()).collect()
    }

    fn position(order: &[String], id: &str) -> usize {
        order.iter().position(|s| s == id).unwrap()
    }

    #[test]
    fn test_empty_steps() {
        assert!(execution_order(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_declared_order_is_kept_when_consistent() {
        let steps = vec![
            custom_step("a", vec![]),
            custom_step("b", vec!["a"]),
            custom_step("c", vec!["b"]),
        ];
        assert_eq!(ids(&execution_order(&steps).unwrap()), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_dependency_declared_later_runs_first() {
        let steps = vec![
            custom_step("deploy", vec!["build"]),
            custom_step("build", vec![]),
        ];
        assert_eq!(
            ids(&execution_order(&steps).unwrap()),
            vec!["build", "deploy"]
        );
    }

    #[test]
    fn test_diamond_every_step_after_its_dependencies() {
        let steps = vec![
            custom_step("d", vec!["b", "c"]),
            custom_step("c", vec!["a"]),
            custom_step("b", vec!["a"]),
            custom_step("a", vec![]),
        ];
        let order = ids(&execution_order(&steps).unwrap());
        assert_eq!(order.len(), 4);
        for step in &steps {
            for dep in &step.dependencies {
                assert!(
                    position(&order, dep) < position(&order, &step.id),
                    "{dep} must precede {}",
                    step.id
                );
            }
        }
        // c is declared before b, so it wins the tie
        assert_eq!(order, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn test_independent_steps_keep_declared_order() {
        let steps = vec![
            custom_step("z", vec![]),
            custom_step("y", vec![]),
            custom_step("x", vec![]),
        ];
        assert_eq!(ids(&execution_order(&steps).unwrap()), vec!["z", "y", "x"]);
    }

    #[test]
    fn test_cycle_detection() {
        let steps = vec![
            custom_step("a", vec!["c"]),
            custom_step("b", vec!["a"]),
            custom_step("c", vec!["b"]),
        ];
        let err = execution_order(&steps).unwrap_err();
        assert!(matches!(err, WorkflowError::CycleDetected(_)));
        assert!(err.to_string().contains("cycle detected"));
    }

    #[test]
    fn test_unknown_dependency() {
        let steps = vec![custom_step("a", vec!["nonexistent"])];
        let err = validate_dag(&steps).unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[test]
    fn test_dependencies_and_dependents() {
        let steps = vec![
            custom_step("a", vec![]),
            custom_step("b", vec!["a"]),
            custom_step("c", vec!["a", "b"]),
        ];
        assert_eq!(get_step_dependencies(&steps, "c"), vec!["a", "b"]);
        assert!(get_step_dependencies(&steps, "missing").is_empty());
        assert_eq!(get_step_dependents(&steps, "a"), vec!["b", "c"]);
        assert!(get_step_dependents(&steps, "c").is_empty());
    }
}
