use crate::search::Task;
use itertools::Itertools;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashSet;

/// Variable dependency graphs. The full graph has an arc `u -> v` whenever
/// some operator (or axiom) has a condition on `u` and writes `v`, plus
/// arcs in both directions between co-occurring effect variables. The
/// legacy view keeps only the condition-to-effect arcs; it drives the CEA
/// parent sets, pattern extension and merge ordering.
#[derive(Debug)]
pub struct CausalGraph {
    full: DiGraph<(), ()>,
    legacy: DiGraph<(), ()>,
}

impl CausalGraph {
    pub fn from_task(task: &Task) -> Self {
        let var_count = task.variables.len();
        let mut legacy_arcs: HashSet<(usize, usize)> = HashSet::new();
        let mut effect_arcs: HashSet<(usize, usize)> = HashSet::new();

        for op in task.operators.iter().chain(task.axioms.iter()) {
            let mut condition_vars: Vec<usize> =
                op.prevail().iter().map(|prevail| prevail.var).collect();
            let mut effect_vars: Vec<usize> = vec![];
            for pre_post in op.pre_post() {
                effect_vars.push(pre_post.var);
                if pre_post.pre.is_some() {
                    condition_vars.push(pre_post.var);
                }
                condition_vars.extend(pre_post.conditions.iter().map(|cond| cond.var));
            }
            for &effect_var in &effect_vars {
                for &condition_var in &condition_vars {
                    if condition_var != effect_var {
                        legacy_arcs.insert((condition_var, effect_var));
                    }
                }
                for &other in &effect_vars {
                    if other != effect_var {
                        effect_arcs.insert((other, effect_var));
                    }
                }
            }
        }

        let mut full = DiGraph::new();
        let mut legacy = DiGraph::new();
        for _ in 0..var_count {
            full.add_node(());
            legacy.add_node(());
        }
        for &(from, to) in legacy_arcs.iter().sorted() {
            legacy.add_edge(NodeIndex::new(from), NodeIndex::new(to), ());
            full.add_edge(NodeIndex::new(from), NodeIndex::new(to), ());
        }
        for &(from, to) in effect_arcs.iter().sorted() {
            if !legacy_arcs.contains(&(from, to)) {
                full.add_edge(NodeIndex::new(from), NodeIndex::new(to), ());
            }
        }

        Self { full, legacy }
    }

    /// Variables `u` with a legacy arc `u -> var`, sorted.
    pub fn legacy_predecessors(&self, var: usize) -> Vec<usize> {
        self.legacy
            .neighbors_directed(NodeIndex::new(var), petgraph::Direction::Incoming)
            .map(NodeIndex::index)
            .sorted()
            .collect()
    }

    /// Variables `v` with a legacy arc `var -> v`, sorted.
    pub fn legacy_successors(&self, var: usize) -> Vec<usize> {
        self.legacy
            .neighbors_directed(NodeIndex::new(var), petgraph::Direction::Outgoing)
            .map(NodeIndex::index)
            .sorted()
            .collect()
    }

    /// Whether the full graph connects `a` and `b` in either direction.
    pub fn are_connected(&self, a: usize, b: usize) -> bool {
        self.full
            .contains_edge(NodeIndex::new(a), NodeIndex::new(b))
            || self
                .full
                .contains_edge(NodeIndex::new(b), NodeIndex::new(a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn cea_task_arcs() {
        // o2 (a: 1 -> 2) prevails on b, so b is a legacy predecessor of a.
        let task = cea_task();
        let cg = CausalGraph::from_task(&task);
        assert_eq!(cg.legacy_predecessors(0), vec![1]);
        assert_eq!(cg.legacy_successors(1), vec![0]);
        assert!(cg.legacy_predecessors(1).is_empty());
        assert!(cg.are_connected(0, 1));
    }

    #[test]
    fn independent_variables_are_unconnected() {
        let task = reachability_task();
        let cg = CausalGraph::from_task(&task);
        assert!(cg.legacy_predecessors(0).is_empty());
        assert!(cg.legacy_predecessors(1).is_empty());
        assert!(!cg.are_connected(0, 1));
    }
}
