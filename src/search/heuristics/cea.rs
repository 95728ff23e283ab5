use crate::search::{
    clamped_add,
    graphs::{DomainTransitionGraph, LocalAssignment},
    heuristics::{Heuristic, HeuristicValue},
    states::State,
    Cost, OperatorId, Task, INFINITY,
};
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::rc::Rc;
use tracing::info;

/// Marks a local problem that has not been initialized for the current
/// evaluation.
const UNINITIALIZED: Cost = -1;

/// Index of the synthetic goal problem in the problem arena.
const GOAL_PROBLEM: usize = 0;

/// The goal problem's sink node.
const GOAL_NODE: usize = 1;

#[derive(Debug, Clone)]
struct LocalLabel {
    /// `None` for axiom labels and the goal transition.
    op: Option<OperatorId>,
    conditions: Vec<LocalAssignment>,
    effects: Vec<LocalAssignment>,
}

/// Address of a transition: problem, source node, transition index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TransRef {
    problem: usize,
    node: usize,
    index: usize,
}

#[derive(Debug)]
struct LocalTransition {
    target: usize,
    action_cost: Cost,
    label: LocalLabel,
    // Scratch; valid from the owning node's expansion onwards.
    target_cost: Cost,
    unreached_conditions: usize,
}

#[derive(Debug)]
struct LocalNode {
    transitions: Vec<LocalTransition>,
    // Scratch, reset when the owning problem is initialized.
    cost: Cost,
    expanded: bool,
    reached_by: Option<TransRef>,
    children_state: Vec<usize>,
    waiting_list: Vec<TransRef>,
}

#[derive(Debug)]
struct LocalProblem {
    /// Global variables the label conditions are projected onto.
    parent_vars: Vec<usize>,
    nodes: Vec<LocalNode>,
    base_priority: Cost,
}

/// Context-enhanced additive heuristic. Each variable/start-value pair
/// caches a local Dijkstra problem over the variable's DTG, conditional on
/// the evaluated state; transitions whose label conditions involve other
/// variables suspend on the corresponding local problems and resume when
/// the needed distance is known. A shared heap mixes all local problems;
/// keys are `base_priority + cost`, so a problem's internal order does not
/// depend on its absolute offset.
#[derive(Debug)]
pub struct CeaHeuristic {
    task: Rc<Task>,
    dtgs: Vec<DomainTransitionGraph>,
    problems: Vec<LocalProblem>,
    /// `[var][start_value]` to problem arena index.
    problem_index: Vec<Vec<Option<usize>>>,
    heap: BinaryHeap<Reverse<(Cost, usize, usize)>>,
    preferred: Vec<OperatorId>,
    preferred_marks: Vec<bool>,
}

impl CeaHeuristic {
    pub fn new(task: Rc<Task>) -> Self {
        info!("initializing context-enhanced additive heuristic");
        let dtgs = DomainTransitionGraph::build_all(&task);
        let problem_index = task
            .variables
            .iter()
            .map(|var| vec![None; var.domain_size])
            .collect();
        let goal_problem = build_goal_problem(&task);
        let num_operators = task.operators.len();
        Self {
            task,
            dtgs,
            problems: vec![goal_problem],
            problem_index,
            heap: BinaryHeap::new(),
            preferred: vec![],
            preferred_marks: vec![false; num_operators],
        }
    }

    fn node_priority(&self, problem: usize, node: usize) -> Cost {
        clamped_add(
            self.problems[problem].base_priority,
            self.problems[problem].nodes[node].cost,
        )
    }

    fn push_node(&mut self, problem: usize, node: usize) {
        let priority = self.node_priority(problem, node);
        self.heap.push(Reverse((priority, problem, node)));
    }

    /// The local problem for `var` starting at `start_value`, built on
    /// first use.
    fn ensure_problem(&mut self, var: usize, start_value: usize) -> usize {
        if let Some(problem) = self.problem_index[var][start_value] {
            return problem;
        }
        let problem = self.problems.len();
        self.problems
            .push(build_variable_problem(&self.task, &self.dtgs[var]));
        self.problem_index[var][start_value] = Some(problem);
        problem
    }

    fn initialize_problem(
        &mut self,
        problem: usize,
        base_priority: Cost,
        start_value: usize,
        state: &State,
    ) {
        debug_assert_eq!(self.problems[problem].base_priority, UNINITIALIZED);
        self.problems[problem].base_priority = base_priority;
        for node in &mut self.problems[problem].nodes {
            node.cost = INFINITY;
            node.expanded = false;
            node.reached_by = None;
            node.waiting_list.clear();
        }
        let parent_values: Vec<usize> = self.problems[problem]
            .parent_vars
            .iter()
            .map(|&var| state[var])
            .collect();
        let start = &mut self.problems[problem].nodes[start_value];
        start.cost = 0;
        start.children_state = parent_values;
        self.push_node(problem, start_value);
    }

    fn compute_costs(&mut self, state: &State) -> HeuristicValue {
        while let Some(Reverse((priority, problem, node))) = self.heap.pop() {
            debug_assert_ne!(self.problems[problem].base_priority, UNINITIALIZED);
            if self.node_priority(problem, node) < priority {
                continue;
            }
            if problem == GOAL_PROBLEM && node == GOAL_NODE {
                return HeuristicValue::Estimate(self.problems[problem].nodes[node].cost);
            }
            debug_assert_eq!(self.node_priority(problem, node), priority);
            self.expand_node(problem, node);
            for index in 0..self.problems[problem].nodes[node].transitions.len() {
                self.on_source_expanded(
                    TransRef {
                        problem,
                        node,
                        index,
                    },
                    state,
                );
            }
        }
        HeuristicValue::DeadEnd
    }

    fn expand_node(&mut self, problem: usize, node: usize) {
        self.problems[problem].nodes[node].expanded = true;

        // Reconstruct the context: take the parent's view of the children
        // state and overwrite it with the reaching label's conditions and
        // side effects.
        if let Some(reached_by) = self.problems[problem].nodes[node].reached_by {
            debug_assert_eq!(reached_by.problem, problem);
            let mut children_state =
                self.problems[problem].nodes[reached_by.node].children_state.clone();
            {
                let label = &self.problems[problem].nodes[reached_by.node].transitions
                    [reached_by.index]
                    .label;
                for condition in &label.conditions {
                    children_state[condition.local_var] = condition.value;
                }
                for effect in &label.effects {
                    children_state[effect.local_var] = effect.value;
                }
            }
            self.problems[problem].nodes[node].children_state = children_state;
            // Path compression: remember the first transition on the path
            // for helpful-transition extraction.
            if let Some(parent_reached_by) =
                self.problems[problem].nodes[reached_by.node].reached_by
            {
                self.problems[problem].nodes[node].reached_by = Some(parent_reached_by);
            }
        }

        let cost = self.problems[problem].nodes[node].cost;
        let waiting = std::mem::take(&mut self.problems[problem].nodes[node].waiting_list);
        for transition in waiting {
            self.on_condition_reached(transition, cost);
        }
    }

    fn on_source_expanded(&mut self, t: TransRef, state: &State) {
        let source_cost = self.problems[t.problem].nodes[t.node].cost;
        debug_assert!(source_cost >= 0 && source_cost < INFINITY);

        let (target, action_cost) = {
            let transition = &self.problems[t.problem].nodes[t.node].transitions[t.index];
            (transition.target, transition.action_cost)
        };
        let mut target_cost = clamped_add(source_cost, action_cost);
        {
            let transition = &mut self.problems[t.problem].nodes[t.node].transitions[t.index];
            transition.target_cost = target_cost;
            transition.unreached_conditions = 0;
        }
        if self.problems[t.problem].nodes[target].cost <= target_cost {
            // Cannot improve the target along this transition.
            return;
        }

        let conditions = self.problems[t.problem].nodes[t.node].transitions[t.index]
            .label
            .conditions
            .clone();
        let source_priority = self.node_priority(t.problem, t.node);
        for condition in conditions {
            let current_value =
                self.problems[t.problem].nodes[t.node].children_state[condition.local_var];
            if current_value == condition.value {
                continue;
            }
            let precond_var = self.problems[t.problem].parent_vars[condition.local_var];
            let child = self.ensure_problem(precond_var, current_value);
            if self.problems[child].base_priority == UNINITIALIZED {
                self.initialize_problem(child, source_priority, current_value, state);
            }
            let cond_node = &self.problems[child].nodes[condition.value];
            if cond_node.expanded {
                let cond_cost = cond_node.cost;
                target_cost = clamped_add(target_cost, cond_cost);
                self.problems[t.problem].nodes[t.node].transitions[t.index].target_cost =
                    target_cost;
                if self.problems[t.problem].nodes[target].cost <= target_cost {
                    return;
                }
            } else {
                self.problems[child].nodes[condition.value]
                    .waiting_list
                    .push(t);
                self.problems[t.problem].nodes[t.node].transitions[t.index]
                    .unreached_conditions += 1;
            }
        }
        self.try_to_fire(t);
    }

    fn on_condition_reached(&mut self, t: TransRef, cond_cost: Cost) {
        let transition = &mut self.problems[t.problem].nodes[t.node].transitions[t.index];
        debug_assert!(transition.unreached_conditions > 0);
        transition.unreached_conditions -= 1;
        transition.target_cost = clamped_add(transition.target_cost, cond_cost);
        self.try_to_fire(t);
    }

    fn try_to_fire(&mut self, t: TransRef) {
        let (target, target_cost, unreached) = {
            let transition = &self.problems[t.problem].nodes[t.node].transitions[t.index];
            (
                transition.target,
                transition.target_cost,
                transition.unreached_conditions,
            )
        };
        if unreached == 0 && target_cost < self.problems[t.problem].nodes[target].cost {
            self.problems[t.problem].nodes[target].cost = target_cost;
            self.problems[t.problem].nodes[target].reached_by = Some(t);
            self.push_node(t.problem, target);
        }
    }

    /// Walks back from the goal sink marking the first operator on each
    /// path as preferred when it is immediately applicable.
    fn mark_helpful_transitions(&mut self, state: &State) {
        let mut stack = vec![(GOAL_PROBLEM, GOAL_NODE)];
        while let Some((problem, node)) = stack.pop() {
            let Some(first_on_path) = self.problems[problem].nodes[node].reached_by else {
                continue;
            };
            // Clear to avoid revisiting this node later.
            self.problems[problem].nodes[node].reached_by = None;
            let transition = &self.problems[first_on_path.problem].nodes[first_on_path.node]
                .transitions[first_on_path.index];
            let (target_cost, action_cost, op) = (
                transition.target_cost,
                transition.action_cost,
                transition.label.op,
            );
            if target_cost == action_cost {
                // Transition possibly applicable. Without zero-cost actions
                // the cost test is already conclusive.
                if let Some(op) = op {
                    if self.task.min_action_cost != 0
                        || self.task.operators[op].is_applicable(state)
                    {
                        if !self.preferred_marks[op] {
                            self.preferred_marks[op] = true;
                            self.preferred.push(op);
                        }
                    }
                }
            } else {
                // Recurse into the unsatisfied conditions of the first
                // transition on the path.
                let conditions = self.problems[first_on_path.problem].nodes
                    [first_on_path.node]
                    .transitions[first_on_path.index]
                    .label
                    .conditions
                    .clone();
                for condition in conditions {
                    let precond_var =
                        self.problems[first_on_path.problem].parent_vars[condition.local_var];
                    if state[precond_var] == condition.value {
                        continue;
                    }
                    if let Some(child) = self.problem_index[precond_var][state[precond_var]] {
                        stack.push((child, condition.value));
                    }
                }
            }
        }
    }
}

impl Heuristic for CeaHeuristic {
    fn evaluate(&mut self, state: &State) -> HeuristicValue {
        self.heap.clear();
        self.preferred.clear();
        for mark in &mut self.preferred_marks {
            *mark = false;
        }
        for problem in &mut self.problems {
            problem.base_priority = UNINITIALIZED;
        }
        self.initialize_problem(GOAL_PROBLEM, 0, 0, state);

        let result = self.compute_costs(state);
        if let HeuristicValue::Estimate(h) = result {
            if h != 0 {
                self.mark_helpful_transitions(state);
            }
        }
        result
    }

    fn preferred_operators(&self) -> &[OperatorId] {
        &self.preferred
    }
}

fn build_goal_problem(task: &Task) -> LocalProblem {
    let parent_vars: Vec<usize> = task.goal.facts().iter().map(|fact| fact.var).collect();
    let conditions: Vec<LocalAssignment> = task
        .goal
        .facts()
        .iter()
        .enumerate()
        .map(|(local_var, fact)| LocalAssignment {
            local_var,
            value: fact.value,
        })
        .collect();
    let goal_transition = LocalTransition {
        target: GOAL_NODE,
        action_cost: 0,
        label: LocalLabel {
            op: None,
            conditions,
            effects: vec![],
        },
        target_cost: UNINITIALIZED,
        unreached_conditions: 0,
    };
    let num_parents = parent_vars.len();
    let make_node = |transitions: Vec<LocalTransition>| LocalNode {
        transitions,
        cost: INFINITY,
        expanded: false,
        reached_by: None,
        children_state: vec![0; num_parents],
        waiting_list: vec![],
    };
    LocalProblem {
        parent_vars,
        nodes: vec![make_node(vec![goal_transition]), make_node(vec![])],
        base_priority: UNINITIALIZED,
    }
}

fn build_variable_problem(task: &Task, dtg: &DomainTransitionGraph) -> LocalProblem {
    let parent_vars = dtg.local_to_global.clone();
    let num_parents = parent_vars.len();
    let mut nodes = Vec::with_capacity(dtg.domain_size());
    for value in 0..dtg.domain_size() {
        let mut transitions = vec![];
        for arc in &dtg.transitions[value] {
            for label in &arc.labels {
                let (op, action_cost) = if dtg.is_axiom {
                    (None, 0)
                } else {
                    (Some(label.op), task.operators[label.op].cost())
                };
                transitions.push(LocalTransition {
                    target: arc.target,
                    action_cost,
                    label: LocalLabel {
                        op,
                        conditions: label.conditions.clone(),
                        effects: label.side_effects.clone(),
                    },
                    target_cost: UNINITIALIZED,
                    unreached_conditions: 0,
                });
            }
        }
        nodes.push(LocalNode {
            transitions,
            cost: INFINITY,
            expanded: false,
            reached_by: None,
            children_state: vec![0; num_parents],
            waiting_list: vec![],
        });
    }
    LocalProblem {
        parent_vars,
        nodes,
        base_priority: UNINITIALIZED,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn context_makes_the_chain_cost_three() {
        let task = Rc::new(cea_task());
        let mut cea = CeaHeuristic::new(task.clone());
        let h = cea.evaluate(&task.initial_state());
        // Reaching a=2 needs a=1, then o2 with context b=1, which itself
        // costs a step: at least three actions in total.
        match h {
            HeuristicValue::Estimate(h) => assert!(h >= 3, "h = {h}"),
            HeuristicValue::DeadEnd => panic!("initial state is not a dead end"),
        }
        // The path to a=2 is compressed to its first transition, so o1 is
        // the helpful action from the initial state.
        assert_eq!(cea.preferred_operators(), &[0]);
    }

    #[test]
    fn goal_conditions_add_up_with_context() {
        let task = Rc::new(truck_task());
        let mut cea = CeaHeuristic::new(task.clone());
        // Each package costs 3 (load, drive context, unload) from the
        // initial state; the goal conjunction sums them.
        assert_eq!(
            cea.evaluate(&task.initial_state()),
            HeuristicValue::Estimate(6)
        );
        // The compressed first transitions of both package chains are the
        // loads.
        let mut preferred = cea.preferred_operators().to_vec();
        preferred.sort_unstable();
        assert_eq!(preferred, vec![2, 4]);
    }

    #[test]
    fn goal_state_is_zero() {
        let task = Rc::new(cea_task());
        let mut cea = CeaHeuristic::new(task.clone());
        assert_eq!(
            cea.evaluate(&State::new(vec![2, 1])),
            HeuristicValue::Estimate(0)
        );
        assert!(cea.preferred_operators().is_empty());
    }

    #[test]
    fn unreachable_goal_is_a_dead_end() {
        let task = Rc::new(deadend_task());
        let mut cea = CeaHeuristic::new(task.clone());
        assert_eq!(
            cea.evaluate(&State::new(vec![0, 1])),
            HeuristicValue::DeadEnd
        );
    }

    #[test]
    fn repeated_evaluations_are_consistent() {
        let task = Rc::new(cea_task());
        let mut cea = CeaHeuristic::new(task.clone());
        let first = cea.evaluate(&task.initial_state());
        let second = cea.evaluate(&task.initial_state());
        assert_eq!(first, second);
    }
}
