use crate::search::{
    merge_and_shrink::{
        state_map::{AbstractStateRef, PRUNED},
        LabelReduction, StateMap,
    },
    states::State,
    Cost, Task, INFINITY,
};
use itertools::Itertools;
use std::collections::VecDeque;
use tracing::debug;

/// One abstract arc of an operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct AbstractTransition {
    pub src: usize,
    pub target: usize,
    pub cost: Cost,
}

/// An abstract transition system. Transitions are grouped by operator, not
/// by source state: that makes products and abstraction mappings cheap, and
/// the distance computations build their own adjacency on the fly.
#[derive(Debug)]
pub(crate) struct Abstraction {
    pub varset: Vec<usize>,
    pub num_states: usize,
    pub init_state: Option<usize>,
    pub goal_states: Vec<bool>,
    pub transitions_by_op: Vec<Vec<AbstractTransition>>,
    pub relevant_operators: Vec<bool>,
    pub init_distances: Vec<Cost>,
    pub goal_distances: Vec<Cost>,
    pub max_f: Cost,
    pub max_h: Cost,
    state_map: StateMap,
}

impl Abstraction {
    /// One abstraction per variable: a state per value, arcs from the
    /// projected operators including prevail self-loops, and enumerated
    /// origins for effects without preconditions.
    pub fn build_atomic(task: &Task) -> Vec<Abstraction> {
        let num_operators = task.operators.len();
        let mut result: Vec<Abstraction> = task
            .variables
            .iter()
            .map(|var| {
                let range = var.domain_size;
                let goal_value = task.goal.value_of(var.index);
                let goal_states: Vec<bool> = (0..range)
                    .map(|value| goal_value.is_none() || goal_value == Some(value))
                    .collect();
                Abstraction {
                    varset: vec![var.index],
                    num_states: range,
                    init_state: Some(task.initial_state()[var.index]),
                    goal_states,
                    transitions_by_op: vec![vec![]; num_operators],
                    relevant_operators: vec![false; num_operators],
                    init_distances: vec![],
                    goal_distances: vec![],
                    max_f: 0,
                    max_h: 0,
                    state_map: StateMap::atomic(var.index, range),
                }
            })
            .collect();

        for (op_no, op) in task.operators.iter().enumerate() {
            let cost = op.cost();
            for prevail in op.prevail() {
                let abstraction = &mut result[prevail.var];
                abstraction.transitions_by_op[op_no].push(AbstractTransition {
                    src: prevail.value,
                    target: prevail.value,
                    cost,
                });
                abstraction.relevant_operators[op_no] = true;
            }
            for pre_post in op.pre_post() {
                let abstraction = &mut result[pre_post.var];
                let origins: Vec<usize> = match pre_post.pre {
                    Some(pre) => vec![pre],
                    None => (0..abstraction.num_states).collect(),
                };
                for origin in origins {
                    abstraction.transitions_by_op[op_no].push(AbstractTransition {
                        src: origin,
                        target: pre_post.post,
                        cost,
                    });
                }
                abstraction.relevant_operators[op_no] = true;
            }
        }

        for abstraction in &mut result {
            abstraction.compute_distances();
        }
        result
    }

    /// Synchronized product. Consumes both factors; their transition
    /// systems die here while their state maps live on inside the
    /// composite's map.
    pub fn merge(
        mut one: Abstraction,
        two: Abstraction,
        task: &Task,
        label_reduction: bool,
    ) -> Abstraction {
        assert!(one.is_solvable() && two.is_solvable());
        debug_assert!(one.varset.iter().all(|var| !two.varset.contains(var)));

        // Normalizing the composite factor first keeps the product sparse.
        if one.varset.len() > 1 {
            one.normalize(task, label_reduction);
        }

        let varset: Vec<usize> = one
            .varset
            .iter()
            .chain(two.varset.iter())
            .copied()
            .sorted()
            .collect();
        let num_states = one.num_states * two.num_states;
        let multiplier = two.num_states;

        let mut goal_states = vec![false; num_states];
        let mut init_state = None;
        for s1 in 0..one.num_states {
            for s2 in 0..two.num_states {
                let state = s1 * multiplier + s2;
                if one.goal_states[s1] && two.goal_states[s2] {
                    goal_states[state] = true;
                }
                if Some(s1) == one.init_state && Some(s2) == two.init_state {
                    init_state = Some(state);
                }
            }
        }

        let num_operators = task.operators.len();
        let mut transitions_by_op: Vec<Vec<AbstractTransition>> = vec![vec![]; num_operators];
        let mut relevant_operators = vec![false; num_operators];
        for op_no in 0..num_operators {
            let relevant1 = one.relevant_operators[op_no];
            let relevant2 = two.relevant_operators[op_no];
            if !relevant1 && !relevant2 {
                continue;
            }
            relevant_operators[op_no] = true;
            let bucket1 = &one.transitions_by_op[op_no];
            let bucket2 = &two.transitions_by_op[op_no];
            let transitions = &mut transitions_by_op[op_no];
            if relevant1 && relevant2 {
                transitions.reserve(bucket1.len() * bucket2.len());
                for t1 in bucket1 {
                    for t2 in bucket2 {
                        transitions.push(AbstractTransition {
                            src: t1.src * multiplier + t2.src,
                            target: t1.target * multiplier + t2.target,
                            cost: t1.cost.min(t2.cost),
                        });
                    }
                }
            } else if relevant1 {
                transitions.reserve(bucket1.len() * two.num_states);
                for t1 in bucket1 {
                    for s2 in 0..two.num_states {
                        transitions.push(AbstractTransition {
                            src: t1.src * multiplier + s2,
                            target: t1.target * multiplier + s2,
                            cost: t1.cost,
                        });
                    }
                }
            } else {
                transitions.reserve(bucket2.len() * one.num_states);
                for t2 in bucket2 {
                    for s1 in 0..one.num_states {
                        transitions.push(AbstractTransition {
                            src: s1 * multiplier + t2.src,
                            target: s1 * multiplier + t2.target,
                            cost: t2.cost,
                        });
                    }
                }
            }
        }

        let state_map = StateMap::composite(
            one.state_map,
            two.state_map,
            one.num_states,
            two.num_states,
        );

        let mut merged = Abstraction {
            varset,
            num_states,
            init_state,
            goal_states,
            transitions_by_op,
            relevant_operators,
            init_distances: vec![],
            goal_distances: vec![],
            max_f: 0,
            max_h: 0,
            state_map,
        };
        merged.compute_distances();
        merged
    }

    pub fn size(&self) -> usize {
        self.num_states
    }

    pub fn is_solvable(&self) -> bool {
        self.init_state.is_some()
    }

    /// The goal distance of the abstract image of `state`; `None` for
    /// states mapped to pruned abstract states.
    pub fn lookup(&self, state: &State) -> Option<Cost> {
        let abstract_state = self.state_map.lookup(state)?;
        let distance = self.goal_distances[abstract_state];
        (distance != INFINITY).then_some(distance)
    }

    /// Dedups transitions per operator (and optionally replaces labels by
    /// their reduced representative) by two bucket-partition passes.
    pub fn normalize(&mut self, task: &Task, label_reduction: bool) {
        let reduction = label_reduction
            .then(|| LabelReduction::new(task, &self.relevant_operators, &self.varset));
        if let Some(reduction) = &reduction {
            debug!(reduced = reduction.num_reduced(), "label reduction");
        }

        // First bucket by target, replacing labels by canonical ones.
        let mut target_buckets: Vec<Vec<(usize, usize, Cost)>> = vec![vec![]; self.num_states];
        for op_no in 0..self.transitions_by_op.len() {
            let transitions = std::mem::take(&mut self.transitions_by_op[op_no]);
            if transitions.is_empty() {
                continue;
            }
            let canon_op = match &reduction {
                Some(reduction) => reduction.canonical(op_no),
                None => op_no,
            };
            for transition in transitions {
                target_buckets[transition.target].push((
                    transition.src,
                    canon_op,
                    transition.cost,
                ));
            }
        }

        // Then by source, then regroup by operator dropping duplicates.
        let mut src_buckets: Vec<Vec<(usize, usize, Cost)>> = vec![vec![]; self.num_states];
        for (target, bucket) in target_buckets.into_iter().enumerate() {
            for (src, op_no, cost) in bucket {
                src_buckets[src].push((target, op_no, cost));
            }
        }
        for (src, bucket) in src_buckets.into_iter().enumerate() {
            for (target, op_no, cost) in bucket {
                let op_bucket = &mut self.transitions_by_op[op_no];
                let transition = AbstractTransition { src, target, cost };
                if op_bucket.last() != Some(&transition) {
                    op_bucket.push(transition);
                }
            }
        }
    }

    /// Forward/backward single-source shortest paths; states unreachable
    /// from the initial state or cut off from every goal are pruned.
    pub fn compute_distances(&mut self) {
        self.init_distances = vec![INFINITY; self.num_states];
        self.goal_distances = vec![INFINITY; self.num_states];

        let mut forward: Vec<Vec<(usize, Cost)>> = vec![vec![]; self.num_states];
        let mut backward: Vec<Vec<(usize, Cost)>> = vec![vec![]; self.num_states];
        for transitions in &self.transitions_by_op {
            for transition in transitions {
                forward[transition.src].push((transition.target, transition.cost));
                backward[transition.target].push((transition.src, transition.cost));
            }
        }

        if let Some(init_state) = self.init_state {
            self.init_distances[init_state] = 0;
            relax_distances(&forward, &mut self.init_distances, [init_state]);
        }
        let goal_sources: Vec<usize> = (0..self.num_states)
            .filter(|&state| self.goal_states[state])
            .collect();
        for &goal in &goal_sources {
            self.goal_distances[goal] = 0;
        }
        relax_distances(&backward, &mut self.goal_distances, goal_sources);

        self.max_f = 0;
        self.max_h = 0;
        let mut dead_states = 0;
        for state in 0..self.num_states {
            let g = self.init_distances[state];
            let h = self.goal_distances[state];
            if g == INFINITY || h == INFINITY {
                dead_states += 1;
            } else {
                self.max_f = self.max_f.max(g + h);
                self.max_h = self.max_h.max(h);
            }
        }
        if dead_states > 0 {
            debug!(dead_states, "pruning unreachable/irrelevant states");
            self.prune_dead_states();
        }
    }

    /// Applies the identity partition restricted to live states: nothing is
    /// combined, dead states disappear.
    fn prune_dead_states(&mut self) {
        let groups: Vec<Vec<usize>> = (0..self.num_states)
            .filter(|&state| {
                self.init_distances[state] != INFINITY
                    && self.goal_distances[state] != INFINITY
            })
            .map(|state| vec![state])
            .collect();
        self.apply_abstraction(&groups);
    }

    /// Quotients the state set by `groups`. States in no group are pruned.
    pub fn apply_abstraction(&mut self, groups: &[Vec<usize>]) {
        let mut mapping: Vec<AbstractStateRef> = vec![PRUNED; self.num_states];
        for (group_no, group) in groups.iter().enumerate() {
            for &state in group {
                debug_assert_eq!(mapping[state], PRUNED);
                mapping[state] = group_no as AbstractStateRef;
            }
        }

        let new_num_states = groups.len();
        let mut new_init_distances = vec![INFINITY; new_num_states];
        let mut new_goal_distances = vec![INFINITY; new_num_states];
        let mut new_goal_states = vec![false; new_num_states];
        let mut must_recompute = false;
        for (group_no, group) in groups.iter().enumerate() {
            debug_assert!(!group.is_empty());
            for (i, &state) in group.iter().enumerate() {
                if i == 0 {
                    new_init_distances[group_no] = self.init_distances[state];
                    new_goal_distances[group_no] = self.goal_distances[state];
                } else {
                    if self.init_distances[state] < new_init_distances[group_no] {
                        must_recompute = true;
                        new_init_distances[group_no] = self.init_distances[state];
                    }
                    if self.goal_distances[state] < new_goal_distances[group_no] {
                        must_recompute = true;
                        new_goal_distances[group_no] = self.goal_distances[state];
                    }
                }
                new_goal_states[group_no] = new_goal_states[group_no] || self.goal_states[state];
            }
        }

        for transitions in &mut self.transitions_by_op {
            let old = std::mem::take(transitions);
            for transition in old {
                let src = mapping[transition.src];
                let target = mapping[transition.target];
                if src != PRUNED && target != PRUNED {
                    transitions.push(AbstractTransition {
                        src: src as usize,
                        target: target as usize,
                        cost: transition.cost,
                    });
                }
            }
        }

        self.num_states = new_num_states;
        self.init_distances = new_init_distances;
        self.goal_distances = new_goal_distances;
        self.goal_states = new_goal_states;
        self.init_state = self
            .init_state
            .and_then(|init| (mapping[init] != PRUNED).then(|| mapping[init] as usize));
        self.state_map.apply_mapping(&mapping);

        if self.init_state.is_none() {
            debug!("initial state pruned; abstract problem is unsolvable");
        } else if must_recompute {
            debug!("abstraction was not f-preserving; recomputing distances");
            self.compute_distances();
        }
    }
}

/// Queue relaxation over an adjacency list; sources must be pre-seeded with
/// distance 0.
fn relax_distances(
    graph: &[Vec<(usize, Cost)>],
    distances: &mut [Cost],
    sources: impl IntoIterator<Item = usize>,
) {
    let mut queue: VecDeque<usize> = sources.into_iter().collect();
    while let Some(state) = queue.pop_front() {
        let distance = distances[state];
        for &(successor, cost) in &graph[state] {
            if distances[successor] > distance + cost {
                distances[successor] = distance + cost;
                queue.push_back(successor);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn atomic_abstraction_of_a_cycle() {
        let task = cycle_task();
        let abstractions = Abstraction::build_atomic(&task);
        let abstraction = &abstractions[0];
        assert_eq!(abstraction.size(), 3);
        assert_eq!(abstraction.init_state, Some(0));
        assert_eq!(abstraction.goal_distances, vec![2, 1, 0]);
        assert_eq!(abstraction.init_distances, vec![0, 1, 2]);
        assert_eq!(abstraction.max_f, 2);
    }

    #[test]
    fn unreachable_states_are_pruned() {
        // In the dead-end task b=1 is reachable but a=2 requires b=0;
        // merging both variables exposes states that are pruned.
        let task = deadend_task();
        let abstractions = Abstraction::build_atomic(&task);
        let mut iter = abstractions.into_iter();
        let abs_a = iter.next().unwrap();
        let abs_b = iter.next().unwrap();
        let merged = Abstraction::merge(abs_a, abs_b, &task, false);

        // Of the six product states, (0,1) and (1,1) are irrelevant: the
        // goal a=2 is unreachable once b=1.
        assert_eq!(merged.size(), 4);
        assert_eq!(merged.lookup(&task.initial_state()), Some(2));
        assert_eq!(merged.lookup(&State::new(vec![0, 1])), None);
        assert_eq!(merged.lookup(&State::new(vec![1, 1])), None);
        assert_eq!(merged.lookup(&State::new(vec![2, 1])), Some(0));
    }

    #[test]
    fn merge_preserves_exact_distances() {
        let task = chains_task();
        let abstractions = Abstraction::build_atomic(&task);
        let mut iter = abstractions.into_iter();
        let abs_a = iter.next().unwrap();
        let abs_b = iter.next().unwrap();
        let merged = Abstraction::merge(abs_a, abs_b, &task, false);
        assert_eq!(merged.size(), 20);
        for a in 0..4 {
            for b in 0..5 {
                let state = State::new(vec![a, b]);
                let expected = (3 - a as Cost) + (4 - b as Cost);
                assert_eq!(merged.lookup(&state), Some(expected));
            }
        }
    }

    #[test]
    fn normalize_drops_duplicate_transitions() {
        let task = chains_task();
        let abstractions = Abstraction::build_atomic(&task);
        let mut iter = abstractions.into_iter();
        let abs_a = iter.next().unwrap();
        let abs_b = iter.next().unwrap();
        let mut merged = Abstraction::merge(abs_a, abs_b, &task, false);
        let total_before: usize = merged.transitions_by_op.iter().map(Vec::len).sum();
        merged.normalize(&task, false);
        let total_after: usize = merged.transitions_by_op.iter().map(Vec::len).sum();
        assert!(total_after <= total_before);
        // Distances are untouched by normalization.
        assert_eq!(merged.lookup(&task.initial_state()), Some(7));
    }

    #[test]
    fn apply_abstraction_combines_states() {
        let task = cycle_task();
        let mut abstraction = Abstraction::build_atomic(&task).remove(0);
        // Collapse values 0 and 1; the group inherits the better distance.
        abstraction.apply_abstraction(&[vec![0, 1], vec![2]]);
        assert_eq!(abstraction.size(), 2);
        assert_eq!(abstraction.lookup(&State::new(vec![0])), Some(1));
        assert_eq!(abstraction.lookup(&State::new(vec![1])), Some(1));
        assert_eq!(abstraction.lookup(&State::new(vec![2])), Some(0));
    }
}
