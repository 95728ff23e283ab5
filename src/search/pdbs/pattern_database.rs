use crate::search::{
    heuristics::{ConfigError, Heuristic, HeuristicValue},
    merge_and_shrink::{MergeStrategyName, VariableOrderFinder},
    pdbs::MatchTree,
    states::State,
    Cost, Operator, Task, INFINITY,
};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::rc::Rc;
use tracing::debug;

/// A concrete operator projected onto a pattern, in regression form: the
/// conditions a successor abstract state must satisfy, and the hash delta
/// that maps it to the predecessor.
#[derive(Debug)]
pub(crate) struct AbstractOperator {
    cost: Cost,
    /// Sorted `(pattern variable, value)` pairs over prevails and effects.
    regression_preconditions: Vec<(usize, usize)>,
    /// `sum((pre - post) * n_i)` over the effects; applied by integer
    /// addition on the state hash.
    hash_effect: i64,
}

impl AbstractOperator {
    fn new(
        prev_pairs: &[(usize, usize)],
        pre_pairs: &[(usize, usize)],
        eff_pairs: &[(usize, usize)],
        cost: Cost,
        hash_multipliers: &[usize],
    ) -> Self {
        let mut regression_preconditions = prev_pairs.to_vec();
        regression_preconditions.extend_from_slice(eff_pairs);
        regression_preconditions.sort_unstable();

        debug_assert_eq!(pre_pairs.len(), eff_pairs.len());
        let mut hash_effect = 0i64;
        for (&(var, new_value), &(eff_var, old_value)) in pre_pairs.iter().zip(eff_pairs) {
            debug_assert_eq!(var, eff_var);
            hash_effect +=
                (new_value as i64 - old_value as i64) * hash_multipliers[var] as i64;
        }

        Self {
            cost,
            regression_preconditions,
            hash_effect,
        }
    }

    pub fn regression_preconditions(&self) -> &[(usize, usize)] {
        &self.regression_preconditions
    }

    #[cfg(test)]
    pub(crate) fn for_tests(preconditions: Vec<(usize, usize)>, cost: Cost) -> Self {
        let mut regression_preconditions = preconditions;
        regression_preconditions.sort_unstable();
        Self {
            cost,
            regression_preconditions,
            hash_effect: 0,
        }
    }
}

/// A pattern database: exhaustive goal distances of the task projected onto
/// a sorted, duplicate-free set of variables, built by regression Dijkstra
/// over a MatchTree index.
#[derive(Debug)]
pub struct PatternDatabaseHeuristic {
    task: Rc<Task>,
    pattern: Vec<usize>,
    hash_multipliers: Vec<usize>,
    num_states: usize,
    distances: Vec<Cost>,
}

impl PatternDatabaseHeuristic {
    pub fn new(
        task: Rc<Task>,
        pattern: Vec<usize>,
        max_states: usize,
    ) -> Result<Self, ConfigError> {
        verify_task_supported(&task)?;
        validate_pattern(&task, &pattern)?;

        let mut hash_multipliers = Vec::with_capacity(pattern.len());
        let mut num_states = 1usize;
        for &var in &pattern {
            hash_multipliers.push(num_states);
            num_states = num_states
                .checked_mul(task.variables[var].domain_size)
                .filter(|&size| size <= max_states)
                .ok_or_else(|| {
                    ConfigError::Invalid(format!(
                        "pattern {pattern:?} exceeds the size limit of {max_states} states"
                    ))
                })?;
        }

        let mut pdb = Self {
            task,
            pattern,
            hash_multipliers,
            num_states,
            distances: vec![],
        };
        pdb.compute_distances();
        debug!(
            pattern = ?pdb.pattern,
            num_states = pdb.num_states,
            "pattern database built"
        );
        Ok(pdb)
    }

    /// Default pattern: goal/causal-graph variable order until the size
    /// limit is hit.
    pub fn default_pattern(task: &Task, max_states: usize) -> Vec<usize> {
        let mut order = VariableOrderFinder::new(task, MergeStrategyName::GoalCgLevel, 0);
        let mut pattern = vec![];
        let mut num_states = 1usize;
        while let Some(var) = order.next_var() {
            match num_states
                .checked_mul(task.variables[var].domain_size)
                .filter(|&size| size <= max_states)
            {
                Some(size) => {
                    num_states = size;
                    pattern.push(var);
                }
                None => break,
            }
        }
        pattern.sort_unstable();
        pattern
    }

    pub fn pattern(&self) -> &[usize] {
        &self.pattern
    }

    /// Number of abstract states.
    pub fn size(&self) -> usize {
        self.num_states
    }

    pub fn hash_index(&self, state: &State) -> usize {
        self.pattern
            .iter()
            .zip(&self.hash_multipliers)
            .map(|(&var, &multiplier)| multiplier * state[var])
            .sum()
    }

    /// The goal distance of `state`'s projection, or `None` on a dead end.
    pub fn lookup(&self, state: &State) -> Option<Cost> {
        let distance = self.distances[self.hash_index(state)];
        (distance != INFINITY).then_some(distance)
    }

    fn compute_distances(&mut self) {
        // Project every concrete operator onto the pattern.
        let task = self.task.clone();
        let mut operators = vec![];
        for op in &task.operators {
            self.build_abstract_operators(op, &mut operators);
        }

        let domain_sizes: Vec<usize> = self
            .pattern
            .iter()
            .map(|&var| self.task.variables[var].domain_size)
            .collect();
        let mut match_tree = MatchTree::new(domain_sizes, self.hash_multipliers.clone());
        for (op_id, op) in operators.iter().enumerate() {
            match_tree.insert(op_id, op);
        }

        let abstract_goal: Vec<(usize, usize)> = self
            .task
            .goal
            .facts()
            .iter()
            .filter_map(|fact| {
                self.pattern
                    .iter()
                    .position(|&var| var == fact.var)
                    .map(|pattern_index| (pattern_index, fact.value))
            })
            .collect();

        // Backward Dijkstra from all abstract goal states.
        self.distances = vec![INFINITY; self.num_states];
        let mut queue: PriorityQueue<usize, Reverse<Cost>> = PriorityQueue::new();
        for state_index in 0..self.num_states {
            if self.is_goal_state(state_index, &abstract_goal) {
                self.distances[state_index] = 0;
                queue.push(state_index, Reverse(0));
            }
        }

        let mut applicable = vec![];
        while let Some((state_index, Reverse(distance))) = queue.pop() {
            if distance > self.distances[state_index] {
                continue;
            }
            applicable.clear();
            match_tree.applicable_operators(state_index, &mut applicable);
            for &op_id in &applicable {
                let op = &operators[op_id];
                let predecessor = (state_index as i64 + op.hash_effect) as usize;
                debug_assert!(predecessor < self.num_states);
                let alternative = self.distances[state_index] + op.cost;
                if alternative < self.distances[predecessor] {
                    self.distances[predecessor] = alternative;
                    queue.push_increase(predecessor, Reverse(alternative));
                }
            }
        }
    }

    fn build_abstract_operators(&self, op: &Operator, operators: &mut Vec<AbstractOperator>) {
        let pattern_index =
            |var: usize| self.pattern.iter().position(|&pattern_var| pattern_var == var);

        let mut prev_pairs = vec![];
        let mut pre_pairs = vec![];
        let mut eff_pairs = vec![];
        let mut effects_without_pre = vec![];
        for prevail in op.prevail() {
            if let Some(index) = pattern_index(prevail.var) {
                prev_pairs.push((index, prevail.value));
            }
        }
        for pre_post in op.pre_post() {
            let Some(index) = pattern_index(pre_post.var) else {
                continue;
            };
            match pre_post.pre {
                Some(pre) => {
                    pre_pairs.push((index, pre));
                    eff_pairs.push((index, pre_post.post));
                }
                None => effects_without_pre.push((index, pre_post.post)),
            }
        }

        // Effects without a precondition stand for one abstract operator
        // per possible source value.
        self.enumerate_free_effects(
            op.cost(),
            0,
            &effects_without_pre,
            &mut prev_pairs,
            &mut pre_pairs,
            &mut eff_pairs,
            operators,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn enumerate_free_effects(
        &self,
        cost: Cost,
        pos: usize,
        effects_without_pre: &[(usize, usize)],
        prev_pairs: &mut Vec<(usize, usize)>,
        pre_pairs: &mut Vec<(usize, usize)>,
        eff_pairs: &mut Vec<(usize, usize)>,
        operators: &mut Vec<AbstractOperator>,
    ) {
        if pos == effects_without_pre.len() {
            if !eff_pairs.is_empty() {
                operators.push(AbstractOperator::new(
                    prev_pairs,
                    pre_pairs,
                    eff_pairs,
                    cost,
                    &self.hash_multipliers,
                ));
            }
            return;
        }
        let (pattern_index, eff_value) = effects_without_pre[pos];
        let domain_size = self.task.variables[self.pattern[pattern_index]].domain_size;
        for value in 0..domain_size {
            if value == eff_value {
                prev_pairs.push((pattern_index, value));
            } else {
                pre_pairs.push((pattern_index, value));
                eff_pairs.push((pattern_index, eff_value));
            }
            self.enumerate_free_effects(
                cost,
                pos + 1,
                effects_without_pre,
                prev_pairs,
                pre_pairs,
                eff_pairs,
                operators,
            );
            if value == eff_value {
                prev_pairs.pop();
            } else {
                pre_pairs.pop();
                eff_pairs.pop();
            }
        }
    }

    fn is_goal_state(&self, state_index: usize, abstract_goal: &[(usize, usize)]) -> bool {
        abstract_goal.iter().all(|&(pattern_index, value)| {
            let domain_size = self.task.variables[self.pattern[pattern_index]].domain_size;
            state_index / self.hash_multipliers[pattern_index] % domain_size == value
        })
    }
}

impl Heuristic for PatternDatabaseHeuristic {
    fn evaluate(&mut self, state: &State) -> HeuristicValue {
        match self.lookup(state) {
            Some(distance) => HeuristicValue::Estimate(distance),
            None => HeuristicValue::DeadEnd,
        }
    }
}

fn verify_task_supported(task: &Task) -> Result<(), ConfigError> {
    if task.has_axioms() {
        return Err(ConfigError::AxiomsUnsupported { heuristic: "pdb" });
    }
    if task.has_conditional_effects() {
        return Err(ConfigError::ConditionalEffectsUnsupported { heuristic: "pdb" });
    }
    Ok(())
}

fn validate_pattern(task: &Task, pattern: &[usize]) -> Result<(), ConfigError> {
    if pattern.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(ConfigError::Invalid(format!(
            "pattern {pattern:?} must be sorted and free of duplicates"
        )));
    }
    if let Some(&last) = pattern.last() {
        if last >= task.variables.len() {
            return Err(ConfigError::Invalid(format!(
                "pattern variable {last} out of range (task has {} variables)",
                task.variables.len()
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn pdb(task: &Rc<Task>, pattern: &[usize]) -> PatternDatabaseHeuristic {
        PatternDatabaseHeuristic::new(task.clone(), pattern.to_vec(), 1_000_000).unwrap()
    }

    #[test]
    fn single_variable_projection() {
        let task = Rc::new(deadend_task());
        let mut pdb_a = pdb(&task, &[0]);
        // Projected onto a alone, the b prevail disappears.
        assert_eq!(
            pdb_a.evaluate(&task.initial_state()),
            HeuristicValue::Estimate(2)
        );
        assert_eq!(
            pdb_a.evaluate(&State::new(vec![1, 0])),
            HeuristicValue::Estimate(1)
        );
        // The projection cannot see the dead end.
        assert_eq!(
            pdb_a.evaluate(&State::new(vec![0, 1])),
            HeuristicValue::Estimate(2)
        );
    }

    #[test]
    fn two_variable_projection_sees_the_dead_end() {
        let task = Rc::new(deadend_task());
        let mut pdb_ab = pdb(&task, &[0, 1]);
        assert_eq!(
            pdb_ab.evaluate(&task.initial_state()),
            HeuristicValue::Estimate(2)
        );
        // With b in the pattern, b=1 states that still need a-moves are
        // recognized as dead ends.
        assert_eq!(pdb_ab.evaluate(&State::new(vec![0, 1])), HeuristicValue::DeadEnd);
        assert_eq!(pdb_ab.evaluate(&State::new(vec![1, 1])), HeuristicValue::DeadEnd);
        // The goal value of a is fine regardless of b.
        assert_eq!(
            pdb_ab.evaluate(&State::new(vec![2, 1])),
            HeuristicValue::Estimate(0)
        );
    }

    #[test]
    fn costs_are_respected() {
        let task = Rc::new(weighted_task());
        let mut pdb_a = pdb(&task, &[0]);
        // Two cheap steps beat the direct cost-5 operator.
        assert_eq!(
            pdb_a.evaluate(&task.initial_state()),
            HeuristicValue::Estimate(2)
        );
    }

    #[test]
    fn admissibility_and_consistency_on_full_pattern() {
        // With the full variable set the PDB is the exact goal distance;
        // check consistency h(s) <= c(o) + h(apply(o, s)) everywhere.
        let task = Rc::new(deadend_task());
        let mut full = pdb(&task, &[0, 1]);
        for a in 0..3 {
            for b in 0..2 {
                let state = State::new(vec![a, b]);
                let h = full.evaluate(&state);
                for op_id in 0..task.operators.len() {
                    if !task.operators[op_id].is_applicable(&state) {
                        continue;
                    }
                    let successor = task.successor(&state, op_id);
                    let h_succ = full.evaluate(&successor);
                    match (h, h_succ) {
                        (HeuristicValue::Estimate(h), HeuristicValue::Estimate(h_succ)) => {
                            assert!(h <= task.operators[op_id].cost() + h_succ);
                        }
                        (HeuristicValue::Estimate(_), HeuristicValue::DeadEnd) => {}
                        (HeuristicValue::DeadEnd, _) => {
                            panic!("successor of a dead end should not exist")
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn invalid_patterns_are_rejected() {
        let task = Rc::new(deadend_task());
        assert!(PatternDatabaseHeuristic::new(task.clone(), vec![1, 0], 1000).is_err());
        assert!(PatternDatabaseHeuristic::new(task.clone(), vec![0, 0], 1000).is_err());
        assert!(PatternDatabaseHeuristic::new(task.clone(), vec![7], 1000).is_err());
        assert!(PatternDatabaseHeuristic::new(task.clone(), vec![0, 1], 2).is_err());
    }
}
