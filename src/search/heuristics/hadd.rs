use crate::search::{
    clamped_add,
    heuristics::{
        relaxation::{PropId, RelaxationCore, UnaryOpId, UNREACHED},
        Heuristic, HeuristicValue,
    },
    states::State,
    Cost, Fact, OperatorId, Task,
};
use std::rc::Rc;
use tracing::info;

/// HSP additive heuristic: like h_max but effects cost the *sum* of their
/// precondition costs. Not admissible; computes preferred operators by
/// backchaining through the best achievers.
#[derive(Debug)]
pub struct HaddHeuristic {
    core: RelaxationCore,
    /// Bucket queue indexed by cost; cheap because costs grow slowly.
    buckets: Vec<Vec<PropId>>,
    preferred: Vec<OperatorId>,
    preferred_marks: Vec<bool>,
}

impl HaddHeuristic {
    pub fn new(task: Rc<Task>) -> Self {
        info!("initializing HSP additive heuristic");
        let num_operators = task.operators.len();
        Self {
            core: RelaxationCore::new(task),
            buckets: vec![],
            preferred: vec![],
            preferred_marks: vec![false; num_operators],
        }
    }

    fn enqueue_if_necessary(&mut self, prop: PropId, cost: Cost, reached_by: Option<UnaryOpId>) {
        debug_assert!(cost >= 0);
        let proposition = &mut self.core.propositions[prop];
        if proposition.cost == UNREACHED || proposition.cost > cost {
            proposition.cost = cost;
            proposition.reached_by = reached_by;
            let bucket = cost as usize;
            if bucket >= self.buckets.len() {
                self.buckets.resize(bucket + 1, vec![]);
            }
            self.buckets[bucket].push(prop);
        }
    }

    fn setup_exploration_queue(&mut self, state: &State) {
        self.buckets.clear();
        self.core.reset();

        for unary_no in 0..self.core.unary_operators.len() {
            let unary = &self.core.unary_operators[unary_no];
            if unary.unsatisfied_preconditions == 0 {
                let (effect, cost) = (unary.effect, unary.base_cost);
                self.enqueue_if_necessary(effect, cost, Some(unary_no));
            }
        }
        for var in 0..state.len() {
            let prop = self.core.prop_id(Fact::new(var, state[var]));
            self.enqueue_if_necessary(prop, 0, None);
        }
    }

    fn relaxed_exploration(&mut self) {
        let mut unsolved_goals = self.core.goal_propositions.len();
        let mut distance = 0;
        while distance < self.buckets.len() {
            let Some(prop) = self.buckets[distance].pop() else {
                distance += 1;
                continue;
            };
            let prop_cost = self.core.propositions[prop].cost;
            debug_assert!(prop_cost <= distance as Cost);
            if prop_cost < distance as Cost {
                continue;
            }
            if self.core.propositions[prop].is_goal {
                unsolved_goals -= 1;
                if unsolved_goals == 0 {
                    return;
                }
            }
            for i in 0..self.core.propositions[prop].precondition_of.len() {
                let unary_no = self.core.propositions[prop].precondition_of[i];
                let unary = &mut self.core.unary_operators[unary_no];
                unary.unsatisfied_preconditions -= 1;
                unary.cost = clamped_add(unary.cost, prop_cost);
                if unary.unsatisfied_preconditions == 0 {
                    let (effect, cost) = (unary.effect, unary.cost);
                    self.enqueue_if_necessary(effect, cost, Some(unary_no));
                }
            }
        }
    }

    /// Walks the `reached_by` chains back from the goal propositions,
    /// marking as preferred every achiever that may be applicable in the
    /// evaluated state.
    fn mark_preferred_operators(&mut self) {
        self.preferred.clear();
        for mark in &mut self.preferred_marks {
            *mark = false;
        }
        let mut stack: Vec<PropId> = self.core.goal_propositions.clone();
        while let Some(prop) = stack.pop() {
            if self.core.propositions[prop].marked {
                continue;
            }
            self.core.propositions[prop].marked = true;
            let Some(unary_no) = self.core.propositions[prop].reached_by else {
                continue;
            };
            let unary = &self.core.unary_operators[unary_no];
            stack.extend_from_slice(&unary.preconditions);
            if unary.cost == unary.base_cost {
                // All preconditions were free, so the achiever may be
                // applicable right now (not a sure-fire test with zero-cost
                // actions).
                if let Some(op) = unary.operator {
                    if !self.preferred_marks[op] {
                        self.preferred_marks[op] = true;
                        self.preferred.push(op);
                    }
                }
            }
        }
    }
}

impl Heuristic for HaddHeuristic {
    fn evaluate(&mut self, state: &State) -> HeuristicValue {
        self.setup_exploration_queue(state);
        self.relaxed_exploration();

        let mut total_cost = 0;
        for &goal in &self.core.goal_propositions {
            let prop_cost = self.core.propositions[goal].cost;
            if prop_cost == UNREACHED {
                self.preferred.clear();
                return HeuristicValue::DeadEnd;
            }
            total_cost = clamped_add(total_cost, prop_cost);
        }

        self.mark_preferred_operators();
        HeuristicValue::Estimate(total_cost)
    }

    fn preferred_operators(&self) -> &[OperatorId] {
        &self.preferred
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn independent_goals_sum_up() {
        let task = Rc::new(reachability_task());
        let mut hadd = HaddHeuristic::new(task.clone());
        assert_eq!(
            hadd.evaluate(&task.initial_state()),
            HeuristicValue::Estimate(2)
        );
        // Both operators achieve a goal directly from the initial state.
        let mut preferred = hadd.preferred_operators().to_vec();
        preferred.sort_unstable();
        assert_eq!(preferred, vec![0, 1]);
    }

    #[test]
    fn chain_costs_accumulate() {
        let task = Rc::new(cea_task());
        let mut hadd = HaddHeuristic::new(task.clone());
        // o1 (a to 1), o3 (b to 1), o2 (a to 2): three unit-cost steps.
        assert_eq!(
            hadd.evaluate(&task.initial_state()),
            HeuristicValue::Estimate(3)
        );
        // Only the immediately applicable first steps are preferred.
        let mut preferred = hadd.preferred_operators().to_vec();
        preferred.sort_unstable();
        assert_eq!(preferred, vec![0, 2]);
    }

    #[test]
    fn truck_task_value_and_helpful_actions() {
        let task = Rc::new(truck_task());
        let mut hadd = HaddHeuristic::new(task.clone());
        // 3 per package: load (1), drive (1), unload on top of both.
        assert_eq!(
            hadd.evaluate(&task.initial_state()),
            HeuristicValue::Estimate(6)
        );
        let mut preferred = hadd.preferred_operators().to_vec();
        preferred.sort_unstable();
        // Both loads and the drive are achievable right now.
        assert_eq!(preferred, vec![0, 2, 4]);
    }

    #[test]
    fn dead_end_clears_preferred_operators() {
        let task = Rc::new(deadend_task());
        let mut hadd = HaddHeuristic::new(task.clone());
        assert_eq!(
            hadd.evaluate(&State::new(vec![0, 1])),
            HeuristicValue::DeadEnd
        );
        assert!(hadd.preferred_operators().is_empty());
    }
}
