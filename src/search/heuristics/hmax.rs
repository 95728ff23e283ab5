use crate::search::{
    heuristics::{
        relaxation::{PropId, RelaxationCore, UNREACHED},
        Heuristic, HeuristicValue,
    },
    states::State,
    Cost, Fact, Task,
};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::rc::Rc;
use tracing::info;

/// HSP max heuristic: delete-relaxation Dijkstra where an operator's effect
/// costs its base cost plus the most expensive precondition. Admissible.
pub struct HmaxHeuristic {
    core: RelaxationCore,
    queue: PriorityQueue<PropId, Reverse<Cost>>,
}

impl std::fmt::Debug for HmaxHeuristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HmaxHeuristic")
            .field("core", &self.core)
            .finish_non_exhaustive()
    }
}

impl HmaxHeuristic {
    pub fn new(task: Rc<Task>) -> Self {
        info!("initializing HSP max heuristic");
        Self {
            core: RelaxationCore::new(task),
            queue: PriorityQueue::new(),
        }
    }

    fn setup_exploration_queue(&mut self, state: &State) {
        self.queue.clear();
        self.core.reset();

        // Operators and axioms without preconditions fire immediately.
        for unary_no in 0..self.core.unary_operators.len() {
            let unary = &self.core.unary_operators[unary_no];
            if unary.unsatisfied_preconditions == 0 {
                self.enqueue_if_necessary(unary.effect, unary.base_cost);
            }
        }
        for var in 0..state.len() {
            let prop = self.core.prop_id(Fact::new(var, state[var]));
            self.enqueue_if_necessary(prop, 0);
        }
    }

    fn enqueue_if_necessary(&mut self, prop: PropId, cost: Cost) {
        debug_assert!(cost >= 0);
        let stored = &mut self.core.propositions[prop].cost;
        if *stored == UNREACHED || *stored > cost {
            *stored = cost;
            self.queue.push_increase(prop, Reverse(cost));
        }
    }

    fn relaxed_exploration(&mut self) {
        let mut unsolved_goals = self.core.goal_propositions.len();
        while let Some((prop, Reverse(distance))) = self.queue.pop() {
            let prop_cost = self.core.propositions[prop].cost;
            debug_assert!(prop_cost <= distance);
            if prop_cost < distance {
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
                unary.cost = unary.cost.max(crate::search::clamped_add(
                    unary.base_cost,
                    prop_cost,
                ));
                if unary.unsatisfied_preconditions == 0 {
                    let (effect, cost) = (unary.effect, unary.cost);
                    self.enqueue_if_necessary(effect, cost);
                }
            }
        }
    }
}

impl Heuristic for HmaxHeuristic {
    fn evaluate(&mut self, state: &State) -> HeuristicValue {
        self.setup_exploration_queue(state);
        self.relaxed_exploration();

        let mut total_cost = 0;
        for &goal in &self.core.goal_propositions {
            let prop_cost = self.core.propositions[goal].cost;
            if prop_cost == UNREACHED {
                return HeuristicValue::DeadEnd;
            }
            total_cost = total_cost.max(prop_cost);
        }
        HeuristicValue::Estimate(total_cost)
    }
}
