use crate::search::{
    clamped_add,
    heuristics::{
        relaxation::{PropId, RelaxationCore, UnaryOpId, UNREACHED},
        Heuristic, HeuristicValue,
    },
    states::State,
    Cost, Fact, OperatorId, Task,
};
use priority_queue::PriorityQueue;
use std::cmp::Reverse;
use std::collections::HashSet;
use std::rc::Rc;
use tracing::info;

/// FF heuristic: h_add-style exploration followed by relaxed-plan
/// extraction. The heuristic value is the number of distinct achievers in
/// the extracted plan; achievers applicable in the evaluated state are the
/// preferred operators (helpful actions).
///
/// The historical exploration pops propositions from a FIFO queue and never
/// re-expands them, so some intermediate h_add values can end up too high.
/// This is a documented approximation, kept as the default; `exact_queue`
/// switches to a Dijkstra frontier.
pub struct HffHeuristic {
    core: RelaxationCore,
    exact_queue: bool,
    fifo: Vec<PropId>,
    dijkstra: PriorityQueue<PropId, Reverse<Cost>>,
    preferred: Vec<OperatorId>,
    preferred_marks: Vec<bool>,
}

impl std::fmt::Debug for HffHeuristic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HffHeuristic")
            .field("core", &self.core)
            .field("exact_queue", &self.exact_queue)
            .finish_non_exhaustive()
    }
}

impl HffHeuristic {
    pub fn new(task: Rc<Task>, exact_queue: bool) -> Self {
        info!(exact_queue, "initializing FF heuristic");
        let num_operators = task.operators.len();
        Self {
            core: RelaxationCore::new(task),
            exact_queue,
            fifo: vec![],
            dijkstra: PriorityQueue::new(),
            preferred: vec![],
            preferred_marks: vec![false; num_operators],
        }
    }

    fn enqueue_if_necessary(&mut self, prop: PropId, cost: Cost, reached_by: Option<UnaryOpId>) {
        let proposition = &mut self.core.propositions[prop];
        if proposition.cost == UNREACHED {
            proposition.cost = cost;
            proposition.reached_by = reached_by;
            if self.exact_queue {
                self.dijkstra.push_increase(prop, Reverse(cost));
            } else {
                self.fifo.push(prop);
            }
        } else if proposition.cost > cost {
            // Improve the stored value; in FIFO mode the proposition is not
            // requeued, which is exactly the historical approximation.
            proposition.cost = cost;
            proposition.reached_by = reached_by;
            if self.exact_queue {
                self.dijkstra.push_increase(prop, Reverse(cost));
            }
        }
    }

    fn setup_exploration_queue(&mut self, state: &State) {
        self.fifo.clear();
        self.dijkstra.clear();
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
            // State facts override anything cheaper-than-free.
            let proposition = &mut self.core.propositions[prop];
            if proposition.cost == UNREACHED {
                if self.exact_queue {
                    self.dijkstra.push_increase(prop, Reverse(0));
                } else {
                    self.fifo.push(prop);
                }
            } else if self.exact_queue {
                self.dijkstra.push_increase(prop, Reverse(0));
            }
            proposition.cost = 0;
            proposition.reached_by = None;
        }
    }

    fn pop_next(&mut self, read_pos: &mut usize) -> Option<PropId> {
        if self.exact_queue {
            while let Some((prop, Reverse(distance))) = self.dijkstra.pop() {
                if self.core.propositions[prop].cost < distance {
                    continue;
                }
                return Some(prop);
            }
            None
        } else {
            let prop = self.fifo.get(*read_pos).copied();
            *read_pos += 1;
            prop
        }
    }

    fn relaxed_exploration(&mut self) {
        let mut unsolved_goals = self.core.goal_propositions.len();
        let mut read_pos = 0;
        while let Some(prop) = self.pop_next(&mut read_pos) {
            let prop_cost = self.core.propositions[prop].cost;
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

    /// Extracts the relaxed plan by backchaining and returns its size.
    /// Achievers whose cost equals their base cost are helpful actions.
    fn extract_relaxed_plan(&mut self) -> Cost {
        self.preferred.clear();
        for mark in &mut self.preferred_marks {
            *mark = false;
        }
        // Axioms participate in the extracted set but are never preferred.
        let mut relaxed_plan: HashSet<(bool, usize)> = HashSet::new();
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
            let plan_key = match unary.operator {
                Some(op) => (false, op),
                None => (true, unary_no),
            };
            let newly_added = relaxed_plan.insert(plan_key);
            if newly_added && unary.cost == unary.base_cost {
                if let Some(op) = unary.operator {
                    if !self.preferred_marks[op] {
                        self.preferred_marks[op] = true;
                        self.preferred.push(op);
                    }
                }
            }
        }
        relaxed_plan.len() as Cost
    }
}

impl Heuristic for HffHeuristic {
    fn evaluate(&mut self, state: &State) -> HeuristicValue {
        self.setup_exploration_queue(state);
        self.relaxed_exploration();

        for &goal in &self.core.goal_propositions {
            if self.core.propositions[goal].cost == UNREACHED {
                self.preferred.clear();
                return HeuristicValue::DeadEnd;
            }
        }
        HeuristicValue::Estimate(self.extract_relaxed_plan())
    }

    fn preferred_operators(&self) -> &[OperatorId] {
        &self.preferred
    }
}
