use crate::search::{
    search_engines::{OpenList, SearchEngine, SearchSpace, SearchStatistics, SearchStatus},
    states::{State, StateId, NO_STATE},
    Cost, Fact, OperatorId, Plan, Task,
};
use crate::search::successor_generators::SuccessorGenerator;
use std::rc::Rc;
use tracing::{debug, info};

/// Distance table over the variable dependency graph: for each goal, how
/// far upstream each variable sits. Arcs run from an effect variable to the
/// variables its operators condition on.
#[derive(Debug)]
struct GoalDistances {
    /// `distances[goal_index][var]`; `unreachable` encodes no connection.
    distances: Vec<Vec<usize>>,
    unreachable: usize,
    diameter: usize,
}

impl GoalDistances {
    fn compute(task: &Task) -> Self {
        let var_count = task.variables.len();
        let mut successors: Vec<Vec<usize>> = vec![vec![]; var_count];
        {
            let mut seen: Vec<Vec<bool>> = vec![vec![false; var_count]; var_count];
            for op in task.operators.iter().chain(task.axioms.iter()) {
                let prevail_vars: Vec<usize> =
                    op.prevail().iter().map(|prevail| prevail.var).collect();
                let pre_vars: Vec<usize> = op
                    .pre_post()
                    .iter()
                    .filter(|pre_post| pre_post.pre.is_some())
                    .map(|pre_post| pre_post.var)
                    .collect();
                for pre_post in op.pre_post() {
                    let effect_var = pre_post.var;
                    // Each effect depends on the prevails, its own effect
                    // conditions, and the other effects' preconditions;
                    // conditions of sibling effects do not count.
                    let condition_vars = prevail_vars
                        .iter()
                        .chain(pre_post.conditions.iter().map(|cond| &cond.var))
                        .chain(pre_vars.iter());
                    for &condition_var in condition_vars {
                        if condition_var != effect_var && !seen[effect_var][condition_var] {
                            seen[effect_var][condition_var] = true;
                            successors[effect_var].push(condition_var);
                        }
                    }
                }
            }
        }

        let unreachable = var_count;
        let mut distances = Vec::with_capacity(task.goal.len());
        let mut diameter = 0;
        for fact in task.goal.facts() {
            let mut distance = vec![unreachable; var_count];
            let mut queue = std::collections::VecDeque::from([fact.var]);
            distance[fact.var] = 0;
            while let Some(var) = queue.pop_front() {
                for &next in &successors[var] {
                    if distance[next] == unreachable {
                        distance[next] = distance[var] + 1;
                        queue.push_back(next);
                    }
                }
            }
            for &d in &distance {
                if d != unreachable {
                    diameter = diameter.max(d);
                }
            }
            distances.push(distance);
        }

        Self {
            distances,
            unreachable,
            diameter,
        }
    }

    /// Weight of an operator for a goal: the distance of its most
    /// goal-relevant effect variable.
    fn action_cost(&self, task: &Task, op: OperatorId, goal_index: usize) -> usize {
        let distances = &self.distances[goal_index];
        task.operators[op]
            .pre_post()
            .iter()
            .map(|pre_post| distances[pre_post.var])
            .min()
            .unwrap_or(self.unreachable)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubSearchStatus {
    InProgress,
    Solved,
    Failed,
}

/// Iterative-deepening uniform-cost search for one additional goal, with
/// action costs weighted by causal-graph distance to that goal. The
/// `may_undo_goal` flag widens the final layer by permitting previously
/// solved goals to be temporarily violated.
#[derive(Debug)]
struct UniformCostSearcher {
    new_goal_index: usize,
    /// The new goal first, then the previously solved goals.
    goals: Vec<Fact>,
    may_undo_goal: bool,
    cost_limit: usize,
    path_cost: Cost,
    search_space: SearchSpace,
    open: OpenList<(StateId, OperatorId)>,
    initial_state: State,
    current_state: State,
    current_id: StateId,
    predecessor: StateId,
    current_operator: Option<OperatorId>,
}

impl UniformCostSearcher {
    fn new(
        task: &Task,
        initial_state: State,
        solved_goals: &[bool],
        new_goal_index: usize,
    ) -> Self {
        debug_assert!(!solved_goals[new_goal_index]);
        let mut goals = vec![task.goal.facts()[new_goal_index]];
        for (index, fact) in task.goal.facts().iter().enumerate() {
            if solved_goals[index] {
                goals.push(*fact);
            }
        }
        Self {
            new_goal_index,
            goals,
            may_undo_goal: false,
            cost_limit: 0,
            path_cost: 0,
            search_space: SearchSpace::new(task),
            open: OpenList::new(),
            current_state: initial_state.clone(),
            initial_state,
            current_id: NO_STATE,
            predecessor: NO_STATE,
            current_operator: None,
        }
    }

    fn step(
        &mut self,
        task: &Task,
        generator: &SuccessorGenerator,
        goal_distances: &GoalDistances,
        statistics: &mut SearchStatistics,
        closed_states: &mut usize,
    ) -> SubSearchStatus {
        let current_id = self.search_space.register(&self.current_state);
        self.current_id = current_id;
        if !self.search_space.is_closed(current_id) {
            self.search_space
                .close(current_id, self.predecessor, self.current_operator);
            statistics.increment_expanded();
            *closed_states += 1;

            let solved_old_goals = self.goals[1..]
                .iter()
                .all(|fact| self.current_state[fact.var] == fact.value);

            if solved_old_goals || self.may_undo_goal {
                let new_goal = self.goals[0];
                if solved_old_goals && self.current_state[new_goal.var] == new_goal.value {
                    return SubSearchStatus::Solved;
                }

                let applicable = generator.applicable_operators(&self.current_state);
                statistics.increment_generated(applicable.len());
                for op in applicable {
                    let action_cost =
                        goal_distances.action_cost(task, op, self.new_goal_index);
                    if action_cost <= self.cost_limit {
                        self.open.insert(
                            self.path_cost + action_cost as Cost,
                            (current_id, op),
                        );
                    }
                }
            }
        }

        if self.open.is_empty() {
            // Layer exhausted: deepen the cost limit, or widen by allowing
            // solved goals to break, then restart.
            if self.cost_limit >= goal_distances.diameter {
                if self.may_undo_goal {
                    return SubSearchStatus::Failed;
                }
                self.may_undo_goal = true;
                self.cost_limit = 0;
            } else {
                self.cost_limit += 1;
            }
            debug!(
                goal = self.new_goal_index,
                cost_limit = self.cost_limit,
                may_undo = self.may_undo_goal,
                "deepening"
            );
            *closed_states = closed_states.saturating_sub(self.search_space.num_closed());
            self.search_space.clear_closed();
            self.open.clear();
            self.path_cost = 0;
            self.predecessor = NO_STATE;
            self.current_operator = None;
            self.current_state = self.initial_state.clone();
        } else {
            self.path_cost = self.open.min();
            let (parent_id, op) = self.open.remove_min();
            let parent_state = self.search_space.state(parent_id);
            self.current_state = task.successor(&parent_state, op);
            self.predecessor = parent_id;
            self.current_operator = Some(op);
        }
        SubSearchStatus::InProgress
    }

    fn extract_plan_into(&self, plan: &mut Plan) {
        debug_assert!(self.current_id != NO_STATE);
        plan.extend(self.search_space.extract_plan(self.current_id));
    }
}

/// Solves the goals one at a time: one sub-searcher per unsolved goal runs
/// in lock step, and the first to succeed fixes its goal and re-seeds the
/// rest from the reached state.
pub struct IterativeSearchEngine {
    task: Rc<Task>,
    generator: SuccessorGenerator,
    goal_distances: GoalDistances,
    searchers: Vec<UniformCostSearcher>,
    solved_goals: Vec<bool>,
    num_goals_solved: usize,
    current_state: State,
    closed_states: usize,
    closed_states_limit: usize,
    statistics: SearchStatistics,
    plan: Plan,
    solution_found: bool,
}

impl std::fmt::Debug for IterativeSearchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IterativeSearchEngine")
            .field("num_goals_solved", &self.num_goals_solved)
            .field("statistics", &self.statistics)
            .finish_non_exhaustive()
    }
}

impl IterativeSearchEngine {
    pub fn new(task: Rc<Task>, memory_limit_mb: usize) -> Self {
        let state_size = std::mem::size_of::<usize>() * task.variables.len().max(1);
        let closed_states_limit = memory_limit_mb
            .saturating_mul(1024 * 1024)
            .checked_div(state_size)
            .unwrap_or(usize::MAX);
        let generator = SuccessorGenerator::from_task(&task);
        let goal_distances = GoalDistances::compute(&task);
        let current_state = task.initial_state();
        Self {
            task,
            generator,
            goal_distances,
            searchers: vec![],
            solved_goals: vec![],
            num_goals_solved: 0,
            current_state,
            closed_states: 0,
            closed_states_limit,
            statistics: SearchStatistics::new(),
            plan: Plan::empty(),
            solution_found: false,
        }
    }

    fn initialize_searchers(&mut self) {
        self.searchers.clear();
        for goal_index in 0..self.task.goal.len() {
            if !self.solved_goals[goal_index] {
                self.searchers.push(UniformCostSearcher::new(
                    &self.task,
                    self.current_state.clone(),
                    &self.solved_goals,
                    goal_index,
                ));
            }
        }
        info!(
            goal = self.num_goals_solved + 1,
            of = self.task.goal.len(),
            "adding goal"
        );
        self.closed_states = 0;
    }
}

impl SearchEngine for IterativeSearchEngine {
    fn initialize(&mut self) {
        info!("conducting iterated goal-by-goal search");
        self.solved_goals = vec![false; self.task.goal.len()];
        self.num_goals_solved = 0;
        if self.task.goal.is_empty() {
            self.solution_found = true;
            return;
        }
        self.initialize_searchers();
    }

    fn step(&mut self) -> SearchStatus {
        if self.solution_found {
            return SearchStatus::Solved;
        }

        let mut searcher_index = 0;
        while searcher_index < self.searchers.len() {
            let status = self.searchers[searcher_index].step(
                &self.task,
                &self.generator,
                &self.goal_distances,
                &mut self.statistics,
                &mut self.closed_states,
            );
            match status {
                SubSearchStatus::InProgress => searcher_index += 1,
                SubSearchStatus::Failed => {
                    self.searchers.remove(searcher_index);
                    if self.searchers.is_empty() {
                        info!("all goal searchers failed");
                        return SearchStatus::Failed;
                    }
                }
                SubSearchStatus::Solved => {
                    let searcher = &self.searchers[searcher_index];
                    info!(
                        goal = searcher.new_goal_index,
                        expanded = self.statistics.expanded_states,
                        "goal solved"
                    );
                    self.solved_goals[searcher.new_goal_index] = true;
                    self.current_state = searcher.current_state.clone();
                    let mut plan = std::mem::replace(&mut self.plan, Plan::empty());
                    searcher.extract_plan_into(&mut plan);
                    self.plan = plan;
                    self.num_goals_solved += 1;
                    if self.num_goals_solved == self.task.goal.len() {
                        self.solution_found = true;
                        info!("solution found");
                        return SearchStatus::Solved;
                    }
                    self.initialize_searchers();
                    return SearchStatus::InProgress;
                }
            }
        }

        if self.closed_states > self.closed_states_limit {
            info!("exceeded closed-state memory limit");
            return SearchStatus::Failed;
        }
        SearchStatus::InProgress
    }

    fn found_solution(&self) -> bool {
        self.solution_found
    }

    fn plan(&self) -> &Plan {
        debug_assert!(self.solution_found);
        &self.plan
    }

    fn statistics(&self) -> &SearchStatistics {
        &self.statistics
    }
}
