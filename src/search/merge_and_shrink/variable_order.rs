use crate::search::{graphs::CausalGraph, Task};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};

/// Linear merge orders. "Level" is the variable numbering produced by the
/// translator, which sorts variables causally.
#[derive(clap::ValueEnum, strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[clap(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum MergeStrategyName {
    #[default]
    #[clap(help = "Causally connected variables first, then goals, by level")]
    CgGoalLevel,
    #[clap(help = "Causally connected variables first, then goals, random tie-break")]
    CgGoalRandom,
    #[clap(help = "Goal variables first, then causally connected, by level")]
    GoalCgLevel,
    #[clap(help = "Uniformly random order")]
    Random,
    #[clap(help = "Level order")]
    Level,
    #[clap(help = "Reverse level order")]
    ReverseLevel,
}

/// Produces the linear variable order for merging, one variable at a time.
#[derive(Debug)]
pub struct VariableOrderFinder {
    strategy: MergeStrategyName,
    causal_graph: CausalGraph,
    is_goal_variable: Vec<bool>,
    selected_vars: Vec<usize>,
    remaining_vars: Vec<usize>,
}

impl VariableOrderFinder {
    pub fn new(task: &Task, strategy: MergeStrategyName, seed: u64) -> Self {
        let var_count = task.variables.len();
        let mut remaining_vars: Vec<usize> = match strategy {
            MergeStrategyName::ReverseLevel => (0..var_count).rev().collect(),
            _ => (0..var_count).collect(),
        };
        if matches!(
            strategy,
            MergeStrategyName::CgGoalRandom | MergeStrategyName::Random
        ) {
            let mut rng = SmallRng::seed_from_u64(seed);
            remaining_vars.shuffle(&mut rng);
        }
        let mut is_goal_variable = vec![false; var_count];
        for fact in task.goal.facts() {
            is_goal_variable[fact.var] = true;
        }
        Self {
            strategy,
            causal_graph: CausalGraph::from_task(task),
            is_goal_variable,
            selected_vars: vec![],
            remaining_vars,
        }
    }

    pub fn done(&self) -> bool {
        self.remaining_vars.is_empty()
    }

    fn is_causally_connected(&self, var: usize) -> bool {
        self.selected_vars
            .iter()
            .any(|&selected| self.causal_graph.are_connected(selected, var))
    }

    fn select(&mut self, position: usize) -> usize {
        let var = self.remaining_vars.remove(position);
        self.selected_vars.push(var);
        var
    }

    /// The next variable to merge, or `None` when all are consumed.
    pub fn next_var(&mut self) -> Option<usize> {
        if self.remaining_vars.is_empty() {
            return None;
        }
        match self.strategy {
            MergeStrategyName::CgGoalLevel | MergeStrategyName::CgGoalRandom => {
                // Prefer variables causally connected to the selection,
                // then goal variables.
                if !self.selected_vars.is_empty() {
                    if let Some(position) = (0..self.remaining_vars.len())
                        .find(|&i| self.is_causally_connected(self.remaining_vars[i]))
                    {
                        return Some(self.select(position));
                    }
                }
                if let Some(position) = (0..self.remaining_vars.len())
                    .find(|&i| self.is_goal_variable[self.remaining_vars[i]])
                {
                    return Some(self.select(position));
                }
            }
            MergeStrategyName::GoalCgLevel => {
                // Prefer goal variables, then causally connected ones.
                if let Some(position) = (0..self.remaining_vars.len())
                    .find(|&i| self.is_goal_variable[self.remaining_vars[i]])
                {
                    return Some(self.select(position));
                }
                if !self.selected_vars.is_empty() {
                    if let Some(position) = (0..self.remaining_vars.len())
                        .find(|&i| self.is_causally_connected(self.remaining_vars[i]))
                    {
                        return Some(self.select(position));
                    }
                }
            }
            MergeStrategyName::Random
            | MergeStrategyName::Level
            | MergeStrategyName::ReverseLevel => {}
        }
        Some(self.select(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn full_order(task: &Task, strategy: MergeStrategyName) -> Vec<usize> {
        let mut finder = VariableOrderFinder::new(task, strategy, 2011);
        let mut order = vec![];
        while let Some(var) = finder.next_var() {
            order.push(var);
        }
        order
    }

    #[test]
    fn level_orders() {
        let task = cea_task();
        assert_eq!(full_order(&task, MergeStrategyName::Level), vec![0, 1]);
        assert_eq!(
            full_order(&task, MergeStrategyName::ReverseLevel),
            vec![1, 0]
        );
    }

    #[test]
    fn goal_first_then_connected() {
        // Goal variable is a (0); b is causally connected to it.
        let task = cea_task();
        assert_eq!(
            full_order(&task, MergeStrategyName::GoalCgLevel),
            vec![0, 1]
        );
        assert_eq!(
            full_order(&task, MergeStrategyName::CgGoalLevel),
            vec![0, 1]
        );
    }

    #[test]
    fn every_variable_appears_exactly_once() {
        let task = chains_task();
        for strategy in [
            MergeStrategyName::CgGoalLevel,
            MergeStrategyName::CgGoalRandom,
            MergeStrategyName::GoalCgLevel,
            MergeStrategyName::Random,
            MergeStrategyName::Level,
            MergeStrategyName::ReverseLevel,
        ] {
            let mut order = full_order(&task, strategy);
            order.sort_unstable();
            assert_eq!(order, vec![0, 1]);
        }
    }
}
