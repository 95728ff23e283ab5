use crate::search::{
    heuristics::{ConfigError, EvaluatorOptions, HeuristicName},
    search_engines::{BestFirstSearchEngine, IterativeSearchEngine, SearchStatistics},
    Plan, Task,
};
use std::rc::Rc;

/// Outcome of one engine step. Engines must return promptly so the
/// scheduler can check its clock between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    InProgress,
    Solved,
    Failed,
}

/// A search engine driven step-by-step by the scheduler.
pub trait SearchEngine: std::fmt::Debug {
    fn initialize(&mut self) {}

    fn step(&mut self) -> SearchStatus;

    fn found_solution(&self) -> bool;

    /// The plan found; only valid after a `Solved` step.
    fn plan(&self) -> &Plan;

    fn statistics(&self) -> &SearchStatistics;
}

#[derive(clap::ValueEnum, strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[clap(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum SearchEngineName {
    #[default]
    #[clap(help = "Greedy best-first search with preferred-operator open lists")]
    Bfs,
    #[clap(help = "Goal-by-goal iterative-deepening uniform-cost search")]
    Iterative,
}

impl SearchEngineName {
    pub fn create(
        &self,
        task: Rc<Task>,
        heuristic: HeuristicName,
        secondary: Option<HeuristicName>,
        options: &EvaluatorOptions,
        memory_limit_mb: usize,
    ) -> Result<Box<dyn SearchEngine>, ConfigError> {
        match self {
            SearchEngineName::Bfs => {
                let primary = heuristic.create(task.clone(), options)?;
                let secondary = secondary
                    .map(|name| name.create(task.clone(), options))
                    .transpose()?;
                Ok(Box::new(BestFirstSearchEngine::new(task, primary, secondary)))
            }
            SearchEngineName::Iterative => {
                Ok(Box::new(IterativeSearchEngine::new(task, memory_limit_mb)))
            }
        }
    }
}
