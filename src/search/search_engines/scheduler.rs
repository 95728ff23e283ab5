use crate::search::{
    search_engines::{SearchEngine, SearchStatistics, SearchStatus},
    Plan,
};
use memory_stats::memory_stats;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// How many steps pass between wall-clock and memory checks.
const CHECK_INTERVAL: u32 = 256;

/// Emergency headroom held per live engine, released right before the
/// engine is torn down on memory exhaustion.
const EMERGENCY_BUFFER_BYTES: usize = 4 * 1024 * 1024;

/// Portfolio scheduler: runs the engines sequentially under monotonically
/// increasing per-engine time budgets. `Failed` engines are dropped for
/// good; the first `Solved` engine wins. Time-outs merely suspend an engine
/// until the next budget level.
pub struct Scheduler {
    engines: Vec<Option<Box<dyn SearchEngine>>>,
    emergency_buffers: Vec<Option<Vec<u8>>>,
    time_limits: Vec<Duration>,
    memory_limit_mb: Option<usize>,
    plan: Option<Plan>,
    statistics: SearchStatistics,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("engines", &self.engines.len())
            .field("time_limits", &self.time_limits)
            .finish_non_exhaustive()
    }
}

impl Scheduler {
    pub fn new(memory_limit_mb: Option<usize>) -> Self {
        Self {
            engines: vec![],
            emergency_buffers: vec![],
            time_limits: vec![],
            memory_limit_mb,
            plan: None,
            statistics: SearchStatistics::new(),
        }
    }

    pub fn add_engine(&mut self, engine: Box<dyn SearchEngine>) {
        self.engines.push(Some(engine));
        self.emergency_buffers
            .push(Some(vec![0u8; EMERGENCY_BUFFER_BYTES]));
    }

    pub fn add_time_limit(&mut self, limit: Duration) {
        debug_assert!(self
            .time_limits
            .last()
            .map_or(true, |&previous| previous <= limit));
        self.time_limits.push(limit);
    }

    fn memory_exceeded(&self) -> bool {
        match (self.memory_limit_mb, memory_stats()) {
            (Some(limit_mb), Some(usage)) => usage.physical_mem / 1024 / 1024 > limit_mb,
            _ => false,
        }
    }

    /// Runs the portfolio. Returns true iff some engine found a plan.
    pub fn search(&mut self) -> bool {
        for level in 0..self.time_limits.len() {
            let slice = self.time_limits[level];
            for slot in 0..self.engines.len() {
                if self.engines[slot].is_none() {
                    continue;
                }
                if level == 0 {
                    self.engines[slot].as_mut().unwrap().initialize();
                }
                let deadline = Instant::now().checked_add(slice);
                let mut check_countdown = CHECK_INTERVAL;
                let outcome = loop {
                    let status = self.engines[slot].as_mut().unwrap().step();
                    match status {
                        SearchStatus::Failed => break SearchStatus::Failed,
                        SearchStatus::Solved => break SearchStatus::Solved,
                        SearchStatus::InProgress => {}
                    }
                    check_countdown -= 1;
                    if check_countdown == 0 {
                        check_countdown = CHECK_INTERVAL;
                        if self.memory_exceeded() {
                            // Free the reserve so the teardown below has
                            // room to run.
                            self.emergency_buffers[slot].take();
                            warn!(engine = slot, "memory limit exceeded; dropping engine");
                            break SearchStatus::Failed;
                        }
                        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
                            break SearchStatus::InProgress;
                        }
                    }
                };
                match outcome {
                    SearchStatus::Solved => {
                        let engine = self.engines[slot].as_ref().unwrap();
                        self.plan = Some(engine.plan().clone());
                        self.statistics = engine.statistics().clone();
                        info!(engine = slot, "portfolio found a solution");
                        return true;
                    }
                    SearchStatus::Failed => {
                        info!(engine = slot, "engine failed; dropped from portfolio");
                        self.engines[slot] = None;
                        self.emergency_buffers[slot].take();
                        if self.engines.iter().all(Option::is_none) {
                            return false;
                        }
                    }
                    SearchStatus::InProgress => {
                        info!(engine = slot, level, "time slice over; task switch");
                    }
                }
            }
        }
        false
    }

    pub fn found_solution(&self) -> bool {
        self.plan.is_some()
    }

    pub fn plan(&self) -> &Plan {
        self.plan
            .as_ref()
            .expect("plan requested before a solution was found")
    }

    pub fn statistics(&self) -> &SearchStatistics {
        &self.statistics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::OperatorId;

    /// Test double that fails after a fixed number of steps.
    #[derive(Debug)]
    struct FailingEngine {
        steps_left: usize,
        statistics: SearchStatistics,
    }

    impl SearchEngine for FailingEngine {
        fn step(&mut self) -> SearchStatus {
            if self.steps_left == 0 {
                return SearchStatus::Failed;
            }
            self.steps_left -= 1;
            SearchStatus::InProgress
        }

        fn found_solution(&self) -> bool {
            false
        }

        fn plan(&self) -> &Plan {
            unreachable!("failing engine never has a plan")
        }

        fn statistics(&self) -> &SearchStatistics {
            &self.statistics
        }
    }

    /// Test double that succeeds after a fixed number of steps.
    #[derive(Debug)]
    struct SolvingEngine {
        steps_left: usize,
        plan: Plan,
        statistics: SearchStatistics,
    }

    impl SolvingEngine {
        fn new(steps_left: usize, steps: Vec<OperatorId>) -> Self {
            let mut statistics = SearchStatistics::new();
            statistics.increment_expanded();
            Self {
                steps_left,
                plan: Plan::new(steps),
                statistics,
            }
        }
    }

    impl SearchEngine for SolvingEngine {
        fn step(&mut self) -> SearchStatus {
            if self.steps_left == 0 {
                return SearchStatus::Solved;
            }
            self.steps_left -= 1;
            SearchStatus::InProgress
        }

        fn found_solution(&self) -> bool {
            self.steps_left == 0
        }

        fn plan(&self) -> &Plan {
            &self.plan
        }

        fn statistics(&self) -> &SearchStatistics {
            &self.statistics
        }
    }

    #[test]
    fn portfolio_with_real_engines_produces_a_valid_plan() {
        use crate::search::heuristics::HffHeuristic;
        use crate::search::search_engines::{BestFirstSearchEngine, IterativeSearchEngine};
        use crate::search::validate;
        use crate::test_utils::*;
        use std::rc::Rc;

        let task = Rc::new(cea_task());
        let mut scheduler = Scheduler::new(None);
        scheduler.add_engine(Box::new(BestFirstSearchEngine::new(
            task.clone(),
            Box::new(HffHeuristic::new(task.clone(), false)),
            None,
        )));
        scheduler.add_engine(Box::new(IterativeSearchEngine::new(task.clone(), 64)));
        scheduler.add_time_limit(Duration::from_secs(1));
        scheduler.add_time_limit(Duration::from_secs(10));

        assert!(scheduler.search());
        assert!(validate(&task, scheduler.plan()));
    }

    #[test]
    fn failed_engines_are_dropped_and_the_next_one_wins() {
        let mut scheduler = Scheduler::new(None);
        scheduler.add_engine(Box::new(FailingEngine {
            steps_left: 3,
            statistics: SearchStatistics::new(),
        }));
        scheduler.add_engine(Box::new(SolvingEngine::new(5, vec![0, 1])));
        scheduler.add_time_limit(Duration::from_secs(1));
        scheduler.add_time_limit(Duration::from_secs(10));

        assert!(scheduler.search());
        assert!(scheduler.found_solution());
        assert_eq!(scheduler.plan().steps(), &[0, 1]);
        assert_eq!(scheduler.statistics().expanded_states, 1);
    }

    #[test]
    fn all_failures_report_no_solution() {
        let mut scheduler = Scheduler::new(None);
        scheduler.add_engine(Box::new(FailingEngine {
            steps_left: 0,
            statistics: SearchStatistics::new(),
        }));
        scheduler.add_time_limit(Duration::from_secs(1));
        assert!(!scheduler.search());
        assert!(!scheduler.found_solution());
    }

    #[test]
    fn suspended_engines_resume_at_the_next_level() {
        // A zero-length first slice suspends the engine immediately; the
        // second slice lets it finish.
        let mut scheduler = Scheduler::new(None);
        scheduler.add_engine(Box::new(SolvingEngine::new(CHECK_INTERVAL as usize * 2, vec![7])));
        scheduler.add_time_limit(Duration::from_secs(0));
        scheduler.add_time_limit(Duration::from_secs(10));
        assert!(scheduler.search());
        assert_eq!(scheduler.plan().steps(), &[7]);
    }
}
