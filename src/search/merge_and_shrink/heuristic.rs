use crate::search::{
    heuristics::{ConfigError, Heuristic, HeuristicValue},
    merge_and_shrink::{
        shrink_strategy, Abstraction, MergeStrategyName, ShrinkStrategyName, VariableOrderFinder,
    },
    states::State,
    Task,
};
use memory_stats::memory_stats;
use rand::{rngs::SmallRng, SeedableRng};
use std::rc::Rc;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct MasOptions {
    pub max_abstract_states: usize,
    pub max_abstract_states_before_merge: usize,
    pub abstraction_count: usize,
    pub merge_strategy: MergeStrategyName,
    pub shrink_strategy: ShrinkStrategyName,
    pub label_reduction: bool,
    pub seed: u64,
    /// Construction aborts when the process exceeds this limit; `None`
    /// disables the check.
    pub memory_limit_mb: Option<usize>,
}

/// Merge-and-shrink heuristic: atomic abstractions composed along a linear
/// variable order, shrunk to the size budget before every merge. Several
/// abstractions can be built and maximized over.
#[derive(Debug)]
pub struct MergeAndShrinkHeuristic {
    abstractions: Vec<Abstraction>,
}

/// Pre-allocated block held while abstractions are built and released the
/// moment the memory limit trips, so the abort path (logging, teardown of
/// half-built abstractions) has headroom to run.
const MEMORY_BUFFER_BYTES: usize = 16 * 1024 * 1024;

fn memory_exceeded(memory_limit_mb: Option<usize>) -> bool {
    match (memory_limit_mb, memory_stats()) {
        (Some(limit_mb), Some(usage)) => usage.physical_mem / 1024 / 1024 > limit_mb,
        _ => false,
    }
}

impl MergeAndShrinkHeuristic {
    pub fn new(task: Rc<Task>, options: &MasOptions) -> Result<Self, ConfigError> {
        verify_task_supported(&task)?;
        if task.use_metric && task.min_action_cost == 0 {
            warn!("zero-cost actions: the merge-and-shrink heuristic is not admissible");
        }
        info!(
            max_abstract_states = options.max_abstract_states,
            max_abstract_states_before_merge = options.max_abstract_states_before_merge,
            abstraction_count = options.abstraction_count,
            merge_strategy = ?options.merge_strategy,
            shrink_strategy = ?options.shrink_strategy,
            label_reduction = options.label_reduction,
            "initializing merge-and-shrink heuristic"
        );

        let mut memory_buffer = Some(vec![0u8; MEMORY_BUFFER_BYTES]);
        let mut abstractions = vec![];
        for round in 0..options.abstraction_count {
            match build_abstraction(&task, options, options.seed + round as u64) {
                Ok(abstraction) => {
                    if !abstraction.is_solvable() {
                        info!("abstraction proves the task unsolvable");
                    }
                    abstractions.push(abstraction);
                }
                Err(error) => {
                    // Release the reserve so the cleanup path has room to
                    // run, then give up on this heuristic.
                    memory_buffer.take();
                    warn!("merge-and-shrink construction aborted: {error}");
                    return Err(error);
                }
            }
        }
        // Construction succeeded; the reserve has done its job.
        memory_buffer.take();
        Ok(Self { abstractions })
    }
}

impl Heuristic for MergeAndShrinkHeuristic {
    fn evaluate(&mut self, state: &State) -> HeuristicValue {
        let mut best = 0;
        for abstraction in &self.abstractions {
            match abstraction.lookup(state) {
                Some(distance) => best = best.max(distance),
                None => return HeuristicValue::DeadEnd,
            }
        }
        HeuristicValue::Estimate(best)
    }
}

fn verify_task_supported(task: &Task) -> Result<(), ConfigError> {
    if task.has_axioms() {
        return Err(ConfigError::AxiomsUnsupported { heuristic: "mas" });
    }
    if task.has_conditional_effects() {
        return Err(ConfigError::ConditionalEffectsUnsupported { heuristic: "mas" });
    }
    Ok(())
}

/// Balances the per-factor shrink targets so the product obeys the overall
/// limit: both factors are capped at the before-merge limit, and if the
/// product still overflows, the atomic side is squeezed towards the square
/// root of the total budget.
fn compute_shrink_sizes(
    size1: usize,
    size2: usize,
    max_states: usize,
    max_states_before_merge: usize,
) -> (usize, usize) {
    let mut new_size1 = size1.min(max_states_before_merge);
    let mut new_size2 = size2.min(max_states_before_merge);
    if max_states / new_size1 < new_size2 {
        let balanced_size = (max_states as f64).sqrt() as usize;
        new_size2 = new_size2.min(balanced_size.max(1));
        new_size1 = new_size1.min((max_states / new_size2).max(1));
    }
    debug_assert!(new_size1 * new_size2 <= max_states);
    (new_size1, new_size2)
}

fn build_abstraction(
    task: &Rc<Task>,
    options: &MasOptions,
    seed: u64,
) -> Result<Abstraction, ConfigError> {
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut atomic: Vec<Option<Abstraction>> = Abstraction::build_atomic(task)
        .into_iter()
        .map(Some)
        .collect();

    let mut order = VariableOrderFinder::new(task, options.merge_strategy, seed);
    let first_var = order
        .next_var()
        .ok_or_else(|| ConfigError::Invalid("task has no variables".to_string()))?;
    let mut abstraction = atomic[first_var].take().unwrap();

    while let Some(var) = order.next_var() {
        if !abstraction.is_solvable() {
            // An unsolvable abstraction already proves the task
            // unsolvable; no point merging further.
            return Ok(abstraction);
        }
        if memory_exceeded(options.memory_limit_mb) {
            return Err(ConfigError::Invalid(
                "memory limit exceeded while merging abstractions".to_string(),
            ));
        }
        let mut other = atomic[var].take().unwrap();

        let (new_size, other_new_size) = compute_shrink_sizes(
            abstraction.size(),
            other.size(),
            options.max_abstract_states,
            options.max_abstract_states_before_merge,
        );
        let ignores_limit = options.shrink_strategy.ignores_size_limit();
        if other_new_size != other.size() {
            info!("atomic abstraction too big; must shrink");
            // Strategies without a size limit still coarsen, they just
            // keep whatever size bisimulation gives them.
            let target = if ignores_limit {
                other.size()
            } else {
                other_new_size
            };
            shrink_strategy::shrink(
                &mut other,
                target.max(1),
                options.shrink_strategy,
                &mut rng,
                false,
            );
        }
        if new_size != abstraction.size() || options.shrink_strategy.is_bisimulation_family() {
            shrink_strategy::shrink(
                &mut abstraction,
                new_size.max(1),
                options.shrink_strategy,
                &mut rng,
                false,
            );
        }

        abstraction = Abstraction::merge(abstraction, other, task, options.label_reduction);
        info!(
            vars = abstraction.varset.len(),
            states = abstraction.size(),
            init_h = abstraction
                .init_state
                .map(|init| abstraction.goal_distances[init]),
            "merged abstraction"
        );
    }
    Ok(abstraction)
}
