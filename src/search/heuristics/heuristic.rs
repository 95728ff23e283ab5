use crate::search::{
    heuristics::{CeaHeuristic, HaddHeuristic, HffHeuristic, HmaxHeuristic},
    merge_and_shrink::{MasOptions, MergeAndShrinkHeuristic, MergeStrategyName, ShrinkStrategyName},
    pdbs::{
        CanonicalPdbsHeuristic, PatternDatabaseHeuristic, PatternGenerationHaslum,
        PatternGenerationOptions,
    },
    states::State,
    Cost, OperatorId, Task,
};
use std::rc::Rc;
use thiserror::Error;

/// A heuristic estimate: either a finite cost bound or the dead-end
/// sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeuristicValue {
    Estimate(Cost),
    DeadEnd,
}

impl HeuristicValue {
    pub fn is_dead_end(&self) -> bool {
        matches!(self, HeuristicValue::DeadEnd)
    }

    pub fn estimate(&self) -> Option<Cost> {
        match self {
            HeuristicValue::Estimate(cost) => Some(*cost),
            HeuristicValue::DeadEnd => None,
        }
    }
}

impl From<Cost> for HeuristicValue {
    fn from(cost: Cost) -> Self {
        HeuristicValue::Estimate(cost)
    }
}

/// A state evaluator. Heuristics own their mutable caches and belong to a
/// single engine; the task is shared immutably.
pub trait Heuristic: std::fmt::Debug {
    /// Evaluate the given state with respect to the task.
    fn evaluate(&mut self, state: &State) -> HeuristicValue;

    /// The preferred operators found by the last `evaluate` call. Empty for
    /// heuristics that do not compute any.
    fn preferred_operators(&self) -> &[OperatorId] {
        &[]
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("the {heuristic} heuristic does not support axioms")]
    AxiomsUnsupported { heuristic: &'static str },
    #[error("the {heuristic} heuristic does not support conditional effects")]
    ConditionalEffectsUnsupported { heuristic: &'static str },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Options shared by the configurable heuristics; defaults mirror the
/// planner's published CLI defaults.
#[derive(Debug, Clone)]
pub struct EvaluatorOptions {
    /// Use a true Dijkstra frontier in the FF exploration instead of the
    /// historical FIFO approximation.
    pub ff_exact_queue: bool,
    /// Explicit PDB pattern; defaults to a causal-graph/goal prefix bounded
    /// by `pdb_max_size`.
    pub pattern: Option<Vec<usize>>,
    pub pdb_max_size: usize,
    pub collection_max_size: usize,
    pub num_samples: usize,
    pub min_improvement: usize,
    pub max_abstract_states: usize,
    pub max_abstract_states_before_merge: usize,
    pub abstraction_count: usize,
    pub merge_strategy: MergeStrategyName,
    pub shrink_strategy: ShrinkStrategyName,
    pub label_reduction: bool,
    pub seed: u64,
    /// Memory limit applied while building memory-hungry heuristics.
    pub memory_limit_mb: Option<usize>,
}

impl Default for EvaluatorOptions {
    fn default() -> Self {
        Self {
            ff_exact_queue: false,
            pattern: None,
            pdb_max_size: 2_000_000,
            collection_max_size: 20_000_000,
            num_samples: 1000,
            min_improvement: 10,
            max_abstract_states: 1000,
            max_abstract_states_before_merge: 1000,
            abstraction_count: 1,
            merge_strategy: MergeStrategyName::default(),
            shrink_strategy: ShrinkStrategyName::default(),
            label_reduction: false,
            seed: 2011,
            memory_limit_mb: None,
        }
    }
}

#[derive(clap::ValueEnum, strum_macros::Display, Debug, Clone, Copy, PartialEq, Eq)]
#[clap(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HeuristicName {
    #[clap(help = "HSP max heuristic")]
    Hmax,
    #[clap(help = "HSP additive heuristic")]
    Hadd,
    #[clap(help = "FF heuristic with helpful actions")]
    Ff,
    #[clap(help = "Context-enhanced additive heuristic")]
    Cea,
    #[clap(help = "Single pattern database")]
    Pdb,
    #[clap(help = "Canonical heuristic over a PDB collection")]
    Cpdbs,
    #[clap(help = "Canonical PDBs grown by hill climbing (iPDB)")]
    Ipdb,
    #[clap(help = "Merge-and-shrink abstraction heuristic")]
    Mas,
}

impl HeuristicName {
    pub fn create(
        &self,
        task: Rc<Task>,
        options: &EvaluatorOptions,
    ) -> Result<Box<dyn Heuristic>, ConfigError> {
        validate(options)?;
        match self {
            HeuristicName::Hmax => Ok(Box::new(HmaxHeuristic::new(task))),
            HeuristicName::Hadd => Ok(Box::new(HaddHeuristic::new(task))),
            HeuristicName::Ff => Ok(Box::new(HffHeuristic::new(task, options.ff_exact_queue))),
            HeuristicName::Cea => Ok(Box::new(CeaHeuristic::new(task))),
            HeuristicName::Pdb => {
                let pattern = match &options.pattern {
                    Some(pattern) => pattern.clone(),
                    None => PatternDatabaseHeuristic::default_pattern(
                        &task,
                        options.pdb_max_size,
                    ),
                };
                Ok(Box::new(PatternDatabaseHeuristic::new(
                    task,
                    pattern,
                    options.pdb_max_size,
                )?))
            }
            HeuristicName::Cpdbs => {
                let patterns = task
                    .goal
                    .facts()
                    .iter()
                    .map(|fact| vec![fact.var])
                    .collect();
                Ok(Box::new(CanonicalPdbsHeuristic::new(
                    task,
                    patterns,
                    options.pdb_max_size,
                )?))
            }
            HeuristicName::Ipdb => {
                let generation_options = PatternGenerationOptions {
                    pdb_max_size: options.pdb_max_size,
                    collection_max_size: options.collection_max_size,
                    num_samples: options.num_samples,
                    min_improvement: options.min_improvement,
                    seed: options.seed,
                };
                Ok(Box::new(PatternGenerationHaslum::generate(
                    task,
                    &generation_options,
                )?))
            }
            HeuristicName::Mas => {
                let mas_options = MasOptions {
                    max_abstract_states: options.max_abstract_states,
                    max_abstract_states_before_merge: options.max_abstract_states_before_merge,
                    abstraction_count: options.abstraction_count,
                    merge_strategy: options.merge_strategy,
                    shrink_strategy: options.shrink_strategy,
                    label_reduction: options.label_reduction,
                    seed: options.seed,
                    memory_limit_mb: options.memory_limit_mb,
                };
                Ok(Box::new(MergeAndShrinkHeuristic::new(task, &mas_options)?))
            }
        }
    }
}

fn validate(options: &EvaluatorOptions) -> Result<(), ConfigError> {
    if options.pdb_max_size < 1 {
        return Err(ConfigError::Invalid(
            "size per pdb must be at least 1".to_string(),
        ));
    }
    if options.collection_max_size < 1 {
        return Err(ConfigError::Invalid(
            "total pdb collection size must be at least 1".to_string(),
        ));
    }
    if options.min_improvement < 1 {
        return Err(ConfigError::Invalid(
            "minimum improvement must be at least 1".to_string(),
        ));
    }
    if options.min_improvement > options.num_samples {
        return Err(ConfigError::Invalid(
            "minimum improvement must not be higher than number of samples".to_string(),
        ));
    }
    if options.max_abstract_states_before_merge < 1
        || options.max_abstract_states < options.max_abstract_states_before_merge
    {
        return Err(ConfigError::Invalid(
            "abstraction size limits must satisfy 1 <= before-merge limit <= total limit"
                .to_string(),
        ));
    }
    if options.abstraction_count < 1 {
        return Err(ConfigError::Invalid(
            "abstraction count must be at least 1".to_string(),
        ));
    }
    Ok(())
}
