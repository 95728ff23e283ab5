mod canonical_pdbs;
mod match_tree;
mod max_cliques;
mod pattern_database;
mod pattern_generation;

pub use canonical_pdbs::CanonicalPdbsHeuristic;
pub use pattern_database::PatternDatabaseHeuristic;
pub use pattern_generation::{PatternGenerationHaslum, PatternGenerationOptions};

pub(crate) use match_tree::MatchTree;
pub(crate) use max_cliques::compute_max_cliques;
pub(crate) use pattern_database::AbstractOperator;
