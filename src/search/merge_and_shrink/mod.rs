mod abstraction;
mod heuristic;
mod label_reduction;
mod shrink_strategy;
mod state_map;
mod variable_order;

pub use heuristic::{MasOptions, MergeAndShrinkHeuristic};
pub use shrink_strategy::ShrinkStrategyName;
pub use variable_order::{MergeStrategyName, VariableOrderFinder};

pub(crate) use abstraction::Abstraction;
pub(crate) use label_reduction::LabelReduction;
pub(crate) use state_map::StateMap;
