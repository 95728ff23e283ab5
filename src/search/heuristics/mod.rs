mod cea;
mod hadd;
mod heuristic;
mod hff;
mod hmax;
mod relaxation;

pub use cea::CeaHeuristic;
pub use hadd::HaddHeuristic;
pub use heuristic::{
    ConfigError, EvaluatorOptions, Heuristic, HeuristicName, HeuristicValue,
};
pub use hff::HffHeuristic;
pub use hmax::HmaxHeuristic;
