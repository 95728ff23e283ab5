mod axioms;
mod cost;
mod fact;
mod goal;
pub mod graphs;
pub mod heuristics;
pub mod merge_and_shrink;
mod operator;
pub mod pdbs;
mod plan;
pub mod search_engines;
pub mod states;
pub mod successor_generators;
mod task;
mod validate;
mod variable;
mod verbosity;

pub use cost::{clamped_add, Cost, INFINITY, MAX_COST_VALUE};
pub use fact::Fact;
pub use goal::Goal;
pub use operator::{Operator, OperatorId, PrePost, Prevail};
pub use plan::Plan;
pub use task::Task;
pub use validate::validate;
pub use variable::Variable;
pub use verbosity::Verbosity;
