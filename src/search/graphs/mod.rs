mod causal_graph;
mod domain_transition_graph;

pub use causal_graph::CausalGraph;
pub use domain_transition_graph::{
    DomainTransitionGraph, LocalAssignment, TransitionLabel, ValueTransition,
};
