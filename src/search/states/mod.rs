mod packed_state;
mod registry;
mod state;

pub use packed_state::{PackedState, StatePacker};
pub use registry::{StateId, StateRegistry, NO_STATE};
pub use state::State;
