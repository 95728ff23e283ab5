use crate::search::states::{PackedState, State, StatePacker};
use segvec::SegVec;
use std::collections::HashMap;

/// Dense id of a registered state. Ids are assigned in insertion order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StateId(pub(crate) usize);

/// Sentinel used as the root's predecessor in the closed list.
pub const NO_STATE: StateId = StateId(usize::MAX);

/// Interns packed states and owns their buffers. `State` values handed out
/// are unpacked copies; the packed originals stay in the registry for the
/// lifetime of the search.
pub struct StateRegistry {
    packer: StatePacker,
    states: SegVec<PackedState>,
    ids: HashMap<PackedState, StateId>,
}

impl std::fmt::Debug for StateRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateRegistry")
            .field("packer", &self.packer)
            .field("states", &self.states.len())
            .finish_non_exhaustive()
    }
}

impl StateRegistry {
    pub fn new(packer: StatePacker) -> Self {
        Self {
            packer,
            states: SegVec::new(),
            ids: HashMap::new(),
        }
    }

    pub fn packer(&self) -> &StatePacker {
        &self.packer
    }

    /// Interns `state`, returning its id and whether it was new.
    pub fn insert(&mut self, state: &State) -> (StateId, bool) {
        let packed = self.packer.pack(state);
        if let Some(&id) = self.ids.get(&packed) {
            return (id, false);
        }
        let id = StateId(self.states.len());
        self.states.push(packed.clone());
        self.ids.insert(packed, id);
        (id, true)
    }

    pub fn lookup_state(&self, id: StateId) -> State {
        let packed = self.states.get(id.0).expect("invalid state id");
        self.packer.unpack(packed)
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
