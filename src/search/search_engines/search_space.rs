use crate::search::{
    states::{State, StateId, StatePacker, StateRegistry, NO_STATE},
    OperatorId, Plan, Task,
};
use std::collections::HashMap;

/// Predecessor edge of a closed state. The root's entry carries the
/// sentinel id and no operator.
#[derive(Debug, Clone, Copy)]
struct ClosedEntry {
    predecessor: StateId,
    reached_by: Option<OperatorId>,
}

/// State registry plus closed list: interned states with the edge that
/// first reached them, supporting path reconstruction.
#[derive(Debug)]
pub(crate) struct SearchSpace {
    registry: StateRegistry,
    closed: HashMap<StateId, ClosedEntry>,
}

impl SearchSpace {
    pub fn new(task: &Task) -> Self {
        Self {
            registry: StateRegistry::new(StatePacker::new(&task.variables)),
            closed: HashMap::new(),
        }
    }

    /// Interns `state` without closing it.
    pub fn register(&mut self, state: &State) -> StateId {
        self.registry.insert(state).0
    }

    pub fn is_closed(&self, id: StateId) -> bool {
        self.closed.contains_key(&id)
    }

    /// Closes `id` with its reaching edge. The first edge wins; re-closing
    /// is a programmer error.
    pub fn close(&mut self, id: StateId, predecessor: StateId, reached_by: Option<OperatorId>) {
        debug_assert!(!self.is_closed(id));
        self.closed.insert(
            id,
            ClosedEntry {
                predecessor,
                reached_by,
            },
        );
    }

    pub fn state(&self, id: StateId) -> State {
        self.registry.lookup_state(id)
    }

    pub fn num_closed(&self) -> usize {
        self.closed.len()
    }

    pub fn clear_closed(&mut self) {
        self.closed.clear();
    }

    /// Walks the closed list back from `goal_id` to the root sentinel.
    pub fn extract_plan(&self, goal_id: StateId) -> Plan {
        let mut operators = vec![];
        let mut current = goal_id;
        loop {
            let entry = self.closed[&current];
            match entry.reached_by {
                Some(op) => operators.push(op),
                None => break,
            }
            debug_assert!(entry.predecessor != NO_STATE);
            current = entry.predecessor;
        }
        operators.reverse();
        Plan::new(operators)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::states::NO_STATE;
    use crate::test_utils::*;

    #[test]
    fn closed_entries_reproduce_the_path() {
        let task = reachability_task();
        let mut space = SearchSpace::new(&task);

        let s0 = task.initial_state();
        let id0 = space.register(&s0);
        space.close(id0, NO_STATE, None);

        let s1 = task.successor(&s0, 0);
        let id1 = space.register(&s1);
        space.close(id1, id0, Some(0));

        let s2 = task.successor(&s1, 1);
        let id2 = space.register(&s2);
        space.close(id2, id1, Some(1));

        assert!(space.is_closed(id0));
        assert_eq!(space.state(id1), s1);

        let plan = space.extract_plan(id2);
        assert_eq!(plan.steps(), &[0, 1]);
    }

    #[test]
    fn registering_twice_returns_the_same_id() {
        let task = reachability_task();
        let mut space = SearchSpace::new(&task);
        let id_a = space.register(&task.initial_state());
        let id_b = space.register(&task.initial_state());
        assert_eq!(id_a, id_b);
    }
}
