use crate::search::states::State;

/// Abstract state reference inside a lookup table; `PRUNED` marks states
/// removed as unreachable or irrelevant.
pub(crate) type AbstractStateRef = i32;

pub(crate) const PRUNED: AbstractStateRef = -1;

/// Maps concrete states to abstract state indices. Atomic maps read one
/// variable; composite maps combine the factor maps through a product
/// table. The map survives `release`d transition systems, so heuristic
/// lookup never needs the factors.
#[derive(Debug)]
pub(crate) enum StateMap {
    Atomic {
        var: usize,
        table: Vec<AbstractStateRef>,
    },
    Composite {
        left: Box<StateMap>,
        right: Box<StateMap>,
        /// `table[left_state][right_state]`.
        table: Vec<Vec<AbstractStateRef>>,
    },
}

impl StateMap {
    pub fn atomic(var: usize, domain_size: usize) -> Self {
        StateMap::Atomic {
            var,
            table: (0..domain_size as AbstractStateRef).collect(),
        }
    }

    /// Product map: factor states `(s1, s2)` to `s1 * right_size + s2`.
    pub fn composite(left: StateMap, right: StateMap, left_size: usize, right_size: usize) -> Self {
        let table = (0..left_size)
            .map(|s1| {
                (0..right_size)
                    .map(|s2| (s1 * right_size + s2) as AbstractStateRef)
                    .collect()
            })
            .collect();
        StateMap::Composite {
            left: Box::new(left),
            right: Box::new(right),
            table,
        }
    }

    pub fn lookup(&self, state: &State) -> Option<usize> {
        match self {
            StateMap::Atomic { var, table } => {
                let abstract_state = table[state[*var]];
                (abstract_state != PRUNED).then_some(abstract_state as usize)
            }
            StateMap::Composite { left, right, table } => {
                let left_state = left.lookup(state)?;
                let right_state = right.lookup(state)?;
                let abstract_state = table[left_state][right_state];
                (abstract_state != PRUNED).then_some(abstract_state as usize)
            }
        }
    }

    /// Rewrites the table through an abstraction mapping from old to new
    /// abstract states (`PRUNED` drops the entry).
    pub fn apply_mapping(&mut self, mapping: &[AbstractStateRef]) {
        let remap = |entry: &mut AbstractStateRef| {
            if *entry != PRUNED {
                *entry = mapping[*entry as usize];
            }
        };
        match self {
            StateMap::Atomic { table, .. } => table.iter_mut().for_each(remap),
            StateMap::Composite { table, .. } => table
                .iter_mut()
                .for_each(|row| row.iter_mut().for_each(remap)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn atomic_lookup_and_mapping() {
        let mut map = StateMap::atomic(1, 3);
        let state = State::new(vec![9, 2]);
        assert_eq!(map.lookup(&state), Some(2));

        // Collapse values 1 and 2 into group 1, prune value 0.
        map.apply_mapping(&[PRUNED, 1, 1]);
        assert_eq!(map.lookup(&state), Some(1));
        assert_eq!(map.lookup(&State::new(vec![9, 0])), None);
    }

    #[test]
    fn composite_lookup() {
        let left = StateMap::atomic(0, 2);
        let right = StateMap::atomic(1, 3);
        let map = StateMap::composite(left, right, 2, 3);
        assert_eq!(map.lookup(&State::new(vec![0, 0])), Some(0));
        assert_eq!(map.lookup(&State::new(vec![1, 2])), Some(5));
    }

    #[test]
    fn pruned_factor_propagates() {
        let mut left = StateMap::atomic(0, 2);
        left.apply_mapping(&[0, PRUNED]);
        let right = StateMap::atomic(1, 2);
        let map = StateMap::composite(left, right, 2, 2);
        assert_eq!(map.lookup(&State::new(vec![1, 0])), None);
        assert_eq!(map.lookup(&State::new(vec![0, 1])), Some(1));
    }
}
