use crate::search::{states::State, OperatorId, Task};

/// One node of the applicability decision DAG. Interior nodes test a single
/// variable; operators whose preconditions are exhausted at a node are
/// reported there.
#[derive(Debug)]
enum GeneratorNode {
    Switch {
        var: usize,
        /// Operators applicable regardless of this variable's value (their
        /// remaining preconditions start past `var`).
        immediate: Vec<OperatorId>,
        /// One child per value of `var`.
        value_children: Vec<GeneratorNode>,
        /// Child for operators without a precondition on `var`.
        dont_care: Box<GeneratorNode>,
    },
    Leaf(Vec<OperatorId>),
    Empty,
}

/// Decision-DAG index over operator preconditions: queries return exactly
/// the operators applicable in a state, in time proportional to the matched
/// set plus the traversed nodes.
#[derive(Debug)]
pub struct SuccessorGenerator {
    root: GeneratorNode,
}

impl SuccessorGenerator {
    /// Compiles the index from the operator set. Preconditions are
    /// considered in increasing variable order, so construction is linear in
    /// the total precondition size.
    pub fn from_task(task: &Task) -> Self {
        // Sorted precondition list (prevails + defined effect preconditions)
        // per operator.
        let preconditions: Vec<Vec<(usize, usize)>> = task
            .operators
            .iter()
            .map(|op| {
                let mut facts: Vec<(usize, usize)> = op
                    .precondition_facts()
                    .map(|fact| (fact.var, fact.value))
                    .collect();
                facts.sort_unstable();
                facts.dedup();
                facts
            })
            .collect();
        let all_ops: Vec<OperatorId> = (0..task.operators.len()).collect();
        let root = build(task, &preconditions, all_ops, 0);
        Self { root }
    }

    /// All operators applicable in `state`.
    pub fn applicable_operators(&self, state: &State) -> Vec<OperatorId> {
        let mut result = vec![];
        let mut stack = vec![&self.root];
        while let Some(node) = stack.pop() {
            match node {
                GeneratorNode::Switch {
                    var,
                    immediate,
                    value_children,
                    dont_care,
                } => {
                    result.extend_from_slice(immediate);
                    stack.push(&value_children[state[*var]]);
                    stack.push(dont_care);
                }
                GeneratorNode::Leaf(ops) => result.extend_from_slice(ops),
                GeneratorNode::Empty => {}
            }
        }
        result.sort_unstable();
        result
    }
}

/// Builds the subtree for `ops`, whose preconditions on variables before
/// `depth` have all been confirmed.
fn build(
    task: &Task,
    preconditions: &[Vec<(usize, usize)>],
    ops: Vec<OperatorId>,
    depth: usize,
) -> GeneratorNode {
    if ops.is_empty() {
        return GeneratorNode::Empty;
    }

    // Partition position within each operator's sorted precondition list is
    // found by scanning for the first precondition at or past `depth`.
    let next_var = ops
        .iter()
        .filter_map(|&op| {
            preconditions[op]
                .iter()
                .find(|&&(var, _)| var >= depth)
                .map(|&(var, _)| var)
        })
        .min();

    let Some(switch_var) = next_var else {
        return GeneratorNode::Leaf(ops);
    };

    let mut immediate = vec![];
    let mut by_value: Vec<Vec<OperatorId>> =
        vec![vec![]; task.variables[switch_var].domain_size];
    let mut dont_care = vec![];
    for &op in &ops {
        match preconditions[op].iter().find(|&&(var, _)| var >= depth) {
            None => immediate.push(op),
            Some(&(var, value)) if var == switch_var => by_value[value].push(op),
            Some(_) => dont_care.push(op),
        }
    }

    let value_children = by_value
        .into_iter()
        .map(|value_ops| build(task, preconditions, value_ops, switch_var + 1))
        .collect();
    let dont_care = Box::new(build(task, preconditions, dont_care, switch_var + 1));

    GeneratorNode::Switch {
        var: switch_var,
        immediate,
        value_children,
        dont_care,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    /// Brute-force reference: scan every operator.
    fn applicable_by_scan(task: &Task, state: &State) -> Vec<OperatorId> {
        (0..task.operators.len())
            .filter(|&op| task.operators[op].is_applicable(state))
            .collect()
    }

    fn all_states(task: &Task) -> Vec<State> {
        let mut states = vec![vec![]];
        for var in &task.variables {
            let mut extended = vec![];
            for prefix in &states {
                for value in 0..var.domain_size {
                    let mut next = prefix.clone();
                    next.push(value);
                    extended.push(next);
                }
            }
            states = extended;
        }
        states.into_iter().map(State::new).collect()
    }

    #[test]
    fn matches_applicability_scan_on_every_state() {
        for task in [reachability_task(), cea_task(), deadend_task()] {
            let generator = SuccessorGenerator::from_task(&task);
            for state in all_states(&task) {
                assert_eq!(
                    generator.applicable_operators(&state),
                    applicable_by_scan(&task, &state),
                    "mismatch in state {:?}",
                    state
                );
            }
        }
    }

    #[test]
    fn initial_state_of_reachability_task() {
        let task = reachability_task();
        let generator = SuccessorGenerator::from_task(&task);
        assert_eq!(
            generator.applicable_operators(&task.initial_state()),
            vec![0, 1]
        );
    }
}
