use crate::search::{OperatorId, Task};
use std::collections::HashMap;

/// Collapses operators that are indistinguishable outside an abstraction's
/// variable set: two labels reduce to one iff they have the same cost and
/// identical preconditions and effects on every variable the abstraction
/// has not absorbed. Only correct for orthogonal compositions, which the
/// linear merge loop guarantees.
#[derive(Debug)]
pub(crate) struct LabelReduction {
    canonical: Vec<OperatorId>,
    num_reduced: usize,
}

impl LabelReduction {
    pub fn new(task: &Task, relevant_operators: &[bool], varset: &[usize]) -> Self {
        let mut var_is_used = vec![true; task.variables.len()];
        for &var in varset {
            var_is_used[var] = false;
        }

        // Signature: sorted outside-preconditions, sorted outside-effects,
        // cost.
        type Signature = (Vec<(usize, usize)>, Vec<(usize, usize)>, i64);
        let mut signature_to_op: HashMap<Signature, OperatorId> = HashMap::new();
        let mut canonical: Vec<OperatorId> = (0..task.operators.len()).collect();
        let mut num_reduced = 0;

        for (op_no, op) in task.operators.iter().enumerate() {
            if !relevant_operators[op_no] {
                continue;
            }
            let mut preconditions: Vec<(usize, usize)> = vec![];
            let mut effects: Vec<(usize, usize)> = vec![];
            for prevail in op.prevail() {
                if var_is_used[prevail.var] {
                    preconditions.push((prevail.var, prevail.value));
                }
            }
            for pre_post in op.pre_post() {
                if var_is_used[pre_post.var] {
                    if let Some(pre) = pre_post.pre {
                        preconditions.push((pre_post.var, pre));
                    }
                    effects.push((pre_post.var, pre_post.post));
                }
            }
            preconditions.sort_unstable();
            effects.sort_unstable();

            let signature = (preconditions, effects, op.cost() as i64);
            match signature_to_op.get(&signature) {
                Some(&existing) => {
                    canonical[op_no] = existing;
                    num_reduced += 1;
                }
                None => {
                    signature_to_op.insert(signature, op_no);
                }
            }
        }

        Self {
            canonical,
            num_reduced,
        }
    }

    pub fn canonical(&self, op: OperatorId) -> OperatorId {
        self.canonical[op]
    }

    pub fn num_reduced(&self) -> usize {
        self.num_reduced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn operators_equal_outside_the_varset_collapse() {
        // In the chains task, projecting away variable 0 makes the three
        // a-operators indistinguishable (no preconditions or effects left).
        let task = chains_task();
        let relevant = vec![true; task.operators.len()];
        let reduction = LabelReduction::new(&task, &relevant, &[0]);
        assert_eq!(reduction.canonical(0), 0);
        assert_eq!(reduction.canonical(1), 0);
        assert_eq!(reduction.canonical(2), 0);
        // The b-operators still differ on variable 1.
        assert_eq!(reduction.canonical(3), 3);
        assert_eq!(reduction.canonical(4), 4);
        assert_eq!(reduction.num_reduced(), 2);
    }

    #[test]
    fn irrelevant_operators_are_left_alone() {
        let task = chains_task();
        let mut relevant = vec![false; task.operators.len()];
        relevant[3] = true;
        let reduction = LabelReduction::new(&task, &relevant, &[0]);
        assert_eq!(reduction.canonical(0), 0);
        assert_eq!(reduction.canonical(1), 1);
        assert_eq!(reduction.num_reduced(), 0);
    }
}
