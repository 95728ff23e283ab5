//! Delete-relaxation model shared by h_max, h_add and h_ff: every operator
//! and axiom is split into one unary operator per effect, with the effect
//! conditions appended to the shared precondition list. Cross-references
//! between propositions and unary operators are arena indices.

use crate::search::{Cost, Fact, OperatorId, Task};
use itertools::Itertools;
use std::collections::HashMap;
use std::rc::Rc;
use tracing::debug;

pub(crate) type PropId = usize;
pub(crate) type UnaryOpId = usize;

/// Sentinel for "not reached yet" in the per-evaluation cost fields.
pub(crate) const UNREACHED: Cost = -1;

#[derive(Debug)]
pub(crate) struct Proposition {
    pub is_goal: bool,
    /// Unary operators this proposition is a precondition of.
    pub precondition_of: Vec<UnaryOpId>,
    // Per-evaluation scratch.
    pub cost: Cost,
    pub reached_by: Option<UnaryOpId>,
    pub marked: bool,
}

#[derive(Debug)]
pub(crate) struct UnaryOperator {
    /// `None` for axioms.
    pub operator: Option<OperatorId>,
    pub preconditions: Vec<PropId>,
    pub effect: PropId,
    pub base_cost: Cost,
    // Per-evaluation scratch.
    pub unsatisfied_preconditions: usize,
    pub cost: Cost,
}

/// The subset-dominance scan is skipped for precondition sets whose proper
/// power set exceeds this bound.
const DOMINANCE_MASK_BOUND: usize = 31;

#[derive(Debug)]
pub(crate) struct RelaxationCore {
    pub task: Rc<Task>,
    prop_offsets: Vec<usize>,
    pub propositions: Vec<Proposition>,
    pub unary_operators: Vec<UnaryOperator>,
    pub goal_propositions: Vec<PropId>,
}

impl RelaxationCore {
    pub fn new(task: Rc<Task>) -> Self {
        let mut prop_offsets = Vec::with_capacity(task.variables.len());
        let mut num_props = 0;
        for var in &task.variables {
            prop_offsets.push(num_props);
            num_props += var.domain_size;
        }
        let mut propositions: Vec<Proposition> = (0..num_props)
            .map(|_| Proposition {
                is_goal: false,
                precondition_of: vec![],
                cost: UNREACHED,
                reached_by: None,
                marked: false,
            })
            .collect();

        let prop_id = |fact: Fact| prop_offsets[fact.var] + fact.value;

        let mut goal_propositions = vec![];
        for &fact in task.goal.facts() {
            propositions[prop_id(fact)].is_goal = true;
            goal_propositions.push(prop_id(fact));
        }

        let mut unary_operators = vec![];
        for (op_no, op) in task.operators.iter().enumerate() {
            build_unary_operators(op, Some(op_no), &prop_id, &mut unary_operators);
        }
        for axiom in &task.axioms {
            build_unary_operators(axiom, None, &prop_id, &mut unary_operators);
        }

        let unary_operators = simplify(unary_operators);

        for (unary_no, unary) in unary_operators.iter().enumerate() {
            for &pre in &unary.preconditions {
                propositions[pre].precondition_of.push(unary_no);
            }
        }

        Self {
            task,
            prop_offsets,
            propositions,
            unary_operators,
            goal_propositions,
        }
    }

    pub fn prop_id(&self, fact: Fact) -> PropId {
        self.prop_offsets[fact.var] + fact.value
    }

    /// Resets all per-evaluation scratch fields.
    pub fn reset(&mut self) {
        for prop in &mut self.propositions {
            prop.cost = UNREACHED;
            prop.reached_by = None;
            prop.marked = false;
        }
        for unary in &mut self.unary_operators {
            unary.unsatisfied_preconditions = unary.preconditions.len();
            unary.cost = unary.base_cost;
        }
    }
}

fn build_unary_operators(
    op: &crate::search::Operator,
    op_no: Option<OperatorId>,
    prop_id: &impl Fn(Fact) -> PropId,
    unary_operators: &mut Vec<UnaryOperator>,
) {
    let base_cost = op.cost();
    let precondition: Vec<PropId> = op.precondition_facts().map(prop_id).collect();
    for pre_post in op.pre_post() {
        let mut preconditions = precondition.clone();
        preconditions.extend(
            pre_post
                .conditions
                .iter()
                .map(|cond| prop_id(cond.fact())),
        );
        unary_operators.push(UnaryOperator {
            operator: op_no,
            preconditions,
            effect: prop_id(Fact::new(pre_post.var, pre_post.post)),
            base_cost,
            unsatisfied_preconditions: 0,
            cost: 0,
        });
    }
}

/// Removes duplicate and dominated unary operators: among operators with the
/// same sorted preconditions and effect only the cheapest survives, and an
/// operator is dropped when some proper precondition subset is achieved at
/// no higher cost.
fn simplify(mut unary_operators: Vec<UnaryOperator>) -> Vec<UnaryOperator> {
    let before = unary_operators.len();

    type Key = (Vec<PropId>, PropId);
    for unary in unary_operators.iter_mut() {
        unary.preconditions.sort_unstable();
        unary.preconditions.dedup();
    }
    let mut index: HashMap<Key, usize> = HashMap::new();
    for unary_no in 0..unary_operators.len() {
        let key = (
            unary_operators[unary_no].preconditions.clone(),
            unary_operators[unary_no].effect,
        );
        match index.get(&key) {
            Some(&existing)
                if unary_operators[existing].base_cost
                    <= unary_operators[unary_no].base_cost => {}
            _ => {
                index.insert(key, unary_no);
            }
        }
    }

    let mut kept = vec![];
    for (key, &unary_no) in index.iter().sorted() {
        let preconditions = &key.0;
        let mut dominated = false;
        // Proper subsets only; skipped entirely for large precondition sets.
        let subset_count = (1usize << preconditions.len().min(16)) - 1;
        if subset_count <= DOMINANCE_MASK_BOUND {
            for mask in 0..subset_count {
                let subset: Vec<PropId> = preconditions
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| mask & (1 << i) != 0)
                    .map(|(_, &prop)| prop)
                    .collect();
                if let Some(&dominator) = index.get(&(subset, key.1)) {
                    if unary_operators[dominator].base_cost
                        <= unary_operators[unary_no].base_cost
                    {
                        dominated = true;
                        break;
                    }
                }
            }
        }
        if !dominated {
            kept.push(unary_no);
        }
    }
    kept.sort_unstable();

    let mut result = vec![];
    let mut keep_flags = vec![false; unary_operators.len()];
    for &unary_no in &kept {
        keep_flags[unary_no] = true;
    }
    for (unary_no, unary) in unary_operators.into_iter().enumerate() {
        if keep_flags[unary_no] {
            result.push(unary);
        }
    }

    debug!(
        before,
        after = result.len(),
        "simplified unary operators"
    );
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn reachability_task_model() {
        let core = RelaxationCore::new(Rc::new(reachability_task()));
        // Two binary variables: four propositions, two goal propositions.
        assert_eq!(core.propositions.len(), 4);
        assert_eq!(core.goal_propositions.len(), 2);
        // One unary operator per operator effect.
        assert_eq!(core.unary_operators.len(), 2);
        let unary = &core.unary_operators[0];
        assert_eq!(unary.operator, Some(0));
        assert_eq!(unary.base_cost, 1);
    }

    #[test]
    fn duplicate_unary_operators_are_merged() {
        use crate::search::{Fact, Operator, PrePost, Task};
        use smallvec::smallvec;

        // Two operators with the same precondition set and effect; the
        // cheaper one must survive.
        let make = |name: &str, cost| {
            Operator::for_tests(
                name,
                vec![],
                vec![PrePost {
                    var: 0,
                    pre: Some(0),
                    post: 1,
                    conditions: smallvec![],
                }],
                cost,
            )
        };
        let task = Task::for_tests(
            &[2],
            vec![make("cheap", 1), make("pricy", 5)],
            vec![0],
            vec![Fact::new(0, 1)],
        );
        let core = RelaxationCore::new(Rc::new(task));
        assert_eq!(core.unary_operators.len(), 1);
        assert_eq!(core.unary_operators[0].base_cost, 1);
        assert_eq!(core.unary_operators[0].operator, Some(0));
    }

    #[test]
    fn dominated_unary_operators_are_removed() {
        use crate::search::{Fact, Operator, Prevail, PrePost, Task};
        use smallvec::smallvec;

        // The second operator needs an extra precondition at equal cost, so
        // it is dominated by the first.
        let free = Operator::for_tests(
            "free",
            vec![],
            vec![PrePost {
                var: 0,
                pre: Some(0),
                post: 1,
                conditions: smallvec![],
            }],
            1,
        );
        let guarded = Operator::for_tests(
            "guarded",
            vec![Prevail { var: 1, value: 1 }],
            vec![PrePost {
                var: 0,
                pre: Some(0),
                post: 1,
                conditions: smallvec![],
            }],
            1,
        );
        let task = Task::for_tests(
            &[2, 2],
            vec![free, guarded],
            vec![0, 0],
            vec![Fact::new(0, 1)],
        );
        let core = RelaxationCore::new(Rc::new(task));
        assert_eq!(core.unary_operators.len(), 1);
        assert_eq!(core.unary_operators[0].operator, Some(0));
    }
}
