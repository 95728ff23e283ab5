use crate::search::{Cost, Operator, Task};
use itertools::Itertools;
use std::collections::HashMap;

/// A condition or effect projected onto a DTG's local parent-variable
/// indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocalAssignment {
    pub local_var: usize,
    pub value: usize,
}

/// One operator (or axiom) inducing a value transition, with its conditions
/// on parent variables and the side effects on parent variables it is
/// guaranteed to trigger.
#[derive(Debug, Clone)]
pub struct TransitionLabel {
    pub op: usize,
    pub conditions: Vec<LocalAssignment>,
    pub side_effects: Vec<LocalAssignment>,
}

#[derive(Debug, Clone)]
pub struct ValueTransition {
    pub target: usize,
    pub labels: Vec<TransitionLabel>,
}

/// Domain transition graph of one variable: per-value nodes with labeled
/// arcs to the values reachable in one step. Parent variables appearing in
/// label conditions are tracked through a local index.
#[derive(Debug)]
pub struct DomainTransitionGraph {
    pub var: usize,
    /// Whether the labels index into the axiom set instead of the operators.
    pub is_axiom: bool,
    /// `transitions[value]`: outgoing arcs of that value.
    pub transitions: Vec<Vec<ValueTransition>>,
    /// Local parent index to global variable.
    pub local_to_global: Vec<usize>,
}

/// Bound on the dominance scan: labels with more conditions than this are
/// kept without subset checking.
const MAX_DOMINANCE_CONDITIONS: usize = 5;

impl DomainTransitionGraph {
    /// Builds the DTGs of all variables from the operator and axiom sets.
    pub fn build_all(task: &Task) -> Vec<DomainTransitionGraph> {
        let mut builders: Vec<DtgBuilder> = task
            .variables
            .iter()
            .map(|var| DtgBuilder::new(var.index, var.is_derived(), var.domain_size))
            .collect();

        for (op_no, op) in task.operators.iter().enumerate() {
            add_operator_transitions(task, &mut builders, op_no, op);
        }
        for (axiom_no, axiom) in task.axioms.iter().enumerate() {
            add_operator_transitions(task, &mut builders, axiom_no, axiom);
        }

        builders
            .into_iter()
            .map(|builder| builder.finish(task))
            .collect()
    }

    pub fn domain_size(&self) -> usize {
        self.transitions.len()
    }
}

#[derive(Debug)]
struct DtgBuilder {
    var: usize,
    is_axiom: bool,
    /// `(origin, target) -> labels`.
    arcs: HashMap<(usize, usize), Vec<TransitionLabel>>,
    local_to_global: Vec<usize>,
    global_to_local: HashMap<usize, usize>,
    domain_size: usize,
}

impl DtgBuilder {
    fn new(var: usize, is_axiom: bool, domain_size: usize) -> Self {
        Self {
            var,
            is_axiom,
            arcs: HashMap::new(),
            local_to_global: vec![],
            global_to_local: HashMap::new(),
            domain_size,
        }
    }

    fn local_index(&mut self, global_var: usize) -> usize {
        if let Some(&local) = self.global_to_local.get(&global_var) {
            return local;
        }
        let local = self.local_to_global.len();
        self.local_to_global.push(global_var);
        self.global_to_local.insert(global_var, local);
        local
    }

    fn finish(self, task: &Task) -> DomainTransitionGraph {
        let mut transitions: Vec<Vec<ValueTransition>> = vec![vec![]; self.domain_size];
        let operators = if self.is_axiom {
            &task.axioms
        } else {
            &task.operators
        };
        for ((origin, target), labels) in self
            .arcs
            .into_iter()
            .sorted_by_key(|((origin, target), _)| (*origin, *target))
        {
            let labels = simplify_labels(labels, |op| operators[op].cost());
            transitions[origin].push(ValueTransition { target, labels });
        }
        DomainTransitionGraph {
            var: self.var,
            is_axiom: self.is_axiom,
            transitions,
            local_to_global: self.local_to_global,
        }
    }
}

fn add_operator_transitions(
    task: &Task,
    builders: &mut [DtgBuilder],
    op_no: usize,
    op: &Operator,
) {
    // Global precondition facts (prevails and effect pre values), shared by
    // every effect of the operator.
    let precondition_facts: Vec<(usize, usize)> = op
        .precondition_facts()
        .map(|fact| (fact.var, fact.value))
        .sorted()
        .collect();

    for pre_post in op.pre_post() {
        let var = pre_post.var;
        if task.variables[var].is_derived() != builders[var].is_axiom {
            continue;
        }
        let target = pre_post.post;

        // Determine the origin value and collect conditions on other
        // variables (operator preconditions plus this effect's conditions),
        // projected to local indices.
        let mut origin = pre_post.pre;
        let mut conflicting = false;
        let mut condition_pairs: Vec<(usize, usize)> = vec![];
        for &(cond_var, cond_value) in &precondition_facts {
            if cond_var != var {
                condition_pairs.push((cond_var, cond_value));
            }
        }
        for condition in &pre_post.conditions {
            if condition.var == var {
                match origin {
                    Some(existing) if existing != condition.value => conflicting = true,
                    _ => origin = Some(condition.value),
                }
            } else {
                condition_pairs.push((condition.var, condition.value));
            }
        }
        if conflicting {
            continue;
        }
        condition_pairs.sort_unstable();
        condition_pairs.dedup();

        let builder = &mut builders[var];
        let conditions: Vec<LocalAssignment> = condition_pairs
            .iter()
            .map(|&(cond_var, value)| LocalAssignment {
                local_var: builder.local_index(cond_var),
                value,
            })
            .collect();

        // Side effects: other effects of the operator on tracked parent
        // variables whose trigger conditions are implied by this label's
        // conditions.
        let mut side_effects: Vec<LocalAssignment> = vec![];
        for other in op.pre_post() {
            let other_var = other.var;
            if other_var == var || !builder.global_to_local.contains_key(&other_var) {
                continue;
            }
            let mut trigger: Vec<(usize, usize)> = other
                .pre
                .map(|pre| (other_var, pre))
                .into_iter()
                .collect();
            trigger.extend(other.conditions.iter().map(|cond| (cond.var, cond.value)));
            trigger.sort_unstable();
            let implied = trigger
                .iter()
                .all(|pair| condition_pairs.binary_search(pair).is_ok());
            if implied {
                side_effects.push(LocalAssignment {
                    local_var: builder.global_to_local[&other_var],
                    value: other.post,
                });
            }
        }

        let label = TransitionLabel {
            op: op_no,
            conditions,
            side_effects,
        };

        match origin {
            Some(origin) if origin != target => {
                builder
                    .arcs
                    .entry((origin, target))
                    .or_default()
                    .push(label);
            }
            Some(_) => {}
            None => {
                for origin in 0..builder.domain_size {
                    if origin != target {
                        builder
                            .arcs
                            .entry((origin, target))
                            .or_default()
                            .push(label.clone());
                    }
                }
            }
        }
    }
}

/// Removes labels with duplicate or dominated conditions: among identical
/// condition sets only the cheapest survives, and a label is dropped when a
/// proper subset of its conditions is present at no higher cost. The subset
/// scan is bounded by [`MAX_DOMINANCE_CONDITIONS`]; larger labels are kept
/// as is (a missed reduction is harmless).
fn simplify_labels(
    labels: Vec<TransitionLabel>,
    cost_of: impl Fn(usize) -> Cost,
) -> Vec<TransitionLabel> {
    type Key = Vec<(usize, usize)>;
    let condition_key = |label: &TransitionLabel| -> Key {
        label
            .conditions
            .iter()
            .map(|cond| (cond.local_var, cond.value))
            .sorted()
            .collect()
    };

    let mut index: HashMap<Key, usize> = HashMap::new();
    for (label_no, label) in labels.iter().enumerate() {
        let key = condition_key(label);
        match index.get(&key) {
            Some(&existing) if cost_of(labels[existing].op) <= cost_of(label.op) => {}
            _ => {
                index.insert(key, label_no);
            }
        }
    }

    let mut kept = vec![];
    for (key, &label_no) in index.iter().sorted() {
        let mut dominated = false;
        if key.len() <= MAX_DOMINANCE_CONDITIONS {
            let subset_count = (1usize << key.len()) - 1;
            for mask in 0..subset_count {
                let subset: Key = key
                    .iter()
                    .enumerate()
                    .filter(|&(i, _)| mask & (1 << i) != 0)
                    .map(|(_, &pair)| pair)
                    .collect();
                if let Some(&dominator) = index.get(&subset) {
                    if cost_of(labels[dominator].op) <= cost_of(labels[label_no].op) {
                        dominated = true;
                        break;
                    }
                }
            }
        }
        if !dominated {
            kept.push(labels[label_no].clone());
        }
    }
    kept.sort_by_key(|label| label.op);
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn arc<'a>(
        dtg: &'a DomainTransitionGraph,
        origin: usize,
        target: usize,
    ) -> Option<&'a ValueTransition> {
        dtg.transitions[origin]
            .iter()
            .find(|transition| transition.target == target)
    }

    #[test]
    fn cea_task_dtgs() {
        let task = cea_task();
        let dtgs = DomainTransitionGraph::build_all(&task);

        // Variable a: 0 -> 1 (o1, free), 1 -> 2 (o2, conditioned on b=1).
        let dtg_a = &dtgs[0];
        assert_eq!(dtg_a.local_to_global, vec![1]);
        let free = arc(dtg_a, 0, 1).unwrap();
        assert_eq!(free.labels.len(), 1);
        assert!(free.labels[0].conditions.is_empty());
        let conditioned = arc(dtg_a, 1, 2).unwrap();
        assert_eq!(
            conditioned.labels[0].conditions,
            vec![LocalAssignment {
                local_var: 0,
                value: 1
            }]
        );

        // Variable b: 0 -> 1 (o3).
        let dtg_b = &dtgs[1];
        assert!(dtg_b.local_to_global.is_empty());
        assert!(arc(dtg_b, 0, 1).is_some());
        assert!(arc(dtg_b, 1, 0).is_none());
    }

    #[test]
    fn duplicate_labels_keep_cheapest() {
        let labels = vec![
            TransitionLabel {
                op: 0,
                conditions: vec![],
                side_effects: vec![],
            },
            TransitionLabel {
                op: 1,
                conditions: vec![],
                side_effects: vec![],
            },
        ];
        let costs = [5, 2];
        let kept = simplify_labels(labels, |op| costs[op]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].op, 1);
    }

    #[test]
    fn dominated_labels_are_pruned() {
        let unconditional = TransitionLabel {
            op: 0,
            conditions: vec![],
            side_effects: vec![],
        };
        let conditional = TransitionLabel {
            op: 1,
            conditions: vec![LocalAssignment {
                local_var: 0,
                value: 1,
            }],
            side_effects: vec![],
        };
        let kept = simplify_labels(vec![unconditional, conditional], |_| 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].op, 0);
    }
}
