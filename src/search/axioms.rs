use crate::search::{Fact, Operator, Variable};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
struct AxiomRule {
    condition_count: usize,
    effect: Fact,
}

/// Layered evaluator for derived variables: forward-chaining Horn
/// propagation within a layer, negation-by-failure defaults between layers.
/// The result is a unique fixed point determined by the primary-variable
/// values.
#[derive(Debug)]
pub struct AxiomEvaluator {
    rules: Vec<AxiomRule>,
    /// `condition_of[var][value]`: indices of rules conditioned on the fact.
    condition_of: Vec<Vec<Vec<usize>>>,
    /// Per layer (except the last), the derived variables whose default
    /// value is re-asserted by negation by failure.
    nbf_vars_by_layer: Vec<Vec<usize>>,
    axiom_layers: Vec<Option<usize>>,
    default_values: Vec<usize>,
}

impl AxiomEvaluator {
    /// `default_values` are the pre-evaluation initial-state values; for
    /// derived variables these are the negation-by-failure defaults.
    pub fn new(variables: &[Variable], axioms: &[Operator], default_values: &[usize]) -> Self {
        let mut condition_of: Vec<Vec<Vec<usize>>> = variables
            .iter()
            .map(|var| vec![vec![]; var.domain_size])
            .collect();

        let mut rules = Vec::with_capacity(axioms.len());
        for (rule_no, axiom) in axioms.iter().enumerate() {
            debug_assert!(axiom.is_axiom() && axiom.pre_post().len() == 1);
            let pre_post = &axiom.pre_post()[0];
            rules.push(AxiomRule {
                condition_count: pre_post.conditions.len(),
                effect: Fact::new(pre_post.var, pre_post.post),
            });
            for condition in &pre_post.conditions {
                condition_of[condition.var][condition.value].push(rule_no);
            }
        }

        let last_layer = variables
            .iter()
            .filter_map(|var| var.axiom_layer)
            .max();
        let mut nbf_vars_by_layer = match last_layer {
            Some(last) => vec![vec![]; last + 1],
            None => vec![],
        };
        for var in variables {
            if let (Some(layer), Some(last)) = (var.axiom_layer, last_layer) {
                if layer != last {
                    nbf_vars_by_layer[layer].push(var.index);
                }
            }
        }

        Self {
            rules,
            condition_of,
            nbf_vars_by_layer,
            axiom_layers: variables.iter().map(|var| var.axiom_layer).collect(),
            default_values: default_values.to_vec(),
        }
    }

    /// Closes the derived variables of `values` in place.
    pub fn evaluate(&self, values: &mut [usize]) {
        if self.rules.is_empty() && self.nbf_vars_by_layer.is_empty() {
            return;
        }

        let mut queue: VecDeque<Fact> = VecDeque::new();
        for (var, layer) in self.axiom_layers.iter().enumerate() {
            if layer.is_some() {
                values[var] = self.default_values[var];
            } else {
                queue.push_back(Fact::new(var, values[var]));
            }
        }

        let mut unsatisfied: Vec<usize> = self
            .rules
            .iter()
            .map(|rule| rule.condition_count)
            .collect();
        for rule in &self.rules {
            // Trivial rules fire immediately.
            if rule.condition_count == 0 && values[rule.effect.var] != rule.effect.value {
                values[rule.effect.var] = rule.effect.value;
                queue.push_back(rule.effect);
            }
        }

        let layer_count = self.nbf_vars_by_layer.len().max(1);
        for layer_no in 0..layer_count {
            while let Some(fact) = queue.pop_front() {
                for &rule_no in &self.condition_of[fact.var][fact.value] {
                    unsatisfied[rule_no] -= 1;
                    if unsatisfied[rule_no] == 0 {
                        let effect = self.rules[rule_no].effect;
                        if values[effect.var] != effect.value {
                            values[effect.var] = effect.value;
                            queue.push_back(effect);
                        }
                    }
                }
            }

            if let Some(nbf_vars) = self.nbf_vars_by_layer.get(layer_no) {
                for &var in nbf_vars {
                    if values[var] == self.default_values[var] {
                        queue.push_back(Fact::new(var, values[var]));
                    }
                }
            }
        }
    }
}
