use crate::parsers::{ParseError, TokenStream, EXPECTED_FILE_VERSION};
use crate::search::{
    axioms::AxiomEvaluator, states::State, Cost, Fact, Goal, Operator, INFINITY,
};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::info;

use crate::search::Variable;

/// The grounded task: variables, operators, axioms, initial state, goal and
/// mutex information. Constructed once at startup from the translator
/// output and shared immutably (via `Rc`) by every heuristic and engine.
#[derive(Debug)]
pub struct Task {
    pub variables: Vec<Variable>,
    pub operators: Vec<Operator>,
    pub axioms: Vec<Operator>,
    pub goal: Goal,
    pub use_metric: bool,
    pub min_action_cost: Cost,
    pub max_action_cost: Cost,
    /// Initial values after axiom evaluation.
    initial_values: Vec<usize>,
    /// `inconsistent_facts[var][value]`: facts mutex with (var, value).
    inconsistent_facts: Vec<Vec<HashSet<Fact>>>,
    axiom_evaluator: AxiomEvaluator,
}

impl Task {
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let text = fs::read_to_string(path).map_err(|err| ParseError::Invalid {
            line: 0,
            message: format!("cannot read {}: {err}", path.display()),
        })?;
        Self::from_text(&text)
    }

    pub fn from_text(text: &str) -> Result<Self, ParseError> {
        let mut tokens = TokenStream::new(text);
        let task = Self::read(&mut tokens)?;
        info!(
            variables = task.variables.len(),
            operators = task.operators.len(),
            axioms = task.axioms.len(),
            goal_facts = task.goal.len(),
            use_metric = task.use_metric,
            "task loaded"
        );
        Ok(task)
    }

    fn read(tokens: &mut TokenStream) -> Result<Self, ParseError> {
        read_version(tokens)?;
        let use_metric = read_metric(tokens)?;
        let variables = read_variables(tokens)?;
        let inconsistent_facts = read_mutexes(tokens, &variables)?;
        let raw_initial_values = read_initial_state(tokens, &variables)?;
        let goal = read_goal(tokens, &variables)?;
        let operators = read_operators(tokens, use_metric)?;
        let axioms = read_axioms(tokens)?;

        // The trailing sections are produced for the benefit of older
        // consumers; we validate their markers and rebuild the structures
        // from the operator set instead.
        skip_section(tokens, "begin_SG", "end_SG")?;
        for _ in 0..variables.len() {
            skip_section(tokens, "begin_DTG", "end_DTG")?;
        }
        skip_section(tokens, "begin_CG", "end_CG")?;

        let mut min_action_cost = INFINITY;
        let mut max_action_cost = 0;
        for op in &operators {
            min_action_cost = min_action_cost.min(op.cost());
            max_action_cost = max_action_cost.max(op.cost());
        }

        let axiom_evaluator = AxiomEvaluator::new(&variables, &axioms, &raw_initial_values);
        let mut initial_values = raw_initial_values;
        axiom_evaluator.evaluate(&mut initial_values);

        Ok(Self {
            variables,
            operators,
            axioms,
            goal,
            use_metric,
            min_action_cost,
            max_action_cost,
            initial_values,
            inconsistent_facts,
            axiom_evaluator,
        })
    }

    pub fn initial_state(&self) -> State {
        State::new(self.initial_values.clone())
    }

    /// Applies `op` to `state`. The operator must be applicable; checking is
    /// the caller's job. Effects whose conditions hold in the predecessor
    /// fire, then derived variables are re-closed.
    pub fn successor(&self, state: &State, op_id: usize) -> State {
        let op = &self.operators[op_id];
        debug_assert!(op.is_applicable(state), "operator must be applicable");
        let mut successor = state.clone();
        for pre_post in op.pre_post() {
            if pre_post.does_fire(state) {
                successor.values_mut()[pre_post.var] = pre_post.post;
            }
        }
        self.axiom_evaluator
            .evaluate(successor.values_mut());
        successor
    }

    /// Re-closes the derived variables of an arbitrary assignment.
    pub fn evaluate_axioms(&self, state: &mut State) {
        self.axiom_evaluator.evaluate(state.values_mut());
    }

    pub fn are_mutex(&self, a: Fact, b: Fact) -> bool {
        if a.var == b.var {
            return a.value != b.value;
        }
        self.inconsistent_facts[a.var][a.value].contains(&b)
    }

    pub fn has_axioms(&self) -> bool {
        !self.axioms.is_empty()
    }

    /// Whether any operator carries a conditional effect beyond the
    /// redundant encoding accepted for binary domains.
    pub fn has_conditional_effects(&self) -> bool {
        self.operators.iter().any(|op| {
            op.has_nontrivial_conditional_effect(|var| self.variables[var].domain_size)
        })
    }

    pub fn fact_name(&self, fact: Fact) -> &str {
        &self.variables[fact.var].fact_names[fact.value]
    }

    pub fn average_operator_cost(&self) -> f64 {
        if self.operators.is_empty() {
            return 0.0;
        }
        let total: i64 = self.operators.iter().map(|op| op.cost() as i64).sum();
        total as f64 / self.operators.len() as f64
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        domain_sizes: &[usize],
        operators: Vec<Operator>,
        initial_values: Vec<usize>,
        goal_facts: Vec<Fact>,
    ) -> Self {
        let variables: Vec<Variable> = domain_sizes
            .iter()
            .enumerate()
            .map(|(index, &domain_size)| Variable {
                index,
                name: format!("var{index}"),
                axiom_layer: None,
                domain_size,
                fact_names: (0..domain_size)
                    .map(|value| format!("Atom var{index}={value}"))
                    .collect(),
            })
            .collect();
        let inconsistent_facts = variables
            .iter()
            .map(|var| vec![HashSet::new(); var.domain_size])
            .collect();
        let mut min_action_cost = INFINITY;
        let mut max_action_cost = 0;
        for op in &operators {
            min_action_cost = min_action_cost.min(op.cost());
            max_action_cost = max_action_cost.max(op.cost());
        }
        let axiom_evaluator = AxiomEvaluator::new(&variables, &[], &initial_values);
        Self {
            variables,
            operators,
            axioms: vec![],
            goal: Goal::new(goal_facts),
            use_metric: true,
            min_action_cost,
            max_action_cost,
            initial_values,
            inconsistent_facts,
            axiom_evaluator,
        }
    }
}

fn read_version(tokens: &mut TokenStream) -> Result<(), ParseError> {
    tokens.check_magic("begin_version")?;
    let version = tokens.usize("file version")? as u32;
    tokens.check_magic("end_version")?;
    if version != EXPECTED_FILE_VERSION {
        return Err(ParseError::VersionMismatch {
            expected: EXPECTED_FILE_VERSION,
            found: version,
        });
    }
    Ok(())
}

fn read_metric(tokens: &mut TokenStream) -> Result<bool, ParseError> {
    tokens.check_magic("begin_metric")?;
    let metric = tokens.usize("metric flag")?;
    tokens.check_magic("end_metric")?;
    match metric {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(tokens.invalid(format!("metric flag must be 0 or 1, got {other}"))),
    }
}

fn read_variables(tokens: &mut TokenStream) -> Result<Vec<Variable>, ParseError> {
    let count = tokens.usize("variable count")?;
    let mut variables = Vec::with_capacity(count);
    for index in 0..count {
        tokens.check_magic("begin_variable")?;
        let name = tokens.token("variable name")?.to_string();
        let layer = tokens.i64("axiom layer")?;
        let axiom_layer = match layer {
            -1 => None,
            layer if layer >= 0 => Some(layer as usize),
            _ => return Err(tokens.invalid(format!("axiom layer {layer} out of range"))),
        };
        let domain_size = tokens.usize("domain size")?;
        if domain_size < 1 {
            return Err(tokens.invalid(format!("variable {name} has empty domain")));
        }
        let mut fact_names = Vec::with_capacity(domain_size);
        for _ in 0..domain_size {
            fact_names.push(tokens.rest_of_line("fact name")?.to_string());
        }
        tokens.check_magic("end_variable")?;
        variables.push(Variable {
            index,
            name,
            axiom_layer,
            domain_size,
            fact_names,
        });
    }
    Ok(variables)
}

fn read_fact(
    tokens: &mut TokenStream,
    variables: &[Variable],
    what: &str,
) -> Result<Fact, ParseError> {
    let var = tokens.usize(what)?;
    let value = tokens.usize(what)?;
    if var >= variables.len() {
        return Err(tokens.invalid(format!("{what}: variable {var} out of range")));
    }
    if value >= variables[var].domain_size {
        return Err(tokens.invalid(format!(
            "{what}: value {value} out of range for variable {var}"
        )));
    }
    Ok(Fact::new(var, value))
}

fn read_mutexes(
    tokens: &mut TokenStream,
    variables: &[Variable],
) -> Result<Vec<Vec<HashSet<Fact>>>, ParseError> {
    let mut inconsistent_facts: Vec<Vec<HashSet<Fact>>> = variables
        .iter()
        .map(|var| vec![HashSet::new(); var.domain_size])
        .collect();
    let group_count = tokens.usize("mutex group count")?;
    for _ in 0..group_count {
        tokens.check_magic("begin_mutex_group")?;
        let fact_count = tokens.usize("mutex group size")?;
        let mut group = Vec::with_capacity(fact_count);
        for _ in 0..fact_count {
            group.push(read_fact(tokens, variables, "mutex fact")?);
        }
        tokens.check_magic("end_mutex_group")?;
        for &a in &group {
            for &b in &group {
                if a != b {
                    inconsistent_facts[a.var][a.value].insert(b);
                }
            }
        }
    }
    Ok(inconsistent_facts)
}

fn read_initial_state(
    tokens: &mut TokenStream,
    variables: &[Variable],
) -> Result<Vec<usize>, ParseError> {
    tokens.check_magic("begin_state")?;
    let mut values = Vec::with_capacity(variables.len());
    for var in variables {
        let value = tokens.usize("initial state value")?;
        if value >= var.domain_size {
            return Err(tokens.invalid(format!(
                "initial value {value} out of range for variable {}",
                var.name
            )));
        }
        values.push(value);
    }
    tokens.check_magic("end_state")?;
    Ok(values)
}

fn read_goal(tokens: &mut TokenStream, variables: &[Variable]) -> Result<Goal, ParseError> {
    tokens.check_magic("begin_goal")?;
    let count = tokens.usize("goal fact count")?;
    let mut facts = Vec::with_capacity(count);
    for _ in 0..count {
        facts.push(read_fact(tokens, variables, "goal fact")?);
    }
    tokens.check_magic("end_goal")?;
    Ok(Goal::new(facts))
}

fn read_operators(
    tokens: &mut TokenStream,
    use_metric: bool,
) -> Result<Vec<Operator>, ParseError> {
    let count = tokens.usize("operator count")?;
    let mut operators = Vec::with_capacity(count);
    for _ in 0..count {
        operators.push(Operator::read(tokens, use_metric)?);
    }
    Ok(operators)
}

fn read_axioms(tokens: &mut TokenStream) -> Result<Vec<Operator>, ParseError> {
    let count = tokens.usize("axiom count")?;
    let mut axioms = Vec::with_capacity(count);
    for _ in 0..count {
        axioms.push(Operator::read_axiom(tokens)?);
    }
    Ok(axioms)
}

fn skip_section(tokens: &mut TokenStream, begin: &str, end: &str) -> Result<(), ParseError> {
    tokens.check_magic(begin)?;
    loop {
        let token = tokens.token(end)?;
        if token == end {
            return Ok(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn reachability_task_shape() {
        let task = reachability_task();
        assert_eq!(task.variables.len(), 2);
        assert_eq!(task.operators.len(), 2);
        assert!(task.axioms.is_empty());
        assert_eq!(task.goal.len(), 2);
        assert_eq!(task.initial_state().values(), &[0, 0]);
        assert_eq!(task.min_action_cost, 1);
        assert_eq!(task.max_action_cost, 1);
        assert!(!task.has_axioms());
        assert!(!task.has_conditional_effects());
    }

    #[test]
    fn version_mismatch_is_fatal() {
        let text = REACHABILITY_TEXT.replacen("3", "2", 1);
        let err = Task::from_text(&text).unwrap_err();
        assert_eq!(
            err,
            ParseError::VersionMismatch {
                expected: 3,
                found: 2
            }
        );
    }

    #[test]
    fn magic_mismatch_is_fatal() {
        let text = REACHABILITY_TEXT.replacen("begin_goal", "begin_gaol", 1);
        assert!(matches!(
            Task::from_text(&text).unwrap_err(),
            ParseError::MagicMismatch { .. }
        ));
    }

    #[test]
    fn successor_application_is_deterministic() {
        let task = reachability_task();
        let state = task.initial_state();
        let op = 0;
        assert!(task.operators[op].is_applicable(&state));
        let a = task.successor(&state, op);
        let b = task.successor(&state, op);
        assert_eq!(a, b);
        assert_eq!(a.values(), &[1, 0]);
    }

    #[test]
    fn metric_zero_forces_unit_costs() {
        let task = Task::from_text(WEIGHTED_UNIT_METRIC_TEXT).unwrap();
        assert!(task.operators.iter().all(|op| op.cost() == 1));
    }

    #[test]
    fn mutex_lookup() {
        let task = Task::from_text(MUTEX_TEXT).unwrap();
        assert!(task.are_mutex(Fact::new(0, 0), Fact::new(0, 1)));
        assert!(task.are_mutex(Fact::new(0, 1), Fact::new(1, 1)));
        assert!(!task.are_mutex(Fact::new(0, 0), Fact::new(1, 0)));
    }

    #[test]
    fn axiom_evaluation_reaches_fixed_point() {
        let task = Task::from_text(AXIOM_TEXT).unwrap();
        // The derived variable is closed in the initial state.
        let state = task.initial_state();
        assert_eq!(state[1], 1);

        // Idempotence: re-evaluating does not change anything.
        let mut again = state.clone();
        task.evaluate_axioms(&mut again);
        assert_eq!(again, state);

        // Applying the operator flips the primary variable and the derived
        // variable follows.
        let successor = task.successor(&state, 0);
        assert_eq!(successor[0], 1);
        assert_eq!(successor[1], 0);
    }
}
