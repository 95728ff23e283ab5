use crate::parsers::{ParseError, TokenStream};
use crate::search::{states::State, Cost, Fact};
use smallvec::SmallVec;

pub type OperatorId = usize;

/// A value that must hold in the predecessor and is preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Prevail {
    pub var: usize,
    pub value: usize,
}

impl Prevail {
    pub fn is_applicable(&self, state: &State) -> bool {
        state[self.var] == self.value
    }

    pub fn fact(&self) -> Fact {
        Fact::new(self.var, self.value)
    }

    fn read(tokens: &mut TokenStream) -> Result<Self, ParseError> {
        let var = tokens.usize("prevail variable")?;
        let value = tokens.usize("prevail value")?;
        Ok(Self { var, value })
    }
}

/// An effect on one variable: optional precondition value, new value, and a
/// conjunction of effect conditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrePost {
    pub var: usize,
    /// `None` means the effect fires regardless of the previous value.
    pub pre: Option<usize>,
    pub post: usize,
    pub conditions: SmallVec<[Prevail; 2]>,
}

impl PrePost {
    pub fn is_applicable(&self, state: &State) -> bool {
        match self.pre {
            None => true,
            Some(pre) => state[self.var] == pre,
        }
    }

    /// Whether the effect conditions hold in `state`.
    pub fn does_fire(&self, state: &State) -> bool {
        self.conditions
            .iter()
            .all(|condition| condition.is_applicable(state))
    }

    fn read(tokens: &mut TokenStream) -> Result<Self, ParseError> {
        let condition_count = tokens.usize("effect condition count")?;
        let mut conditions = SmallVec::new();
        for _ in 0..condition_count {
            conditions.push(Prevail::read(tokens)?);
        }
        let var = tokens.usize("effect variable")?;
        let pre = tokens.i64("effect precondition value")?;
        let post = tokens.usize("effect value")?;
        let pre = match pre {
            -1 => None,
            value if value >= 0 => Some(value as usize),
            _ => {
                return Err(tokens.invalid(format!(
                    "effect precondition value {pre} out of range"
                )))
            }
        };
        Ok(Self {
            var,
            pre,
            post,
            conditions,
        })
    }
}

/// A grounded operator (or axiom rule: cost 0, single pre-post). Within one
/// operator there is at most one effect per variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operator {
    name: String,
    is_axiom: bool,
    prevail: Vec<Prevail>,
    pre_post: Vec<PrePost>,
    cost: Cost,
}

impl Operator {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_axiom(&self) -> bool {
        self.is_axiom
    }

    pub fn prevail(&self) -> &[Prevail] {
        &self.prevail
    }

    pub fn pre_post(&self) -> &[PrePost] {
        &self.pre_post
    }

    pub fn cost(&self) -> Cost {
        self.cost
    }

    pub fn is_applicable(&self, state: &State) -> bool {
        self.prevail
            .iter()
            .all(|prevail| prevail.is_applicable(state))
            && self
                .pre_post
                .iter()
                .all(|pre_post| pre_post.is_applicable(state))
    }

    /// All precondition facts: prevails plus defined effect preconditions.
    /// Effect conditions are not included.
    pub fn precondition_facts(&self) -> impl Iterator<Item = Fact> + '_ {
        self.prevail.iter().map(Prevail::fact).chain(
            self.pre_post.iter().filter_map(|pre_post| {
                pre_post.pre.map(|pre| Fact::new(pre_post.var, pre))
            }),
        )
    }

    /// Whether the operator has a conditional effect beyond the redundant
    /// single-condition encoding of binary-domain effects the translator
    /// sometimes emits.
    pub fn has_nontrivial_conditional_effect(&self, domain_size: impl Fn(usize) -> usize) -> bool {
        self.pre_post.iter().any(|pre_post| {
            if pre_post.conditions.is_empty() {
                return false;
            }
            !(pre_post.pre.is_none()
                && pre_post.conditions.len() == 1
                && pre_post.conditions[0].var == pre_post.var
                && pre_post.conditions[0].value != pre_post.post
                && domain_size(pre_post.var) == 2)
        })
    }

    pub(crate) fn read(
        tokens: &mut TokenStream,
        use_metric: bool,
    ) -> Result<Self, ParseError> {
        tokens.check_magic("begin_operator")?;
        let name = tokens.rest_of_line("operator name")?.to_string();
        let prevail_count = tokens.usize("prevail count")?;
        let mut prevail = Vec::with_capacity(prevail_count);
        for _ in 0..prevail_count {
            prevail.push(Prevail::read(tokens)?);
        }
        let pre_post_count = tokens.usize("pre-post count")?;
        let mut pre_post = Vec::with_capacity(pre_post_count);
        for _ in 0..pre_post_count {
            pre_post.push(PrePost::read(tokens)?);
        }
        let cost = tokens.i64("operator cost")?;
        if cost < 0 {
            return Err(tokens.invalid(format!("negative operator cost {cost}")));
        }
        let cost = if use_metric { cost as Cost } else { 1 };
        tokens.check_magic("end_operator")?;
        Ok(Self {
            name,
            is_axiom: false,
            prevail,
            pre_post,
            cost,
        })
    }

    pub(crate) fn read_axiom(tokens: &mut TokenStream) -> Result<Self, ParseError> {
        tokens.check_magic("begin_rule")?;
        let pre_post = PrePost::read(tokens)?;
        tokens.check_magic("end_rule")?;
        Ok(Self {
            name: "<axiom>".to_string(),
            is_axiom: true,
            prevail: vec![],
            pre_post: vec![pre_post],
            cost: 0,
        })
    }

    #[cfg(test)]
    pub(crate) fn for_tests(
        name: &str,
        prevail: Vec<Prevail>,
        pre_post: Vec<PrePost>,
        cost: Cost,
    ) -> Self {
        Self {
            name: name.to_string(),
            is_axiom: false,
            prevail,
            pre_post,
            cost,
        }
    }
}
