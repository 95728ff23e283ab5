//! A plan is the sequence of operators leading from the initial state to a
//! goal state, written out one parenthesised operator name per line.

use crate::search::{Cost, OperatorId, Task};
use std::io::Write;
use std::ops::Deref;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Plan {
    steps: Vec<OperatorId>,
}

impl Plan {
    pub fn empty() -> Self {
        Self { steps: vec![] }
    }

    pub fn new(steps: Vec<OperatorId>) -> Self {
        Self { steps }
    }

    pub fn steps(&self) -> &[OperatorId] {
        &self.steps
    }

    pub fn push(&mut self, op: OperatorId) {
        self.steps.push(op);
    }

    pub fn extend(&mut self, other: Plan) {
        self.steps.extend(other.steps);
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn cost(&self, task: &Task) -> Cost {
        self.steps
            .iter()
            .map(|&op| task.operators[op].cost())
            .sum()
    }

    pub fn to_text(&self, task: &Task) -> String {
        let mut text = String::new();
        for &op in &self.steps {
            text.push('(');
            text.push_str(task.operators[op].name());
            text.push_str(")\n");
        }
        text
    }

    /// Writes the plan file and logs its length and cost.
    pub fn write(&self, path: &Path, task: &Task) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        file.write_all(self.to_text(task).as_bytes())?;
        info!(
            length = self.len(),
            cost = self.cost(task),
            path = %path.display(),
            "plan written"
        );
        Ok(())
    }
}

impl Deref for Plan {
    type Target = [OperatorId];

    fn deref(&self) -> &Self::Target {
        &self.steps
    }
}

impl IntoIterator for Plan {
    type Item = OperatorId;
    type IntoIter = std::vec::IntoIter<OperatorId>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.into_iter()
    }
}
