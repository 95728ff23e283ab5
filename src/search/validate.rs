use crate::search::{Plan, Task};
use tracing::error;

/// Replays `plan` from the initial state, checking applicability of every
/// step and goal satisfaction at the end.
pub fn validate(task: &Task, plan: &Plan) -> bool {
    let mut state = task.initial_state();
    for (step_no, &op) in plan.steps().iter().enumerate() {
        if op >= task.operators.len() {
            error!(step_no, op, "plan step references an unknown operator");
            return false;
        }
        if !task.operators[op].is_applicable(&state) {
            error!(
                step_no,
                operator = task.operators[op].name(),
                "plan step is not applicable"
            );
            return false;
        }
        state = task.successor(&state, op);
    }
    if !task.goal.is_satisfied(&state) {
        error!("plan does not reach the goal");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn accepts_correct_plans() {
        let task = cea_task();
        assert!(validate(&task, &Plan::new(vec![0, 2, 1])));
    }

    #[test]
    fn rejects_misordered_plans() {
        // o2 needs b=1, so o3 must come first.
        let task = cea_task();
        assert!(!validate(&task, &Plan::new(vec![0, 1, 2])));
    }

    #[test]
    fn rejects_incomplete_plans() {
        let task = cea_task();
        assert!(!validate(&task, &Plan::new(vec![0, 2])));
    }
}
