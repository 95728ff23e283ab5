//! Translator-output fixtures shared by the unit tests. Kept tiny so the
//! expected heuristic values and plans can be verified by hand.

use crate::search::Task;

/// Two independent binary variables, both initially 0, goal `x=1 & y=1`,
/// unit-cost operators `o1: x -> 1` and `o2: y -> 1`.
pub const REACHABILITY_TEXT: &str = "\
begin_version
3
end_version
begin_metric
0
end_metric
2
begin_variable
var0
-1
2
Atom x=0
Atom x=1
end_variable
begin_variable
var1
-1
2
Atom y=0
Atom y=1
end_variable
0
begin_state
0
0
end_state
begin_goal
2
0 1
1 1
end_goal
2
begin_operator
o1
0
1
0 0 0 1
1
end_operator
begin_operator
o2
0
1
0 1 0 1
1
end_operator
0
begin_SG
end_SG
begin_DTG
end_DTG
begin_DTG
end_DTG
begin_CG
end_CG
";

/// `a` in {0,1,2}, `b` in {0,1}; `o1: a 0->1`, `o2: a 1->2` with prevail
/// `b=1`, `o3: b 0->1`. Initial `a=0, b=0`, goal `a=2`. Any plan needs o3
/// before o2.
pub const CEA_TEXT: &str = "\
begin_version
3
end_version
begin_metric
0
end_metric
2
begin_variable
var0
-1
3
Atom a=0
Atom a=1
Atom a=2
end_variable
begin_variable
var1
-1
2
Atom b=0
Atom b=1
end_variable
0
begin_state
0
0
end_state
begin_goal
1
0 2
end_goal
3
begin_operator
o1
0
1
0 0 0 1
1
end_operator
begin_operator
o2
1
1 1
1
0 0 1 2
1
end_operator
begin_operator
o3
0
1
0 1 0 1
1
end_operator
0
begin_SG
end_SG
begin_DTG
end_DTG
begin_DTG
end_DTG
begin_CG
end_CG
";

/// Like [`CEA_TEXT`] but every operator writing `a` prevails on `b=0`, and
/// `b` can only move 0 -> 1. Any state with `b=1` is a dead end for the
/// goal `a=2` (unless `a` already passed).
pub const DEADEND_TEXT: &str = "\
begin_version
3
end_version
begin_metric
0
end_metric
2
begin_variable
var0
-1
3
Atom a=0
Atom a=1
Atom a=2
end_variable
begin_variable
var1
-1
2
Atom b=0
Atom b=1
end_variable
0
begin_state
0
0
end_state
begin_goal
1
0 2
end_goal
3
begin_operator
o1
1
1 0
1
0 0 0 1
1
end_operator
begin_operator
o2
1
1 0
1
0 0 1 2
1
end_operator
begin_operator
o3
0
1
0 1 0 1
1
end_operator
0
begin_SG
end_SG
begin_DTG
end_DTG
begin_DTG
end_DTG
begin_CG
end_CG
";

/// One ternary variable cycling 0 -> 1 -> 2 -> 0, goal `a=2`.
pub const CYCLE_TEXT: &str = "\
begin_version
3
end_version
begin_metric
0
end_metric
1
begin_variable
var0
-1
3
Atom a=0
Atom a=1
Atom a=2
end_variable
0
begin_state
0
end_state
begin_goal
1
0 2
end_goal
3
begin_operator
o01
0
1
0 0 0 1
1
end_operator
begin_operator
o12
0
1
0 0 1 2
1
end_operator
begin_operator
o20
0
1
0 0 2 0
1
end_operator
0
begin_SG
end_SG
begin_DTG
end_DTG
begin_CG
end_CG
";

/// Two independent chain variables: `a` needs 3 steps to its goal value,
/// `b` needs 4. Used by the canonical-PDB tests.
pub const CHAINS_TEXT: &str = "\
begin_version
3
end_version
begin_metric
0
end_metric
2
begin_variable
var0
-1
4
Atom a=0
Atom a=1
Atom a=2
Atom a=3
end_variable
begin_variable
var1
-1
5
Atom b=0
Atom b=1
Atom b=2
Atom b=3
Atom b=4
end_variable
0
begin_state
0
0
end_state
begin_goal
2
0 3
1 4
end_goal
7
begin_operator
a01
0
1
0 0 0 1
1
end_operator
begin_operator
a12
0
1
0 0 1 2
1
end_operator
begin_operator
a23
0
1
0 0 2 3
1
end_operator
begin_operator
b01
0
1
0 1 0 1
1
end_operator
begin_operator
b12
0
1
0 1 1 2
1
end_operator
begin_operator
b23
0
1
0 1 2 3
1
end_operator
begin_operator
b34
0
1
0 1 3 4
1
end_operator
0
begin_SG
end_SG
begin_DTG
end_DTG
begin_DTG
end_DTG
begin_CG
end_CG
";

/// One truck shuttling between two locations and two packages: `t` in
/// {A, B}, `p1`/`p2` in {at A, in truck, at B}. Loading requires the truck
/// at A, unloading at B; goal: both packages at B. Optimal plans have five
/// steps (load both, drive, unload both).
pub const TRUCK_TEXT: &str = "\
begin_version
3
end_version
begin_metric
0
end_metric
3
begin_variable
var0
-1
2
Atom t=a
Atom t=b
end_variable
begin_variable
var1
-1
3
Atom p1=a
Atom p1=t
Atom p1=b
end_variable
begin_variable
var2
-1
3
Atom p2=a
Atom p2=t
Atom p2=b
end_variable
0
begin_state
0
0
0
end_state
begin_goal
2
1 2
2 2
end_goal
6
begin_operator
drive-ab
0
1
0 0 0 1
1
end_operator
begin_operator
drive-ba
0
1
0 0 1 0
1
end_operator
begin_operator
load1
1
0 0
1
0 1 0 1
1
end_operator
begin_operator
unload1
1
0 1
1
0 1 1 2
1
end_operator
begin_operator
load2
1
0 0
1
0 2 0 1
1
end_operator
begin_operator
unload2
1
0 1
1
0 2 1 2
1
end_operator
0
begin_SG
end_SG
begin_DTG
end_DTG
begin_DTG
end_DTG
begin_DTG
end_DTG
begin_CG
end_CG
";

/// A task with a mutex group between `x=1` and `y=1`.
pub const MUTEX_TEXT: &str = "\
begin_version
3
end_version
begin_metric
0
end_metric
2
begin_variable
var0
-1
2
Atom x=0
Atom x=1
end_variable
begin_variable
var1
-1
2
Atom y=0
Atom y=1
end_variable
1
begin_mutex_group
2
0 1
1 1
end_mutex_group
begin_state
0
0
end_state
begin_goal
1
0 1
end_goal
1
begin_operator
o1
0
1
0 0 0 1
1
end_operator
0
begin_SG
end_SG
begin_DTG
end_DTG
begin_DTG
end_DTG
begin_CG
end_CG
";

/// A primary binary variable and one derived variable on axiom layer 0
/// that holds exactly while `x=0`.
pub const AXIOM_TEXT: &str = "\
begin_version
3
end_version
begin_metric
0
end_metric
2
begin_variable
var0
-1
2
Atom x=0
Atom x=1
end_variable
begin_variable
var1
0
2
NegatedAtom d
Atom d
end_variable
0
begin_state
0
0
end_state
begin_goal
1
0 1
end_goal
1
begin_operator
o1
0
1
0 0 0 1
1
end_operator
1
begin_rule
1
0 0
1 0 1
end_rule
begin_SG
end_SG
begin_DTG
end_DTG
begin_DTG
end_DTG
begin_CG
end_CG
";

/// Metric flag 0 with a written cost of 5: costs must be read as 1.
pub const WEIGHTED_UNIT_METRIC_TEXT: &str = "\
begin_version
3
end_version
begin_metric
0
end_metric
1
begin_variable
var0
-1
2
Atom x=0
Atom x=1
end_variable
0
begin_state
0
end_state
begin_goal
1
0 1
end_goal
1
begin_operator
o1
0
1
0 0 0 1
5
end_operator
0
begin_SG
end_SG
begin_DTG
end_DTG
begin_CG
end_CG
";

/// Action costs honored: `cheap` costs 1 but needs two steps, `direct`
/// costs 5.
pub const WEIGHTED_TEXT: &str = "\
begin_version
3
end_version
begin_metric
1
end_metric
1
begin_variable
var0
-1
3
Atom a=0
Atom a=1
Atom a=2
end_variable
0
begin_state
0
end_state
begin_goal
1
0 2
end_goal
3
begin_operator
cheap1
0
1
0 0 0 1
1
end_operator
begin_operator
cheap2
0
1
0 0 1 2
1
end_operator
begin_operator
direct
0
1
0 0 0 2
5
end_operator
0
begin_SG
end_SG
begin_DTG
end_DTG
begin_CG
end_CG
";

pub fn reachability_task() -> Task {
    Task::from_text(REACHABILITY_TEXT).unwrap()
}

pub fn cea_task() -> Task {
    Task::from_text(CEA_TEXT).unwrap()
}

pub fn deadend_task() -> Task {
    Task::from_text(DEADEND_TEXT).unwrap()
}

pub fn cycle_task() -> Task {
    Task::from_text(CYCLE_TEXT).unwrap()
}

pub fn chains_task() -> Task {
    Task::from_text(CHAINS_TEXT).unwrap()
}

pub fn weighted_task() -> Task {
    Task::from_text(WEIGHTED_TEXT).unwrap()
}

pub fn truck_task() -> Task {
    Task::from_text(TRUCK_TEXT).unwrap()
}
