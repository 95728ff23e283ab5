use crate::search::{
    heuristics::{ConfigError, Heuristic, HeuristicValue},
    pdbs::{compute_max_cliques, PatternDatabaseHeuristic},
    states::State,
    Cost, Task,
};
use itertools::Itertools;
use std::rc::Rc;
use tracing::{debug, info};

/// Canonical heuristic over a PDB collection: the maximum over all maximal
/// additive cliques of the summed member values. Two patterns are additive
/// iff no operator affects variables of both.
#[derive(Debug)]
pub struct CanonicalPdbsHeuristic {
    task: Rc<Task>,
    pdbs: Vec<PatternDatabaseHeuristic>,
    /// `are_additive[u][v]`: no operator writes both variables.
    are_additive: Vec<Vec<bool>>,
    /// Maximal cliques of the pattern compatibility graph, as indices into
    /// `pdbs`.
    max_cliques: Vec<Vec<usize>>,
    pdb_max_size: usize,
}

impl CanonicalPdbsHeuristic {
    pub fn new(
        task: Rc<Task>,
        patterns: Vec<Vec<usize>>,
        pdb_max_size: usize,
    ) -> Result<Self, ConfigError> {
        if patterns.is_empty() {
            return Err(ConfigError::Invalid(
                "a pattern collection needs at least one pattern".to_string(),
            ));
        }
        let pdbs = patterns
            .into_iter()
            .map(|pattern| PatternDatabaseHeuristic::new(task.clone(), pattern, pdb_max_size))
            .collect::<Result<Vec<_>, _>>()?;

        let are_additive = compute_additive_vars(&task);
        let mut heuristic = Self {
            task,
            pdbs,
            are_additive,
            max_cliques: vec![],
            pdb_max_size,
        };
        heuristic.compute_max_cliques();
        info!(
            pdbs = heuristic.pdbs.len(),
            cliques = heuristic.max_cliques.len(),
            "canonical PDB collection built"
        );
        Ok(heuristic)
    }

    pub fn pattern_databases(&self) -> &[PatternDatabaseHeuristic] {
        &self.pdbs
    }

    /// Total number of abstract states across the collection.
    pub fn size(&self) -> usize {
        self.pdbs.iter().map(PatternDatabaseHeuristic::size).sum()
    }

    fn are_patterns_additive(&self, pattern1: &[usize], pattern2: &[usize]) -> bool {
        pattern1
            .iter()
            .all(|&u| pattern2.iter().all(|&v| self.are_additive[u][v]))
    }

    fn compute_max_cliques(&mut self) {
        let mut graph: Vec<Vec<usize>> = vec![vec![]; self.pdbs.len()];
        for i in 0..self.pdbs.len() {
            for j in i + 1..self.pdbs.len() {
                if self.are_patterns_additive(self.pdbs[i].pattern(), self.pdbs[j].pattern()) {
                    graph[i].push(j);
                    graph[j].push(i);
                }
            }
        }
        self.max_cliques = compute_max_cliques(&graph);
        debug!(cliques = ?self.max_cliques, "compatibility cliques recomputed");
    }

    /// Adds a pattern to the collection and rebuilds the cliques.
    pub fn add_pattern(&mut self, pattern: Vec<usize>) -> Result<(), ConfigError> {
        self.pdbs.push(PatternDatabaseHeuristic::new(
            self.task.clone(),
            pattern,
            self.pdb_max_size,
        )?);
        self.compute_max_cliques();
        Ok(())
    }

    /// For every maximal clique, the members additive with `pattern`
    /// (non-empty subsets only). Used to estimate the marginal value of a
    /// candidate pattern.
    pub fn max_additive_subsets(&self, pattern: &[usize]) -> Vec<Vec<usize>> {
        let mut subsets = vec![];
        for clique in &self.max_cliques {
            let subset: Vec<usize> = clique
                .iter()
                .copied()
                .filter(|&member| {
                    self.are_patterns_additive(pattern, self.pdbs[member].pattern())
                })
                .collect();
            if !subset.is_empty() {
                subsets.push(subset);
            }
        }
        subsets
    }

    /// The canonical value, or `None` when any member proves a dead end.
    pub fn lookup(&self, state: &State) -> Option<Cost> {
        let values: Vec<Option<Cost>> = self
            .pdbs
            .iter()
            .map(|pdb| pdb.lookup(state))
            .collect();
        let mut best = 0;
        for clique in &self.max_cliques {
            let mut sum = 0;
            for &member in clique {
                // A dead end under any projection is a real dead end.
                sum += values[member]?;
            }
            best = best.max(sum);
        }
        Some(best)
    }

    /// Drops every pattern that is a subset of another pattern in the
    /// collection; subset patterns never contribute beyond their superset.
    pub fn dominance_pruning(&mut self) {
        let patterns: Vec<Vec<usize>> = self
            .pdbs
            .iter()
            .map(|pdb| pdb.pattern().to_vec())
            .collect();
        let dominated = |i: usize| {
            patterns.iter().enumerate().any(|(j, other)| {
                i != j
                    && patterns[i].len() <= other.len()
                    && patterns[i].iter().all(|var| other.contains(var))
                    && (patterns[i].len() < other.len() || i > j)
            })
        };
        let keep: Vec<bool> = (0..self.pdbs.len()).map(|i| !dominated(i)).collect();
        if keep.iter().all(|&k| k) {
            return;
        }
        let pruned = keep.iter().filter(|&&k| !k).count();
        info!(pruned, "dominance pruning removed subset patterns");
        let mut index = 0;
        self.pdbs.retain(|_| {
            let kept = keep[index];
            index += 1;
            kept
        });
        self.compute_max_cliques();
    }
}

impl Heuristic for CanonicalPdbsHeuristic {
    fn evaluate(&mut self, state: &State) -> HeuristicValue {
        match self.lookup(state) {
            Some(value) => HeuristicValue::Estimate(value),
            None => HeuristicValue::DeadEnd,
        }
    }
}

fn compute_additive_vars(task: &Task) -> Vec<Vec<bool>> {
    let num_vars = task.variables.len();
    let mut are_additive = vec![vec![true; num_vars]; num_vars];
    for op in &task.operators {
        for (e1, e2) in op
            .pre_post()
            .iter()
            .cartesian_product(op.pre_post().iter())
            .map(|(e1, e2)| (e1.var, e2.var))
        {
            are_additive[e1][e2] = false;
        }
    }
    are_additive
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn max_over_additive_cliques() {
        let task = Rc::new(chains_task());
        let mut canonical = CanonicalPdbsHeuristic::new(
            task.clone(),
            vec![vec![0], vec![1], vec![0, 1]],
            1_000_000,
        )
        .unwrap();

        // [a] and [b] are additive (no operator touches both); [a, b]
        // shares operators with each of them. Cliques: {[a], [b]} and
        // {[a, b]}. Values on the initial state: 3, 4 and 7.
        assert_eq!(canonical.max_cliques.len(), 2);
        assert_eq!(
            canonical.evaluate(&task.initial_state()),
            HeuristicValue::Estimate(7)
        );

        // Part-way through the b chain the joint pattern loses to the sum.
        assert_eq!(
            canonical.evaluate(&State::new(vec![0, 3])),
            HeuristicValue::Estimate(4)
        );
    }

    #[test]
    fn singleton_collection() {
        let task = Rc::new(chains_task());
        let mut canonical =
            CanonicalPdbsHeuristic::new(task.clone(), vec![vec![0]], 1_000_000).unwrap();
        assert_eq!(
            canonical.evaluate(&task.initial_state()),
            HeuristicValue::Estimate(3)
        );
    }

    #[test]
    fn dead_end_member_wins() {
        let task = Rc::new(deadend_task());
        let mut canonical =
            CanonicalPdbsHeuristic::new(task.clone(), vec![vec![0], vec![0, 1]], 1_000_000)
                .unwrap();
        assert_eq!(
            canonical.evaluate(&State::new(vec![0, 1])),
            HeuristicValue::DeadEnd
        );
    }

    #[test]
    fn dominance_pruning_drops_subset_patterns() {
        let task = Rc::new(chains_task());
        let mut canonical = CanonicalPdbsHeuristic::new(
            task.clone(),
            vec![vec![0], vec![1], vec![0, 1]],
            1_000_000,
        )
        .unwrap();
        canonical.dominance_pruning();
        assert_eq!(canonical.pattern_databases().len(), 1);
        assert_eq!(canonical.pattern_databases()[0].pattern(), &[0, 1]);
        assert_eq!(
            canonical.evaluate(&task.initial_state()),
            HeuristicValue::Estimate(7)
        );
    }

    #[test]
    fn admissible_on_chains() {
        // Exhaustively compare against the true goal distance (a needs
        // 3 - a steps, b needs 4 - b steps).
        let task = Rc::new(chains_task());
        let mut canonical = CanonicalPdbsHeuristic::new(
            task.clone(),
            vec![vec![0], vec![1], vec![0, 1]],
            1_000_000,
        )
        .unwrap();
        for a in 0..4 {
            for b in 0..5 {
                let state = State::new(vec![a, b]);
                let true_distance = (3 - a as Cost) + (4 - b as Cost);
                let h = canonical.evaluate(&state).estimate().unwrap();
                assert!(h <= true_distance);
            }
        }
    }
}
