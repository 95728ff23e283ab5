//! Maximal-clique enumeration with pivoting (Tomita et al.). The graph is
//! given as sorted adjacency lists; vertices are `0..n`.

fn intersection(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut result = vec![];
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                result.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    result
}

fn difference(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut result = vec![];
    let (mut i, mut j) = (0, 0);
    while i < a.len() {
        if j == b.len() || a[i] < b[j] {
            result.push(a[i]);
            i += 1;
        } else if a[i] > b[j] {
            j += 1;
        } else {
            i += 1;
            j += 1;
        }
    }
    result
}

/// The pivot: the vertex of `subg` whose neighbourhood covers the most of
/// `cand`, so that the fewest branches remain.
fn maximizing_vertex(subg: &[usize], cand: &[usize], graph: &[Vec<usize>]) -> usize {
    let mut best = subg[0];
    let mut best_count = 0;
    for &u in &subg[1..] {
        let count = intersection(cand, &graph[u]).len();
        if count > best_count {
            best_count = count;
            best = u;
        }
    }
    best
}

fn expand(
    subg: &[usize],
    cand: &mut Vec<usize>,
    clique: &mut Vec<usize>,
    graph: &[Vec<usize>],
    max_cliques: &mut Vec<Vec<usize>>,
) {
    if subg.is_empty() {
        max_cliques.push(clique.clone());
        return;
    }
    let pivot = maximizing_vertex(subg, cand, graph);
    // Branch only on candidates outside the pivot's neighbourhood.
    let mut ext = difference(cand, &graph[pivot]);
    while let Some(q) = ext.pop() {
        clique.push(q);
        let subg_q = intersection(subg, &graph[q]);
        let mut cand_q = intersection(cand, &graph[q]);
        expand(&subg_q, &mut cand_q, clique, graph, max_cliques);
        clique.pop();
        cand.retain(|&v| v != q);
    }
}

/// Enumerates all maximal cliques of the graph.
pub(crate) fn compute_max_cliques(graph: &[Vec<usize>]) -> Vec<Vec<usize>> {
    let vertices: Vec<usize> = (0..graph.len()).collect();
    let mut cand = vertices.clone();
    let mut clique = vec![];
    let mut max_cliques = vec![];
    if !graph.is_empty() {
        expand(&vertices, &mut cand, &mut clique, graph, &mut max_cliques);
    }
    max_cliques
}

#[cfg(test)]
mod tests {
    use super::*;
    use itertools::Itertools;

    fn normalized(mut cliques: Vec<Vec<usize>>) -> Vec<Vec<usize>> {
        for clique in &mut cliques {
            clique.sort_unstable();
        }
        cliques.sort();
        cliques
    }

    #[test]
    fn triangle_plus_pendant() {
        // 0-1-2 triangle, 3 adjacent to 2 only.
        let graph = vec![vec![1, 2], vec![0, 2], vec![0, 1, 3], vec![2]];
        assert_eq!(
            normalized(compute_max_cliques(&graph)),
            vec![vec![0, 1, 2], vec![2, 3]]
        );
    }

    #[test]
    fn independent_vertices_are_singleton_cliques() {
        let graph = vec![vec![], vec![], vec![]];
        assert_eq!(
            normalized(compute_max_cliques(&graph)),
            vec![vec![0], vec![1], vec![2]]
        );
    }

    #[test]
    fn complete_graph_is_one_clique() {
        let n = 5;
        let graph: Vec<Vec<usize>> = (0..n)
            .map(|v| (0..n).filter(|&u| u != v).collect_vec())
            .collect();
        assert_eq!(
            normalized(compute_max_cliques(&graph)),
            vec![(0..n).collect_vec()]
        );
    }

    #[test]
    fn every_clique_is_maximal_in_a_random_ish_graph() {
        // Fixed adjacency; verify maximality and coverage by brute force.
        let graph = vec![
            vec![1, 3, 4],
            vec![0, 2, 4],
            vec![1, 3],
            vec![0, 2, 4],
            vec![0, 1, 3],
        ];
        let cliques = normalized(compute_max_cliques(&graph));
        let adjacent =
            |a: usize, b: usize| graph[a].binary_search(&b).is_ok();
        for clique in &cliques {
            for (&a, &b) in clique.iter().tuple_combinations() {
                assert!(adjacent(a, b), "{clique:?} is not a clique");
            }
            for v in 0..graph.len() {
                if !clique.contains(&v) {
                    assert!(
                        !clique.iter().all(|&u| adjacent(u, v)),
                        "{clique:?} is not maximal, {v} extends it"
                    );
                }
            }
        }
        // Every vertex appears somewhere.
        for v in 0..graph.len() {
            assert!(cliques.iter().any(|clique| clique.contains(&v)));
        }
    }
}
