use crate::units::UnitGraph;
use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Unordered unit pair → agglomeration weight
pub(crate) type PairWeights = HashMap<(usize, usize), f32>;

pub(crate) fn pair_key(a: usize, b: usize) -> (usize, usize) {
    (a.min(b), a.max(b))
}

/// A strongly connected cluster that does not fit on its own
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Oversized {
    /// First unit of the cluster in declaration order
    pub unit: usize,
    pub estimated_lines: usize,
}

/// SCCs of the movable units; mutable state and its accessors are linked
/// both ways so a bundle always lands in one cluster
pub(crate) fn strongly_connected_clusters(graph: &UnitGraph<'_>, movable: &[usize]) -> Vec<Vec<usize>> {
    let mut dag = DiGraph::<usize, ()>::new();
    let mut node_of: Vec<Option<NodeIndex>> = vec![None; graph.units.len()];
    for &unit in movable {
        node_of[unit] = Some(dag.add_node(unit));
    }
    for &unit in movable {
        let Some(from) = node_of[unit] else { continue };
        for &target in &graph.deps[unit] {
            if let Some(to) = node_of[target] {
                dag.update_edge(from, to, ());
            }
        }
    }
    for &(accessor, state) in &graph.bundles {
        if let (Some(a), Some(s)) = (node_of[accessor], node_of[state]) {
            dag.update_edge(a, s, ());
            dag.update_edge(s, a, ());
        }
    }

    let mut clusters: Vec<Vec<usize>> = tarjan_scc(&dag)
        .into_iter()
        .map(|scc| {
            let mut units: Vec<usize> = scc.into_iter().map(|node| dag[node]).collect();
            units.sort_unstable();
            units
        })
        .collect();
    clusters.sort_by_key(|cluster| cluster[0]);
    clusters
}

/// Whether the import graph between `groups` has no cycle
pub(crate) fn groups_acyclic(graph: &UnitGraph<'_>, groups: &[Vec<usize>]) -> bool {
    let mut owner: HashMap<usize, usize> = HashMap::new();
    for (index, group) in groups.iter().enumerate() {
        for &unit in group {
            owner.insert(unit, index);
        }
    }
    let mut imports = DiGraph::<(), ()>::with_capacity(groups.len(), 0);
    let nodes: Vec<NodeIndex> = groups.iter().map(|_| imports.add_node(())).collect();
    for (index, group) in groups.iter().enumerate() {
        for &unit in group {
            for target in &graph.deps[unit] {
                match owner.get(target) {
                    Some(&other) if other != index => {
                        imports.update_edge(nodes[index], nodes[other], ());
                    }
                    _ => {}
                }
            }
        }
    }
    !is_cyclic_directed(&imports)
}

fn pair_weight(a: &[usize], b: &[usize], weights: &PairWeights) -> f32 {
    a.iter()
        .flat_map(|&x| b.iter().map(move |&y| pair_key(x, y)))
        .filter_map(|key| weights.get(&key))
        .sum()
}

fn merged(a: &[usize], b: &[usize]) -> Vec<usize> {
    let mut units: Vec<usize> = a.iter().chain(b).copied().collect();
    units.sort_unstable();
    units
}

fn sort_groups(groups: &mut [Vec<usize>]) {
    groups.sort_by_key(|group| group.first().copied().unwrap_or(usize::MAX));
}

/// Merge linked clusters heaviest pair first while sizes fit and the group
/// import graph stays acyclic
fn agglomerate(
    graph: &UnitGraph<'_>,
    mut groups: Vec<Vec<usize>>,
    weights: &PairWeights,
    max_lines: usize,
    size: &impl Fn(&[usize]) -> usize,
) -> Vec<Vec<usize>> {
    loop {
        let mut candidates: Vec<(f32, usize, usize)> = Vec::new();
        for i in 0..groups.len() {
            for j in i + 1..groups.len() {
                let weight = pair_weight(&groups[i], &groups[j], weights);
                if weight > 0.0 {
                    candidates.push((weight, i, j));
                }
            }
        }
        // groups stay sorted by first unit, so (i, j) is declaration order
        candidates.sort_by(|a, b| b.0.total_cmp(&a.0).then((a.1, a.2).cmp(&(b.1, b.2))));

        let next = candidates.into_iter().find_map(|(_, i, j)| {
            let union = merged(&groups[i], &groups[j]);
            if size(&union) > max_lines {
                return None;
            }
            let mut trial: Vec<Vec<usize>> = groups
                .iter()
                .enumerate()
                .filter(|(index, _)| *index != i && *index != j)
                .map(|(_, group)| group.clone())
                .collect();
            trial.push(union);
            sort_groups(&mut trial);
            groups_acyclic(graph, &trial).then_some(trial)
        });
        match next {
            Some(trial) => groups = trial,
            None => return groups,
        }
    }
}

/// First-fit packing in declaration order under the same constraints
fn first_fit(
    graph: &UnitGraph<'_>,
    groups: Vec<Vec<usize>>,
    max_lines: usize,
    size: &impl Fn(&[usize]) -> usize,
) -> Vec<Vec<usize>> {
    let mut bins: Vec<Vec<usize>> = Vec::new();
    for (position, group) in groups.iter().enumerate() {
        let rest = &groups[position + 1..];
        let slot = (0..bins.len()).find(|&bin| {
            let union = merged(&bins[bin], group);
            if size(&union) > max_lines {
                return false;
            }
            let mut trial = bins.clone();
            trial[bin] = union;
            trial.extend(rest.iter().cloned());
            groups_acyclic(graph, &trial)
        });
        match slot {
            Some(bin) => bins[bin] = merged(&bins[bin], group),
            None => bins.push(group.clone()),
        }
    }
    sort_groups(&mut bins);
    bins
}

/// Partition the movable units of `graph` into groups of at most
/// `max_lines` (as measured by `size`) with an acyclic import graph.
pub(crate) fn partition(
    graph: &UnitGraph<'_>,
    weights: &PairWeights,
    max_lines: usize,
    size: impl Fn(&[usize]) -> usize,
) -> Result<Vec<Vec<usize>>, Oversized> {
    let movable = graph.movable();
    let clusters = strongly_connected_clusters(graph, &movable);
    for cluster in &clusters {
        let estimated_lines = size(cluster);
        if estimated_lines > max_lines {
            return Err(Oversized {
                unit: cluster[0],
                estimated_lines,
            });
        }
    }
    let groups = agglomerate(graph, clusters, weights, max_lines, &size);
    Ok(first_fit(graph, groups, max_lines, &size))
}
