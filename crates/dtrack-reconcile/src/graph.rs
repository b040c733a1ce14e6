//! Topological ordering of the project forest.

use std::collections::{BTreeMap, BTreeSet};

/// Order nodes so that every parent comes before its children.
///
/// `parents` maps each node to its parent. Parents that are not themselves
/// keys are treated as external roots. Ties are broken by name so the
/// result is deterministic.
///
/// Returns one cycle (in parent order, starting from its smallest member)
/// if the graph is not a forest.
pub fn parents_first(parents: &BTreeMap<String, Option<String>>) -> Result<Vec<String>, Vec<String>> {
    let mut in_degree: BTreeMap<&str, usize> = BTreeMap::new();
    let mut children: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();

    for (node, parent) in parents {
        let entry = in_degree.entry(node.as_str()).or_insert(0);
        if let Some(parent) = parent.as_deref().filter(|p| parents.contains_key(*p)) {
            *entry += 1;
            children.entry(parent).or_default().insert(node.as_str());
        }
    }

    let mut ready: BTreeSet<&str> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(node, _)| *node)
        .collect();
    let mut ordered = Vec::with_capacity(parents.len());

    while let Some(node) = ready.pop_first() {
        ordered.push(node.to_string());
        for child in children.get(node).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(child) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*child);
                }
            }
        }
    }

    if ordered.len() == parents.len() {
        return Ok(ordered);
    }

    let emitted: BTreeSet<&str> = ordered.iter().map(String::as_str).collect();
    let start = parents
        .keys()
        .find(|node| !emitted.contains(node.as_str()))
        .map(String::as_str);
    Err(start.map(|s| find_cycle(parents, s)).unwrap_or_default())
}

/// Order nodes so that every child comes before its parent.
pub fn children_first(parents: &BTreeMap<String, Option<String>>) -> Result<Vec<String>, Vec<String>> {
    parents_first(parents).map(|mut order| {
        order.reverse();
        order
    })
}

// Every node left over by Kahn's algorithm has its parent left over too, so
// following parent links from any of them must revisit a node.
fn find_cycle(parents: &BTreeMap<String, Option<String>>, start: &str) -> Vec<String> {
    let mut path: Vec<&str> = Vec::new();
    let mut current = start;

    loop {
        if let Some(pos) = path.iter().position(|n| *n == current) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|s| (*s).to_string()).collect();
            if let Some(min_pos) = cycle
                .iter()
                .enumerate()
                .min_by(|a, b| a.1.cmp(b.1))
                .map(|(i, _)| i)
            {
                cycle.rotate_left(min_pos);
            }
            return cycle;
        }
        path.push(current);
        match parents.get(current).and_then(|p| p.as_deref()) {
            Some(parent) => current = parent,
            None => return path.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}
