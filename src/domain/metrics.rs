//! Full-graph metric recomputation.
//!
//! Passes run in a fixed order, each reading only what earlier passes wrote:
//! depth, descendant counts, profit, need/suggestion, criticality.

use std::collections::{BTreeMap, HashMap, VecDeque};

use tracing::{debug, instrument, warn};

use crate::domain::error::IntegrityError;
use crate::domain::network::{Network, ROOT_ID};

/// Criticality lost per level of depth.
const DEPTH_DECAY: f64 = 0.04;

pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Stateless engine; every call processes the entire network.
#[derive(Debug, Default, Clone, Copy)]
pub struct MetricsEngine;

impl MetricsEngine {
    #[instrument(level = "debug", skip_all, fields(nodes = network.len()))]
    pub fn recompute(&self, network: &mut Network) -> Vec<IntegrityError> {
        let mut issues = drop_dangling(network);
        if network.is_empty() {
            network.max_depth = 0;
            network.root = None;
            log_issues(&issues);
            return issues;
        }
        issues.extend(elect_root(network));

        let (depths, depth_issues) = compute_depths(network);
        issues.extend(depth_issues);

        let counts: HashMap<String, (usize, usize)> = network
            .nodes
            .keys()
            .map(|id| {
                let direct = network.edges(id).len();
                let total = network.all_descendants(id).len();
                (id.clone(), (direct, total))
            })
            .collect();

        let profits: HashMap<String, f64> = network
            .nodes
            .keys()
            .map(|id| {
                let sum: f64 = network
                    .edges(id)
                    .iter()
                    .filter_map(|e| network.nodes.get(&e.target))
                    .map(|child| child.value)
                    .sum();
                (id.clone(), round_to(sum.max(0.0), 2))
            })
            .collect();

        let threshold = network.settings.min_children_threshold;
        let mut max_depth = 0;
        for (id, node) in network.nodes.iter_mut() {
            let metrics = &mut node.metrics;
            metrics.depth = depths.get(id).copied().unwrap_or(0);
            max_depth = max_depth.max(metrics.depth);

            let (direct, total) = counts.get(id).copied().unwrap_or((0, 0));
            metrics.children_count = direct;
            metrics.total_children = total;

            metrics.profit = profits.get(id).copied().unwrap_or(0.0);

            metrics.suggested_child_count = threshold;
            metrics.needed_children = threshold.saturating_sub(direct);
            metrics.is_chokepoint = metrics.needed_children > 0;

            metrics.criticality = criticality(metrics.needed_children, threshold, metrics.depth);
        }
        network.max_depth = max_depth;

        log_issues(&issues);
        debug!("metrics update complete, max_depth={}", max_depth);
        issues
    }
}

fn log_issues(issues: &[IntegrityError]) {
    for issue in issues {
        warn!("{}", issue);
    }
}

/// 0 when the node has enough children, otherwise the shortfall ratio
/// decayed by depth, clamped to [0, 1] and rounded to 3 places.
pub fn criticality(needed: usize, threshold: usize, depth: usize) -> f64 {
    if needed == 0 {
        return 0.0;
    }
    let need_ratio = (needed as f64 / threshold.max(1) as f64).min(1.0);
    let depth_factor = 1.0 / (1.0 + DEPTH_DECAY * depth as f64);
    round_to((need_ratio * depth_factor).clamp(0.0, 1.0), 3)
}

/// Remove parent pointers and edges that reference missing nodes, and give
/// every node an adjacency entry.
fn drop_dangling(network: &mut Network) -> Vec<IntegrityError> {
    let mut issues = Vec::new();
    let known: Vec<String> = network.nodes.keys().cloned().collect();

    network.graph.retain(|source, edges| {
        if network.nodes.contains_key(source) {
            return true;
        }
        for edge in edges.iter() {
            issues.push(IntegrityError::DanglingEdge {
                source_id: source.clone(),
                target_id: edge.target.clone(),
            });
        }
        false
    });
    for (source, edges) in network.graph.iter_mut() {
        edges.retain(|edge| {
            let keep = network.nodes.contains_key(&edge.target);
            if !keep {
                issues.push(IntegrityError::DanglingEdge {
                    source_id: source.clone(),
                    target_id: edge.target.clone(),
                });
            }
            keep
        });
    }
    for id in known {
        network.graph.entry(id).or_default();
    }

    let existing: Vec<String> = network.nodes.keys().cloned().collect();
    for node in network.nodes.values_mut() {
        node.parents.retain(|p| {
            let keep = existing.binary_search(p).is_ok();
            if !keep {
                issues.push(IntegrityError::DanglingEdge {
                    source_id: p.clone(),
                    target_id: node.id.clone(),
                });
            }
            keep
        });
    }
    issues
}

/// Keep the recorded root when it is still parentless, otherwise prefer the
/// conventional `root` id, then the first parentless node. Every other
/// parentless node is reported as orphaned.
fn elect_root(network: &mut Network) -> Vec<IntegrityError> {
    let parentless: Vec<&str> = network
        .nodes
        .values()
        .filter(|n| n.is_root())
        .map(|n| n.id.as_str())
        .collect();

    let current = network
        .root
        .as_deref()
        .filter(|r| parentless.contains(r))
        .or_else(|| parentless.iter().copied().find(|id| *id == ROOT_ID))
        .or_else(|| parentless.first().copied())
        .map(String::from);

    let issues = parentless
        .iter()
        .filter(|id| Some(**id) != current.as_deref())
        .map(|id| IntegrityError::OrphanedNode(id.to_string()))
        .collect();
    network.root = current;
    issues
}

/// Kahn-style propagation; whatever it cannot reach is resolved by a
/// three-color walk over parent pointers that reports every back edge.
fn compute_depths(network: &Network) -> (BTreeMap<String, usize>, Vec<IntegrityError>) {
    let mut in_degree: HashMap<&str, usize> =
        network.nodes.keys().map(|id| (id.as_str(), 0)).collect();
    for edges in network.graph.values() {
        for edge in edges {
            if let Some(degree) = in_degree.get_mut(edge.target.as_str()) {
                *degree += 1;
            }
        }
    }

    let mut depths: BTreeMap<String, usize> = BTreeMap::new();
    let mut queue: VecDeque<&str> = VecDeque::new();
    for id in network.nodes.keys() {
        if in_degree.get(id.as_str()) == Some(&0) {
            depths.insert(id.clone(), 0);
            queue.push_back(id);
        }
    }

    let mut marks: HashMap<&str, Mark> = network
        .nodes
        .keys()
        .map(|id| (id.as_str(), Mark::Unvisited))
        .collect();

    while let Some(id) = queue.pop_front() {
        marks.insert(id, Mark::Done);
        let depth = depths.get(id).copied().unwrap_or(0);
        for child in network.direct_children(id) {
            let Some(degree) = in_degree.get_mut(child) else {
                continue;
            };
            *degree = degree.saturating_sub(1);
            let candidate = depth + 1;
            let entry = depths.entry(child.to_string()).or_insert(candidate);
            *entry = (*entry).max(candidate);
            if *degree == 0 {
                queue.push_back(child);
            }
        }
    }

    let mut issues = Vec::new();
    let unresolved: Vec<&str> = marks
        .iter()
        .filter(|(_, m)| **m != Mark::Done)
        .map(|(id, _)| *id)
        .collect();
    if unresolved.is_empty() {
        return (depths, issues);
    }

    warn!(
        "topological pass resolved {}/{} nodes, walking the rest",
        network.len() - unresolved.len(),
        network.len()
    );
    let mut unresolved = unresolved;
    unresolved.sort_unstable();
    for start in unresolved {
        if marks.get(start) == Some(&Mark::Done) {
            continue;
        }
        resolve_depth(network, start, &mut marks, &mut depths, &mut issues);
    }
    (depths, issues)
}

/// Iterative DFS from `start` towards the roots. A parent still in progress
/// closes a cycle; it is reported and left out of the depth maximum.
fn resolve_depth<'a>(
    network: &'a Network,
    start: &'a str,
    marks: &mut HashMap<&'a str, Mark>,
    depths: &mut BTreeMap<String, usize>,
    issues: &mut Vec<IntegrityError>,
) {
    let parents_of = move |id: &str| -> &'a [String] {
        network
            .nodes
            .get(id)
            .map(|n| n.parents.as_slice())
            .unwrap_or(&[])
    };

    let mut stack: Vec<(&'a str, usize)> = vec![(start, 0)];
    marks.insert(start, Mark::InProgress);

    while let Some((id, next)) = stack.last().copied() {
        let parents = parents_of(id);
        if next < parents.len() {
            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }
            let parent = parents[next].as_str();
            match marks.get(parent).copied().unwrap_or(Mark::Done) {
                Mark::Done => {}
                Mark::InProgress => {
                    let from = stack.iter().position(|(s, _)| *s == parent).unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[from..].iter().map(|(s, _)| s.to_string()).collect();
                    cycle.push(parent.to_string());
                    issues.push(IntegrityError::CycleDetected(cycle));
                }
                Mark::Unvisited => {
                    marks.insert(parent, Mark::InProgress);
                    stack.push((parent, 0));
                }
            }
            continue;
        }

        let depth = parents
            .iter()
            .filter(|p| marks.get(p.as_str()) == Some(&Mark::Done))
            .filter_map(|p| depths.get(p))
            .max()
            .map(|d| d + 1)
            .unwrap_or(0);
        depths.insert(id.to_string(), depth);
        marks.insert(id, Mark::Done);
        stack.pop();
    }
}

/// Three-color search over `successors`. Returns the first cycle found as a
/// closed path, or `None` for an acyclic graph.
pub fn find_cycle<'a, I, F>(nodes: I, successors: F) -> Option<Vec<String>>
where
    I: IntoIterator<Item = &'a str>,
    F: Fn(&str) -> Vec<&'a str>,
{
    let mut marks: HashMap<&'a str, Mark> = HashMap::new();
    for start in nodes {
        if marks.get(start).copied().unwrap_or(Mark::Unvisited) != Mark::Unvisited {
            continue;
        }
        let mut stack: Vec<(&'a str, Vec<&'a str>)> = vec![(start, successors(start))];
        marks.insert(start, Mark::InProgress);

        while let Some((id, pending)) = stack.last_mut() {
            let id = *id;
            match pending.pop() {
                Some(next) => match marks.get(next).copied().unwrap_or(Mark::Unvisited) {
                    Mark::Done => {}
                    Mark::InProgress => {
                        let from = stack.iter().position(|(s, _)| *s == next).unwrap_or(0);
                        let mut cycle: Vec<String> =
                            stack[from..].iter().map(|(s, _)| s.to_string()).collect();
                        cycle.push(next.to_string());
                        return Some(cycle);
                    }
                    Mark::Unvisited => {
                        marks.insert(next, Mark::InProgress);
                        stack.push((next, successors(next)));
                    }
                },
                None => {
                    marks.insert(id, Mark::Done);
                    stack.pop();
                }
            }
        }
    }
    None
}
