//! Network aggregate: node store and adjacency graph kept in sync.
//!
//! Structural primitives (`create`, `delete`, `link`) never touch metrics.
//! The public mutating operations run one full recompute afterwards.

use std::collections::{BTreeMap, HashSet, VecDeque};

use itertools::Itertools;
use tracing::{debug, instrument, warn};

use crate::domain::entities::{
    BulkDeleteReport, Edge, NetworkSettings, NetworkStats, NewNode, Node, NodeInsight,
    Suggestion, DEFAULT_CAPACITY, DEFAULT_NODE_VALUE,
};
use crate::domain::error::{DomainResult, IntegrityError, ValidationError};
use crate::domain::import::{Fragment, SubtreeImporter};
use crate::domain::metrics::{round_to, MetricsEngine};
use crate::domain::ranking::SuggestionRanker;

/// Id given to the first node when the caller does not choose one.
pub const ROOT_ID: &str = "root";

#[derive(Debug, Clone)]
pub struct Network {
    pub(crate) nodes: BTreeMap<String, Node>,
    pub(crate) graph: BTreeMap<String, Vec<Edge>>,
    pub(crate) settings: NetworkSettings,
    pub(crate) max_depth: usize,
    pub(crate) root: Option<String>,
    recomputes: u64,
}

impl Default for Network {
    fn default() -> Self {
        Self::new(NetworkSettings::default())
    }
}

impl Network {
    pub fn new(settings: NetworkSettings) -> Self {
        Self {
            nodes: BTreeMap::new(),
            graph: BTreeMap::new(),
            settings,
            max_depth: 0,
            root: None,
            recomputes: 0,
        }
    }

    pub fn settings(&self) -> NetworkSettings {
        self.settings
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn root(&self) -> Option<&str> {
        self.root.as_deref()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Outgoing edges of `id`; empty for leaves and unknown ids.
    pub fn edges(&self, id: &str) -> &[Edge] {
        self.graph.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn edge_count(&self) -> usize {
        self.graph.values().map(Vec::len).sum()
    }

    /// Number of full metric passes run on this network so far.
    pub fn recompute_count(&self) -> u64 {
        self.recomputes
    }

    pub fn direct_children(&self, id: &str) -> Vec<&str> {
        self.edges(id).iter().map(|e| e.target.as_str()).collect()
    }

    /// Every node reachable from `id` over outgoing edges, `id` excluded
    /// unless it sits on a cycle.
    pub fn all_descendants(&self, id: &str) -> HashSet<&str> {
        let mut seen = HashSet::new();
        if !self.contains(id) {
            return seen;
        }
        let mut queue: VecDeque<&str> = self.direct_children(id).into();
        while let Some(current) = queue.pop_front() {
            if self.contains(current) && seen.insert(current) {
                queue.extend(
                    self.direct_children(current)
                        .into_iter()
                        .filter(|c| !seen.contains(c)),
                );
            }
        }
        seen
    }

    /// `base` if free, otherwise the first free `base_1`, `base_2`, ...
    pub fn unique_id(&self, base: &str) -> String {
        if !self.contains(base) {
            return base.to_string();
        }
        let mut counter = 1usize;
        loop {
            let candidate = format!("{base}_{counter}");
            if !self.contains(&candidate) {
                return candidate;
            }
            counter += 1;
        }
    }

    /// Insert a node record and make sure it owns an adjacency entry.
    pub(crate) fn insert(&mut self, node: Node) {
        self.graph.entry(node.id.clone()).or_default();
        self.nodes.insert(node.id.clone(), node);
    }

    /// Add `parent -> child` and the matching parent pointer.
    /// Returns false when the edge already existed.
    pub(crate) fn link(&mut self, parent: &str, child: &str, capacity: f64) -> bool {
        let edges = self.graph.entry(parent.to_string()).or_default();
        if edges.iter().any(|e| e.target == child) {
            return false;
        }
        edges.push(Edge::new(child, capacity));
        if let Some(node) = self.nodes.get_mut(child) {
            if !node.parents.iter().any(|p| p == parent) {
                node.parents.push(parent.to_string());
            }
        }
        true
    }

    /// Create a node under `parent` (or the root when the network is empty)
    /// without recomputing metrics.
    pub fn create(
        &mut self,
        parent: Option<&str>,
        spec: NewNode,
    ) -> Result<String, ValidationError> {
        match parent {
            None if !self.is_empty() => return Err(ValidationError::DuplicateRoot),
            Some(p) if !self.contains(p) => {
                return Err(ValidationError::ParentNotFound(p.to_string()))
            }
            _ => {}
        }

        let value = spec.value.unwrap_or(DEFAULT_NODE_VALUE);
        if !value.is_finite() {
            return Err(ValidationError::InvalidValue(value.to_string()));
        }

        let id = match spec.id.filter(|s| !s.trim().is_empty()) {
            Some(requested) => {
                let id = self.unique_id(&requested);
                if id != requested {
                    warn!("node id '{}' already exists, using '{}'", requested, id);
                }
                id
            }
            None => match parent {
                None => self.unique_id(ROOT_ID),
                Some(p) => self.unique_id(&format!("{}.{}", p, self.edges(p).len() + 1)),
            },
        };

        let mut node = Node::new(id.clone(), value, spec.properties);
        node.metrics.suggested_child_count = self.settings.min_children_threshold;
        self.insert(node);

        match parent {
            Some(p) => {
                self.link(p, &id, DEFAULT_CAPACITY);
            }
            None => self.root = Some(id.clone()),
        }
        debug!("created node '{}' under {:?}", id, parent);
        Ok(id)
    }

    /// Remove a leaf node without recomputing metrics.
    pub fn delete(&mut self, id: &str) -> Result<Node, ValidationError> {
        let parents = match self.nodes.get(id) {
            Some(node) => node.parents.clone(),
            None => return Err(ValidationError::NodeNotFound(id.to_string())),
        };
        if !self.edges(id).is_empty() {
            return Err(ValidationError::HasChildren(id.to_string()));
        }

        for parent in &parents {
            if let Some(edges) = self.graph.get_mut(parent) {
                edges.retain(|e| e.target != id);
            }
        }
        self.graph.remove(id);
        if self.root.as_deref() == Some(id) {
            self.root = None;
        }
        debug!("deleted node '{}'", id);
        self.nodes
            .remove(id)
            .ok_or_else(|| ValidationError::NodeNotFound(id.to_string()))
    }

    #[instrument(level = "debug", skip(self, spec))]
    pub fn add_node(&mut self, parent: Option<&str>, spec: NewNode) -> DomainResult<String> {
        let id = self.create(parent, spec)?;
        self.recompute();
        Ok(id)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn remove_node(&mut self, id: &str) -> DomainResult<Node> {
        let node = self.delete(id)?;
        self.recompute();
        Ok(node)
    }

    /// Delete several leaves as one operation.
    ///
    /// Every target is validated before anything is removed; a single bad id
    /// rejects the whole batch with a reason per offending id.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_nodes(&mut self, ids: &[String]) -> DomainResult<BulkDeleteReport> {
        if ids.is_empty() {
            return Err(ValidationError::EmptySelection.into());
        }
        let targets: Vec<String> = ids.iter().unique().cloned().collect();

        let mut reasons = BTreeMap::new();
        for id in &targets {
            if !self.contains(id) {
                reasons.insert(id.clone(), "node not found".to_string());
            } else if !self.edges(id).is_empty() {
                reasons.insert(id.clone(), "node has children".to_string());
            }
        }
        if !reasons.is_empty() {
            for id in &targets {
                reasons
                    .entry(id.clone())
                    .or_insert_with(|| "not deleted, batch rejected".to_string());
            }
            return Err(ValidationError::BulkRejected(reasons).into());
        }

        let mut report = BulkDeleteReport::default();
        for id in targets {
            match self.delete(&id) {
                Ok(_) => report.deleted.push(id),
                Err(e) => {
                    warn!("bulk delete of '{}' failed after validation: {}", id, e);
                    report.failed.insert(id, e.to_string());
                }
            }
        }
        if !report.deleted.is_empty() {
            self.recompute();
        }
        Ok(report)
    }

    /// Change the threshold; recomputes only when the value actually changes.
    pub fn set_min_children_threshold(&mut self, threshold: i64) -> DomainResult<bool> {
        if threshold < 1 {
            return Err(ValidationError::ThresholdOutOfRange(threshold).into());
        }
        let threshold = threshold as usize;
        if threshold == self.settings.min_children_threshold {
            return Ok(false);
        }
        self.settings.min_children_threshold = threshold;
        self.recompute();
        Ok(true)
    }

    pub fn import_subtree(
        &mut self,
        parent: &str,
        fragment: &Fragment,
    ) -> DomainResult<Vec<String>> {
        SubtreeImporter::new().import(self, parent, fragment)
    }

    /// Full metric pass. Integrity problems come back as diagnostics.
    pub fn recompute(&mut self) -> Vec<IntegrityError> {
        self.recomputes += 1;
        MetricsEngine.recompute(self)
    }

    pub fn insight(&self, id: &str) -> DomainResult<NodeInsight> {
        let node = self
            .node(id)
            .ok_or_else(|| ValidationError::NodeNotFound(id.to_string()))?;
        Ok(NodeInsight {
            id: node.id.clone(),
            value: node.value,
            depth: node.metrics.depth,
            children_count: node.metrics.children_count,
            total_children: node.metrics.total_children,
            profit: node.metrics.profit,
            criticality: node.metrics.criticality,
            is_chokepoint: node.metrics.is_chokepoint,
            needed_children: node.metrics.needed_children,
            suggested_children: node.metrics.suggested_child_count,
            parents: node.parents.clone(),
            children: self.direct_children(id).into_iter().map(String::from).collect(),
            extra: node.extra.clone(),
        })
    }

    pub fn suggestions(&self, limit: usize) -> Vec<Suggestion> {
        SuggestionRanker::new(limit).rank(self)
    }

    pub fn stats(&self) -> NetworkStats {
        NetworkStats {
            total_nodes: self.len(),
            total_edges: self.edge_count(),
            max_depth: self.max_depth,
            total_value: round_to(self.nodes().map(|n| n.value).sum(), 2),
            total_profit: round_to(self.nodes().map(|n| n.metrics.profit).sum(), 2),
        }
    }
}
