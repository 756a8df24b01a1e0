//! Subtree merge-import.
//!
//! A fragment is a `{nodes, graph}` document. Its local roots are attached
//! under an existing node, every fragment id is re-minted behind a
//! collision-resistant prefix, and metrics are recomputed once at the end.

use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};

use chrono::Local;
use serde_json::{Map, Value};
use tracing::{debug, info, instrument, warn};

use crate::domain::document::parse_edges;
use crate::domain::entities::{Edge, Node, DEFAULT_CAPACITY};
use crate::domain::error::{DomainResult, ValidationError};
use crate::domain::metrics::find_cycle;
use crate::domain::network::Network;

/// Node/edge fragment supplied from outside the live network.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fragment {
    pub nodes: BTreeMap<String, Map<String, Value>>,
    pub graph: BTreeMap<String, Vec<Edge>>,
}

impl Fragment {
    /// Parse a fragment document. Both the `nodes` and the `graph` maps are
    /// required; non-object node entries are skipped.
    pub fn from_value(doc: &Value) -> Result<Self, ValidationError> {
        let object = doc
            .as_object()
            .ok_or_else(|| ValidationError::MalformedFragment("expected a JSON object".into()))?;
        let nodes = object
            .get("nodes")
            .and_then(Value::as_object)
            .ok_or_else(|| ValidationError::MalformedFragment("missing 'nodes' map".into()))?;
        let graph = object
            .get("graph")
            .and_then(Value::as_object)
            .ok_or_else(|| ValidationError::MalformedFragment("missing 'graph' map".into()))?;

        let mut fragment = Fragment::default();
        for (id, attrs) in nodes {
            match attrs.as_object() {
                Some(attrs) => {
                    fragment.nodes.insert(id.clone(), attrs.clone());
                }
                None => warn!("skipping fragment node '{}': not an object", id),
            }
        }
        for (source, raw) in graph {
            fragment.graph.insert(source.clone(), parse_edges(source, raw));
        }
        Ok(fragment)
    }

    pub fn from_json(text: &str) -> Result<Self, ValidationError> {
        let doc: Value = serde_json::from_str(text)
            .map_err(|e| ValidationError::MalformedFragment(format!("invalid JSON: {e}")))?;
        Self::from_value(&doc)
    }

    fn in_fragment_children(&self, id: &str) -> Vec<&str> {
        self.graph
            .get(id)
            .map(|edges| {
                edges
                    .iter()
                    .map(|e| e.target.as_str())
                    .filter(|t| self.nodes.contains_key(*t))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Fragment nodes without a parent inside the fragment, in id order.
    pub fn local_roots(&self) -> Vec<&str> {
        let with_parent: HashSet<&str> = self
            .nodes
            .keys()
            .flat_map(|id| self.in_fragment_children(id))
            .collect();
        self.nodes
            .keys()
            .map(String::as_str)
            .filter(|id| !with_parent.contains(id))
            .collect()
    }
}

/// Id prefix source: parent id plus a fine-grained wall clock stamp.
pub fn timestamp_stamp() -> String {
    let stamp = Local::now().format("%H%M%S%6f").to_string();
    stamp[stamp.len().saturating_sub(8)..].to_string()
}

#[derive(Debug, Clone)]
pub struct SubtreeImporter {
    stamp: String,
}

impl Default for SubtreeImporter {
    fn default() -> Self {
        Self::new()
    }
}

impl SubtreeImporter {
    pub fn new() -> Self {
        Self::with_stamp(timestamp_stamp())
    }

    /// Fixed prefix stamp, used to make imports reproducible.
    pub fn with_stamp(stamp: impl Into<String>) -> Self {
        Self {
            stamp: stamp.into(),
        }
    }

    /// Merge `fragment` under `parent_id` and return the new ids in
    /// breadth-first order.
    #[instrument(
        level = "debug",
        skip(self, network, fragment),
        fields(nodes = fragment.nodes.len())
    )]
    pub fn import(
        &self,
        network: &mut Network,
        parent_id: &str,
        fragment: &Fragment,
    ) -> DomainResult<Vec<String>> {
        if !network.contains(parent_id) {
            return Err(ValidationError::ParentNotFound(parent_id.to_string()).into());
        }
        if fragment.nodes.is_empty() {
            debug!("empty fragment, nothing to import");
            return Ok(Vec::new());
        }

        let roots = fragment.local_roots();
        if roots.is_empty() {
            return Err(ValidationError::NoLocalRoots.into());
        }
        if let Some(cycle) = find_cycle(fragment.nodes.keys().map(String::as_str), |id| {
            fragment.in_fragment_children(id)
        }) {
            let at = cycle.first().cloned().unwrap_or_default();
            return Err(ValidationError::CyclicFragment(at).into());
        }

        let prefix = format!("{}_sub{}_", parent_id, self.stamp);
        let root_set: HashSet<&str> = roots.iter().copied().collect();
        let mut mapping: HashMap<&str, String> = HashMap::new();
        let mut added = Vec::with_capacity(fragment.nodes.len());

        // Pass 1: clone nodes breadth-first, attach local roots.
        let mut queue: VecDeque<&str> = roots.iter().copied().collect();
        while let Some(original) = queue.pop_front() {
            if mapping.contains_key(original) {
                continue;
            }
            let Some(attrs) = fragment.nodes.get(original) else {
                continue;
            };
            let new_id = network.unique_id(&format!("{prefix}{original}"));
            let mut node = Node::from_attributes(new_id.clone(), attrs);
            node.metrics.suggested_child_count = network.settings.min_children_threshold;
            network.insert(node);
            if root_set.contains(original) {
                network.link(parent_id, &new_id, DEFAULT_CAPACITY);
            }
            mapping.insert(original, new_id.clone());
            added.push(new_id);

            queue.extend(
                fragment
                    .in_fragment_children(original)
                    .into_iter()
                    .filter(|c| !mapping.contains_key(c)),
            );
        }

        // Pass 2: edges, once every endpoint has its new id.
        for (source, edges) in &fragment.graph {
            let Some(new_source) = mapping.get(source.as_str()) else {
                continue;
            };
            for edge in edges {
                if let Some(new_target) = mapping.get(edge.target.as_str()) {
                    network.link(new_source, new_target, edge.capacity);
                }
            }
        }

        if added.len() != fragment.nodes.len() {
            warn!(
                "imported {} of {} fragment nodes, the rest were unreachable",
                added.len(),
                fragment.nodes.len()
            );
        }
        network.recompute();
        info!("imported {} nodes under '{}'", added.len(), parent_id);
        Ok(added)
    }
}
