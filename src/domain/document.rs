//! Network <-> JSON document mapping.
//!
//! Layout: `{"nodes": {id: {...}}, "graph": {id: [[target, capacity]]},
//! "settings": {"min_children_threshold": n, "max_depth": d}}`.
//! Reading is lenient: unknown fields pass through, computed fields are
//! discarded and rebuilt, broken references are repaired or dropped.

use std::collections::BTreeMap;

use itertools::Itertools;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::domain::entities::{Edge, NetworkSettings, Node, DEFAULT_CAPACITY};
use crate::domain::error::{IntegrityError, ValidationError};
use crate::domain::network::Network;

#[derive(Serialize)]
struct Document<'a> {
    nodes: &'a BTreeMap<String, Node>,
    graph: &'a BTreeMap<String, Vec<Edge>>,
    settings: DocumentSettings,
}

#[derive(Serialize)]
struct DocumentSettings {
    min_children_threshold: usize,
    max_depth: usize,
}

/// A freshly read network together with what had to be repaired on the way.
#[derive(Debug)]
pub struct LoadedNetwork {
    pub network: Network,
    pub issues: Vec<IntegrityError>,
}

/// Parse one adjacency list. Entries are `[target]` or `[target, capacity]`;
/// malformed entries are skipped, a missing or non-numeric capacity becomes 1.0.
pub(crate) fn parse_edges(source: &str, raw: &Value) -> Vec<Edge> {
    let Some(entries) = raw.as_array() else {
        warn!("adjacency list of '{}' is not an array, ignoring", source);
        return Vec::new();
    };
    entries
        .iter()
        .filter_map(|entry| {
            let pair = entry.as_array()?;
            let target = pair.first()?.as_str()?;
            let capacity = pair
                .get(1)
                .and_then(|c| match c {
                    Value::Number(n) => n.as_f64(),
                    Value::String(s) => s.trim().parse::<f64>().ok(),
                    _ => None,
                })
                .filter(|c| c.is_finite())
                .unwrap_or(DEFAULT_CAPACITY);
            Some(Edge::new(target, capacity))
        })
        .collect()
}

fn parse_threshold(settings: Option<&Value>) -> Option<usize> {
    let raw = settings?.get("min_children_threshold")?;
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }?;
    parsed
        .is_finite()
        .then(|| parsed.max(1.0).trunc() as usize)
}

fn section<'a>(
    object: &'a Map<String, Value>,
    name: &str,
    strict: bool,
) -> Result<Option<&'a Map<String, Value>>, ValidationError> {
    match (object.get(name), strict) {
        (Some(Value::Object(map)), _) => Ok(Some(map)),
        (_, true) => Err(ValidationError::InvalidDocument(format!(
            "'{name}' must be a map"
        ))),
        (None | Some(Value::Null), false) => Ok(None),
        (Some(_), false) => {
            warn!("ignoring malformed '{}' section", name);
            Ok(None)
        }
    }
}

fn parse_parents(attrs: &Map<String, Value>) -> Vec<String> {
    attrs
        .get("parents")
        .and_then(Value::as_array)
        .map(|parents| {
            parents
                .iter()
                .filter_map(Value::as_str)
                .map(String::from)
                .unique()
                .collect()
        })
        .unwrap_or_default()
}

impl Network {
    pub fn to_document(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self.document())
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(&self.document())
    }

    fn document(&self) -> Document<'_> {
        Document {
            nodes: &self.nodes,
            graph: &self.graph,
            settings: DocumentSettings {
                min_children_threshold: self.settings.min_children_threshold,
                max_depth: self.max_depth,
            },
        }
    }

    /// Read a stored document. Missing sections default to empty; the
    /// threshold falls back to `fallback_threshold` when absent.
    pub fn from_document(
        doc: &Value,
        fallback_threshold: usize,
    ) -> Result<LoadedNetwork, ValidationError> {
        Self::read_document(doc, fallback_threshold, false)
    }

    /// Like [`Network::from_document`], but `nodes` and `graph` must both be
    /// present as maps. Used for documents handed in by a caller.
    pub fn from_document_strict(
        doc: &Value,
        fallback_threshold: usize,
    ) -> Result<LoadedNetwork, ValidationError> {
        Self::read_document(doc, fallback_threshold, true)
    }

    fn read_document(
        doc: &Value,
        fallback_threshold: usize,
        strict: bool,
    ) -> Result<LoadedNetwork, ValidationError> {
        let object = doc
            .as_object()
            .ok_or_else(|| ValidationError::InvalidDocument("expected a JSON object".into()))?;

        let nodes = section(object, "nodes", strict)?;
        let graph = section(object, "graph", strict)?;

        let threshold =
            parse_threshold(object.get("settings")).unwrap_or_else(|| fallback_threshold.max(1));
        let mut network = Network::new(NetworkSettings::new(threshold));

        for (id, raw) in nodes.into_iter().flatten() {
            let Some(attrs) = raw.as_object() else {
                warn!("skipping node '{}': not an object", id);
                continue;
            };
            let mut node = Node::from_attributes(id.clone(), attrs);
            node.parents = parse_parents(attrs);
            network.insert(node);
        }

        let mut issues = Vec::new();
        for (source, raw) in graph.into_iter().flatten() {
            for edge in parse_edges(source, raw) {
                if !network.contains(source) || !network.contains(&edge.target) {
                    issues.push(IntegrityError::DanglingEdge {
                        source_id: source.clone(),
                        target_id: edge.target,
                    });
                    continue;
                }
                let missing_pointer = network
                    .node(&edge.target)
                    .is_some_and(|child| !child.parents.contains(source));
                if network.link(source, &edge.target, edge.capacity) && missing_pointer {
                    issues.push(IntegrityError::AsymmetricLink {
                        parent: source.clone(),
                        child: edge.target.clone(),
                    });
                }
            }
        }

        let mut missing_edges = Vec::new();
        for node in network.nodes() {
            for parent in &node.parents {
                let linked = network.edges(parent).iter().any(|e| e.target == node.id);
                if network.contains(parent) && !linked {
                    missing_edges.push((parent.clone(), node.id.clone()));
                }
            }
        }
        for (parent, child) in missing_edges {
            network.link(&parent, &child, DEFAULT_CAPACITY);
            issues.push(IntegrityError::AsymmetricLink { parent, child });
        }

        issues.extend(network.recompute());
        debug!(
            "read network: {} nodes, {} edges, {} repairs",
            network.len(),
            network.edge_count(),
            issues.len()
        );
        Ok(LoadedNetwork { network, issues })
    }
}
