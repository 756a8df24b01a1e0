//! Domain entities: core data structures

use std::collections::BTreeMap;

use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::warn;

use crate::domain::error::ValidationError;

/// Value assigned to nodes created or imported without one.
pub const DEFAULT_NODE_VALUE: f64 = 1000.0;

/// Capacity of edges created without an explicit weight.
pub const DEFAULT_CAPACITY: f64 = 1.0;

/// Threshold used when neither the document nor the caller provides one.
pub const DEFAULT_MIN_CHILDREN_THRESHOLD: usize = 2;

/// Caller-supplied properties carried opaquely on a node.
pub type Properties = BTreeMap<String, Value>;

/// Keys owned by the core record; never stored in [`Properties`].
pub(crate) const RESERVED_KEYS: &[&str] = &[
    "id",
    "parents",
    "value",
    "depth",
    "children_count",
    "total_children",
    "profit",
    "criticality",
    "is_chokepoint",
    "needed_children",
    "suggested_child_count",
];

/// Fields written by older revisions of the document format.
pub(crate) const OBSOLETE_KEYS: &[&str] = &[
    "balance_score",
    "risk",
    "ponzi_value",
    "_current_depth_calculation",
    "suggested_children",
];

/// Metrics derived by the engine. Never trusted from input.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NodeMetrics {
    pub depth: usize,
    pub children_count: usize,
    pub total_children: usize,
    pub profit: f64,
    pub criticality: f64,
    pub is_chokepoint: bool,
    pub needed_children: usize,
    pub suggested_child_count: usize,
}

/// A business node.
///
/// `parents` mirrors the incoming edges of the adjacency graph. More than one
/// parent is tolerated by the data model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Node {
    pub id: String,
    pub parents: Vec<String>,
    pub value: f64,
    #[serde(flatten)]
    pub metrics: NodeMetrics,
    #[serde(flatten)]
    pub extra: Properties,
}

impl Node {
    pub fn new(id: impl Into<String>, value: f64, extra: Properties) -> Self {
        Self {
            id: id.into(),
            parents: Vec::new(),
            value,
            metrics: NodeMetrics::default(),
            extra: sanitize_properties(extra),
        }
    }

    /// Build a node from a raw attribute map.
    ///
    /// Computed and obsolete fields are discarded, a missing or non-numeric
    /// value falls back to [`DEFAULT_NODE_VALUE`]. Parents are left empty.
    pub(crate) fn from_attributes(id: impl Into<String>, attrs: &Map<String, Value>) -> Self {
        let id = id.into();
        let value = match attrs.get("value") {
            None | Some(Value::Null) => DEFAULT_NODE_VALUE,
            Some(raw) => lenient_value(raw).unwrap_or_else(|| {
                warn!("invalid value for node '{}': {}, using default", id, raw);
                DEFAULT_NODE_VALUE
            }),
        };
        let extra = attrs
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<Properties>();
        Self::new(id, value, extra)
    }

    pub fn is_root(&self) -> bool {
        self.parents.is_empty()
    }
}

/// Drop reserved and obsolete keys so the flattened record stays unambiguous.
pub(crate) fn sanitize_properties(mut props: Properties) -> Properties {
    props.retain(|k, _| {
        !RESERVED_KEYS.contains(&k.as_str()) && !OBSOLETE_KEYS.contains(&k.as_str())
    });
    props
}

/// Numbers and numeric strings are accepted.
pub(crate) fn lenient_value(raw: &Value) -> Option<f64> {
    let parsed = match raw {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|v| v.is_finite())
}

/// Parse a caller-supplied node value. Blank input means "use the default".
pub fn parse_node_value(raw: &str) -> Result<Option<f64>, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .map(Some)
        .ok_or_else(|| ValidationError::InvalidValue(raw.to_string()))
}

/// Parse `key=value` into a property. The value is JSON when it parses as
/// such, a plain string otherwise.
pub fn parse_property(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty property key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

/// Directed parent -> child edge as stored in the adjacency list of its source.
#[derive(Debug, Clone, PartialEq)]
pub struct Edge {
    pub target: String,
    pub capacity: f64,
}

impl Edge {
    pub fn new(target: impl Into<String>, capacity: f64) -> Self {
        Self {
            target: target.into(),
            capacity,
        }
    }
}

// Persisted as `[target, capacity]`.
impl Serialize for Edge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (&self.target, self.capacity).serialize(serializer)
    }
}

/// Tunables of the metrics policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NetworkSettings {
    pub min_children_threshold: usize,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            min_children_threshold: DEFAULT_MIN_CHILDREN_THRESHOLD,
        }
    }
}

impl NetworkSettings {
    pub fn new(min_children_threshold: usize) -> Self {
        Self {
            min_children_threshold: min_children_threshold.max(1),
        }
    }
}

/// Request to create a node.
#[derive(Debug, Clone, Default)]
pub struct NewNode {
    /// Requested id; suffixed with `_1`, `_2`, ... when taken
    pub id: Option<String>,
    /// Defaults to [`DEFAULT_NODE_VALUE`]
    pub value: Option<f64>,
    pub properties: Properties,
}

impl NewNode {
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_value(mut self, value: f64) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: Value) -> Self {
        self.properties.insert(key.into(), value);
        self
    }
}

/// Single-node view: the node's fields plus its direct neighbourhood.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeInsight {
    pub id: String,
    pub value: f64,
    pub depth: usize,
    pub children_count: usize,
    pub total_children: usize,
    pub profit: f64,
    pub criticality: f64,
    pub is_chokepoint: bool,
    pub needed_children: usize,
    pub suggested_children: usize,
    pub parents: Vec<String>,
    pub children: Vec<String>,
    #[serde(flatten)]
    pub extra: Properties,
}

/// A node that should receive more children.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Suggestion {
    pub id: String,
    pub criticality: f64,
    pub current_children: usize,
    pub suggested_children: usize,
    pub needed_children: usize,
    pub depth: usize,
    pub priority: f64,
    pub profit: f64,
    pub value: f64,
}

/// Whole-network totals.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkStats {
    pub total_nodes: usize,
    pub total_edges: usize,
    pub max_depth: usize,
    pub total_value: f64,
    pub total_profit: f64,
}

/// Per-id outcome of a bulk delete that passed validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BulkDeleteReport {
    pub deleted: Vec<String>,
    pub failed: BTreeMap<String, String>,
}

impl BulkDeleteReport {
    pub fn deleted_count(&self) -> usize {
        self.deleted.len()
    }

    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn given_blank_value_when_parsing_then_uses_default() {
        assert_eq!(parse_node_value("  ").unwrap(), None);
        assert_eq!(parse_node_value("12.5").unwrap(), Some(12.5));
    }

    #[test]
    fn given_non_numeric_value_when_parsing_then_rejects() {
        let err = parse_node_value("lots").unwrap_err();
        assert_eq!(err, ValidationError::InvalidValue("lots".into()));
        assert!(parse_node_value("NaN").is_err());
    }

    #[test]
    fn given_property_when_parsing_then_prefers_json() {
        assert_eq!(parse_property("tier=3").unwrap(), ("tier".into(), json!(3)));
        assert_eq!(
            parse_property("owner=acme corp").unwrap(),
            ("owner".into(), json!("acme corp"))
        );
        assert!(parse_property("novalue").is_err());
        assert!(parse_property("=x").is_err());
    }

    #[test]
    fn given_attributes_with_metrics_when_building_node_then_drops_them() {
        let attrs = json!({
            "value": "250",
            "depth": 9,
            "criticality": 0.9,
            "risk": 3,
            "region": "north"
        });
        let node = Node::from_attributes("n", attrs.as_object().unwrap());

        assert_eq!(node.value, 250.0);
        assert_eq!(node.metrics, NodeMetrics::default());
        assert_eq!(node.extra.len(), 1);
        assert_eq!(node.extra.get("region"), Some(&json!("north")));
    }

    #[test]
    fn given_bad_value_attribute_when_building_node_then_falls_back() {
        let attrs = json!({ "value": [1, 2] });
        let node = Node::from_attributes("n", attrs.as_object().unwrap());
        assert_eq!(node.value, DEFAULT_NODE_VALUE);
    }

    #[test]
    fn given_node_when_serializing_then_fields_are_flat() {
        let mut extra = Properties::new();
        extra.insert("region".into(), json!("south"));
        extra.insert("depth".into(), json!(99));
        let node = Node::new("a", 10.0, extra);

        let value = serde_json::to_value(&node).unwrap();

        assert_eq!(value["id"], json!("a"));
        assert_eq!(value["depth"], json!(0));
        assert_eq!(value["region"], json!("south"));
        assert_eq!(value["suggested_child_count"], json!(0));
    }

    #[test]
    fn given_edge_when_serializing_then_is_pair() {
        let edge = Edge::new("b", 2.5);
        assert_eq!(serde_json::to_value(&edge).unwrap(), json!(["b", 2.5]));
    }
}
