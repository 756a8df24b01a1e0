//! Domain-level errors (no external dependencies)

use std::collections::BTreeMap;

use thiserror::Error;

/// Caller mistakes. Rejected before any state changes.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("parent node '{0}' does not exist")]
    ParentNotFound(String),

    #[error("cannot add multiple root nodes, specify a parent")]
    DuplicateRoot,

    #[error("node '{0}' not found")]
    NodeNotFound(String),

    #[error("cannot remove node '{0}' with children, remove children first")]
    HasChildren(String),

    #[error("no node ids provided for deletion")]
    EmptySelection,

    #[error("cannot perform bulk delete: {}", format_reasons(.0))]
    BulkRejected(BTreeMap<String, String>),

    #[error("min_children_threshold must be at least 1, got {0}")]
    ThresholdOutOfRange(i64),

    #[error("invalid value '{0}': must be a number")]
    InvalidValue(String),

    #[error("invalid subtree data: {0}")]
    MalformedFragment(String),

    #[error("subtree has no local root (malformed or cyclic fragment)")]
    NoLocalRoots,

    #[error("subtree contains a cycle through '{0}'")]
    CyclicFragment(String),

    #[error("invalid network document: {0}")]
    InvalidDocument(String),
}

fn format_reasons(reasons: &BTreeMap<String, String>) -> String {
    reasons
        .iter()
        .map(|(id, reason)| format!("{id}: {reason}"))
        .collect::<Vec<_>>()
        .join("; ")
}

/// Structural damage found while recomputing or loading.
/// Reported as diagnostics; the network stays usable.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IntegrityError {
    #[error("cycle detected in parent relation: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    #[error("dangling edge dropped: {source_id} -> {target_id}")]
    DanglingEdge {
        source_id: String,
        target_id: String,
    },

    #[error("orphaned node without parents: {0}")]
    OrphanedNode(String),

    #[error("asymmetric link repaired: {parent} -> {child}")]
    AsymmetricLink { parent: String, child: String },
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DomainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

pub type DomainResult<T> = Result<T, DomainError>;
