//! bizgraph: hierarchical business network model.
//!
//! Nodes form a rooted hierarchy (multiple parents are tolerated). After
//! every structural change a full pass derives depth, descendant counts,
//! profit and criticality; the network is persisted as one JSON document.

pub mod application;
pub mod cli;
pub mod config;
pub mod domain;
pub mod exitcode;
pub mod infrastructure;
pub mod util;
