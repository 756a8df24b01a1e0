//! Domain layer: entities and business logic
//!
//! This layer is independent of external concerns (no I/O, no CLI, no config loading).

pub mod document;
pub mod entities;
pub mod error;
pub mod import;
pub mod metrics;
pub mod network;
pub mod ranking;

pub use document::LoadedNetwork;
pub use entities::*;
pub use error::{DomainError, DomainResult, IntegrityError, ValidationError};
pub use import::{Fragment, SubtreeImporter};
pub use metrics::MetricsEngine;
pub use network::{Network, ROOT_ID};
pub use ranking::{SuggestionRanker, DEFAULT_SUGGESTION_LIMIT};
