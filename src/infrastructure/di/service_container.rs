//! Service container for dependency injection
//!
//! Wires up all services with their dependencies.

use std::sync::Arc;

use crate::application::services::{NetworkService, PersistenceService};
use crate::config::Settings;
use crate::infrastructure::traits::{FileSystem, RealFileSystem};

/// Container holding all application services.
pub struct ServiceContainer {
    /// Application settings
    pub settings: Arc<Settings>,

    /// Filesystem abstraction
    pub fs: Arc<dyn FileSystem>,
}

impl ServiceContainer {
    /// Create a new service container with real implementations.
    pub fn new(settings: Settings) -> Self {
        Self::with_deps(settings, Arc::new(RealFileSystem))
    }

    /// Create a service container with custom dependencies (for testing).
    pub fn with_deps(settings: Settings, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            settings: Arc::new(settings),
            fs,
        }
    }

    /// Persistence for the configured network document.
    pub fn persistence_service(&self) -> PersistenceService {
        PersistenceService::new(
            Arc::clone(&self.fs),
            self.settings.network_path(),
            self.settings.min_children_threshold,
        )
    }

    /// Open the configured network (load, or create and save when missing).
    pub fn network_service(&self) -> NetworkService {
        NetworkService::initialize(self.persistence_service())
    }
}
