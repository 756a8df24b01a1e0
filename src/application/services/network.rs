//! Network handle service
//!
//! Owns the live network and its persistence. Every mutation runs the
//! domain operation (which recomputes metrics once) and then saves the
//! snapshot. A failed save is returned to the caller while the in-memory
//! network stays authoritative; the next save can still succeed.

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::application::services::persistence::{LoadStatus, PersistenceService};
use crate::application::{ApplicationError, ApplicationResult};
use crate::domain::{
    BulkDeleteReport, Fragment, IntegrityError, Network, NetworkStats, NewNode, NodeInsight,
    Suggestion, ValidationError,
};

/// Explicit handle to one network document.
pub struct NetworkService {
    persistence: PersistenceService,
    network: Network,
    status: LoadStatus,
}

impl NetworkService {
    /// Load the network from disk. When no document exists yet the fresh
    /// network is saved right away; a failure to do so is only logged.
    #[instrument(level = "debug", skip_all)]
    pub fn initialize(persistence: PersistenceService) -> Self {
        let outcome = persistence.load();
        let service = Self {
            persistence,
            network: outcome.network,
            status: outcome.status,
        };
        if service.status == LoadStatus::Missing {
            if let Err(e) = service.persistence.save(&service.network) {
                warn!("initial save failed: {}", e);
            }
        }
        service
    }

    /// Discard the in-memory network and read the document again.
    pub fn reload(&mut self) -> &LoadStatus {
        let outcome = self.persistence.load();
        self.network = outcome.network;
        self.status = outcome.status;
        &self.status
    }

    pub fn status(&self) -> &LoadStatus {
        &self.status
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn persistence(&self) -> &PersistenceService {
        &self.persistence
    }

    fn commit(&self) -> ApplicationResult<()> {
        self.persistence.save(&self.network)
    }

    #[instrument(level = "debug", skip(self, spec))]
    pub fn add_node(&mut self, parent: Option<&str>, spec: NewNode) -> ApplicationResult<String> {
        let id = self.network.add_node(parent, spec)?;
        self.commit()?;
        info!("added node '{}'", id);
        Ok(id)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn remove_node(&mut self, id: &str) -> ApplicationResult<()> {
        self.network.remove_node(id)?;
        self.commit()?;
        info!("removed node '{}'", id);
        Ok(())
    }

    /// All-or-nothing validation, then delete. Persists whatever was deleted.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_nodes(&mut self, ids: &[String]) -> ApplicationResult<BulkDeleteReport> {
        let report = self.network.remove_nodes(ids)?;
        if report.deleted_count() > 0 || !report.is_complete() {
            self.commit()?;
        }
        info!(
            "bulk delete: {} deleted, {} failed",
            report.deleted_count(),
            report.failed.len()
        );
        Ok(report)
    }

    #[instrument(level = "debug", skip(self, fragment))]
    pub fn import_subtree(
        &mut self,
        parent: &str,
        fragment: &Fragment,
    ) -> ApplicationResult<Vec<String>> {
        let added = self.network.import_subtree(parent, fragment)?;
        if !added.is_empty() {
            self.commit()?;
        }
        Ok(added)
    }

    /// Parse a fragment document and import it under `parent`.
    pub fn import_subtree_json(
        &mut self,
        parent: &str,
        text: &str,
    ) -> ApplicationResult<Vec<String>> {
        let fragment = Fragment::from_json(text)?;
        self.import_subtree(parent, &fragment)
    }

    /// Replace the whole network with a caller-supplied document and save it.
    /// The previous file is kept as a backup by the save.
    #[instrument(level = "debug", skip_all)]
    pub fn replace_from_json(&mut self, text: &str) -> ApplicationResult<Vec<IntegrityError>> {
        let doc: Value = serde_json::from_str(text)
            .map_err(|e| ValidationError::InvalidDocument(format!("invalid JSON: {e}")))?;
        let loaded = Network::from_document_strict(
            &doc,
            self.network.settings().min_children_threshold,
        )?;
        self.network = loaded.network;
        self.commit()?;
        info!("replaced network, {} nodes", self.network.len());
        Ok(loaded.issues)
    }

    /// Full snapshot as a JSON document.
    pub fn snapshot(&self) -> ApplicationResult<Value> {
        self.network
            .to_document()
            .map_err(|e| ApplicationError::serialization("serialize network", e))
    }

    pub fn export_json(&self) -> ApplicationResult<String> {
        self.network
            .to_json_pretty()
            .map_err(|e| ApplicationError::serialization("export network", e))
    }

    pub fn insight(&self, id: &str) -> ApplicationResult<NodeInsight> {
        Ok(self.network.insight(id)?)
    }

    pub fn suggestions(&self, limit: usize) -> Vec<Suggestion> {
        self.network.suggestions(limit)
    }

    pub fn stats(&self) -> NetworkStats {
        self.network.stats()
    }

    /// Returns whether the threshold changed. Only a change recomputes and saves.
    #[instrument(level = "debug", skip(self))]
    pub fn update_settings(&mut self, min_children_threshold: i64) -> ApplicationResult<bool> {
        let changed = self
            .network
            .set_min_children_threshold(min_children_threshold)?;
        if changed {
            self.commit()?;
            info!("min_children_threshold set to {}", min_children_threshold);
        } else {
            debug!("min_children_threshold unchanged");
        }
        Ok(changed)
    }
}
