//! Network document persistence
//!
//! Writes go through a sibling temporary file that is renamed over the live
//! document, so readers never observe a half-written file. The previous
//! document is copied to a timestamped backup first.
//!
//! ```text
//! data_dir/
//!   network.json                               <- live document
//!   network.json.tmp                           <- only while saving
//!   network_backup_20240101_120000_000001.json <- one per save, never pruned
//! ```

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use serde_json::Value;
use tracing::{debug, error, info, instrument, warn};

use crate::application::{ApplicationError, ApplicationResult, IoResultExt};
use crate::domain::{IntegrityError, Network, NetworkSettings};
use crate::infrastructure::traits::FileSystem;

/// How a load ended up producing its network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    /// No document on disk; a fresh network was created.
    Missing,
    /// Document read successfully.
    Loaded,
    /// Document present but unusable; a fresh network replaces it.
    Recovered(String),
}

#[derive(Debug)]
pub struct LoadOutcome {
    pub network: Network,
    pub status: LoadStatus,
    pub issues: Vec<IntegrityError>,
}

/// Reads and writes the working network document.
pub struct PersistenceService {
    fs: Arc<dyn FileSystem>,
    path: PathBuf,
    default_threshold: usize,
}

impl PersistenceService {
    /// Create a persistence service for the document at `path`.
    pub fn new(fs: Arc<dyn FileSystem>, path: PathBuf, default_threshold: usize) -> Self {
        Self {
            fs,
            path,
            default_threshold: default_threshold.max(1),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling path the snapshot is written to before the rename.
    pub fn temp_path(&self) -> PathBuf {
        let mut name: OsString = self.path.as_os_str().to_owned();
        name.push(".tmp");
        PathBuf::from(name)
    }

    /// `<stem>_backup_<YYYYmmdd_HHMMSS_micros>.<ext>` next to the document.
    pub fn backup_path(&self, stamp: &str) -> PathBuf {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "network".to_string());
        let ext = self
            .path
            .extension()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_else(|| "json".to_string());
        self.path.with_file_name(format!("{stem}_backup_{stamp}.{ext}"))
    }

    fn fresh_network(&self) -> Network {
        Network::new(NetworkSettings::new(self.default_threshold))
    }

    /// Persist a full snapshot of `network`.
    ///
    /// A backup failure is logged and ignored. On a write failure the
    /// temporary file is removed and the live document is left as it was.
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    pub fn save(&self, network: &Network) -> ApplicationResult<()> {
        let content = network
            .to_json_pretty()
            .map_err(|e| ApplicationError::serialization("serialize network", e))?;

        self.fs
            .ensure_parent(&self.path)
            .with_path_context("create data directory for", &self.path)?;

        if self.fs.exists(&self.path) {
            self.backup();
        }

        let tmp = self.temp_path();
        let written = self
            .fs
            .write(&tmp, &content)
            .with_path_context("write temporary file", &tmp)
            .and_then(|_| {
                self.fs
                    .rename(&tmp, &self.path)
                    .with_path_context("replace network file", &self.path)
            });

        if let Err(e) = written {
            error!("save failed: {}", e);
            if self.fs.exists(&tmp) {
                if let Err(cleanup) = self.fs.remove_file(&tmp) {
                    warn!("could not remove {}: {}", tmp.display(), cleanup);
                }
            }
            return Err(e);
        }

        info!("saved {} nodes to {}", network.len(), self.path.display());
        Ok(())
    }

    /// Best-effort copy of the current document.
    fn backup(&self) {
        let stamp = Local::now().format("%Y%m%d_%H%M%S_%6f").to_string();
        let backup = self.backup_path(&stamp);
        match self.fs.copy(&self.path, &backup) {
            Ok(_) => debug!("backup written: {}", backup.display()),
            Err(e) => warn!("backup of {} failed: {}", self.path.display(), e),
        }
    }

    /// Read the document. Never fails: a missing or unusable file yields a
    /// fresh network and the reason is reported in the outcome.
    #[instrument(level = "debug", skip_all, fields(path = %self.path.display()))]
    pub fn load(&self) -> LoadOutcome {
        if !self.fs.exists(&self.path) {
            info!("no network file at {}, starting fresh", self.path.display());
            return LoadOutcome {
                network: self.fresh_network(),
                status: LoadStatus::Missing,
                issues: Vec::new(),
            };
        }

        match self.read() {
            Ok((network, issues)) => {
                info!("loaded {} nodes from {}", network.len(), self.path.display());
                LoadOutcome {
                    network,
                    status: LoadStatus::Loaded,
                    issues,
                }
            }
            Err(e) => {
                error!("could not load {}: {}, starting fresh", self.path.display(), e);
                LoadOutcome {
                    network: self.fresh_network(),
                    status: LoadStatus::Recovered(e.to_string()),
                    issues: Vec::new(),
                }
            }
        }
    }

    fn read(&self) -> ApplicationResult<(Network, Vec<IntegrityError>)> {
        let content = self
            .fs
            .read_to_string(&self.path)
            .with_path_context("read network file", &self.path)?;
        let doc: Value = serde_json::from_str(&content)
            .map_err(|e| ApplicationError::serialization("parse network file", e))?;
        let loaded = Network::from_document(&doc, self.default_threshold)?;
        Ok((loaded.network, loaded.issues))
    }
}
