//! Configuration management with layered loading
//!
//! Precedence (lowest to highest):
//! 1. Compiled defaults
//! 2. Global config: `$XDG_CONFIG_HOME/bizgraph/bizgraph.toml`
//! 3. Environment variables: `BIZGRAPH_*` prefix
//! 4. Explicit data directory override (CLI `--data-dir`)

use std::path::{Path, PathBuf};

use config::{Config, ConfigError, Environment};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::application::ApplicationError;
use crate::domain::DEFAULT_MIN_CHILDREN_THRESHOLD;

const APP_NAME: &str = "bizgraph";
const ENV_PREFIX: &str = "BIZGRAPH";
pub const DEFAULT_NETWORK_FILE: &str = "network.json";

/// Raw settings for intermediate parsing.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RawSettings {
    pub data_dir: Option<PathBuf>,
    pub network_file: Option<String>,
    pub min_children_threshold: Option<i64>,
}

/// Unified configuration for bizgraph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Settings {
    /// Directory holding the network file and its backups
    pub data_dir: PathBuf,
    /// File name of the working network document inside `data_dir`
    pub network_file: String,
    /// Threshold for networks created from scratch
    pub min_children_threshold: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            network_file: DEFAULT_NETWORK_FILE.to_string(),
            min_children_threshold: DEFAULT_MIN_CHILDREN_THRESHOLD,
        }
    }
}

/// Platform data directory, falling back to `~/.bizgraph/data`.
fn default_data_dir() -> PathBuf {
    ProjectDirs::from("", "", APP_NAME)
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("~/.bizgraph/data"))
}

/// Get the XDG config directory for bizgraph.
pub fn global_config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the global config file.
pub fn global_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join(format!("{APP_NAME}.toml")))
}

/// Load a TOML file into RawSettings for manual merging.
fn load_raw_settings(path: &Path) -> Result<RawSettings, ApplicationError> {
    let content = std::fs::read_to_string(path).map_err(|e| ApplicationError::Config {
        message: format!("read {}: {}", path.display(), e),
    })?;
    toml::from_str(&content).map_err(|e| ApplicationError::Config {
        message: format!("parse {}: {}", path.display(), e),
    })
}

fn threshold_from(raw: i64, origin: &str) -> Result<usize, ApplicationError> {
    if raw < 1 {
        return Err(ApplicationError::Config {
            message: format!("{origin}: min_children_threshold must be at least 1, got {raw}"),
        });
    }
    Ok(raw as usize)
}

impl Settings {
    /// Full path of the working network document.
    pub fn network_path(&self) -> PathBuf {
        self.data_dir.join(&self.network_file)
    }

    /// Expand shell variables and tilde in path-like fields.
    ///
    /// Handles `~`, `$VAR`, and `${VAR}` syntax. Unresolvable input is kept.
    fn expand_paths(&mut self) {
        let raw = self.data_dir.to_string_lossy().to_string();
        let expanded = shellexpand::full(&raw)
            .map(|s| s.into_owned())
            .unwrap_or(raw);
        self.data_dir = PathBuf::from(expanded);
    }

    fn apply(&self, overlay: &RawSettings, origin: &str) -> Result<Self, ApplicationError> {
        let min_children_threshold = match overlay.min_children_threshold {
            Some(raw) => threshold_from(raw, origin)?,
            None => self.min_children_threshold,
        };
        Ok(Self {
            data_dir: overlay
                .data_dir
                .clone()
                .unwrap_or_else(|| self.data_dir.clone()),
            network_file: overlay
                .network_file
                .clone()
                .unwrap_or_else(|| self.network_file.clone()),
            min_children_threshold,
        })
    }

    /// Load settings with layered precedence.
    ///
    /// # Arguments
    /// * `data_dir` - Optional data directory that wins over every other layer
    pub fn load(data_dir: Option<&Path>) -> Result<Self, ApplicationError> {
        Self::load_from(global_config_path().as_deref(), data_dir)
    }

    /// Same as [`Settings::load`] with an explicit global config location.
    pub fn load_from(
        global_path: Option<&Path>,
        data_dir: Option<&Path>,
    ) -> Result<Self, ApplicationError> {
        // 1. Start with defaults
        let mut current = Self::default();

        // 2. Global config file
        if let Some(global_path) = global_path {
            if global_path.exists() {
                let raw = load_raw_settings(global_path)?;
                current = current.apply(&raw, &global_path.display().to_string())?;
            }
        }

        // 3. Environment variables
        current = current.apply_env_overrides(Self::environment())?;

        // 4. Explicit override
        if let Some(dir) = data_dir {
            current.data_dir = dir.to_path_buf();
        }

        current.expand_paths();
        Ok(current)
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
    }

    /// Apply BIZGRAPH_* environment variables as explicit overrides.
    fn apply_env_overrides(self, env: Environment) -> Result<Self, ApplicationError> {
        let config = Config::builder()
            .add_source(env)
            .build()
            .map_err(config_err)?;

        let raw = RawSettings {
            data_dir: config.get_string("data_dir").ok().map(PathBuf::from),
            network_file: config.get_string("network_file").ok(),
            min_children_threshold: match config.get_string("min_children_threshold") {
                Ok(val) => Some(val.trim().parse::<i64>().map_err(|e| {
                    ApplicationError::Config {
                        message: format!(
                            "{ENV_PREFIX}_MIN_CHILDREN_THRESHOLD: invalid number '{val}': {e}"
                        ),
                    }
                })?),
                Err(_) => None,
            },
        };
        self.apply(&raw, "environment")
    }

    /// Show the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ApplicationError> {
        toml::to_string_pretty(self).map_err(|e| ApplicationError::Config {
            message: format!("serialize config: {e}"),
        })
    }

    /// Generate a template config file.
    pub fn template() -> String {
        r#"# bizgraph configuration
#
# Locations (by precedence, lowest to highest):
#   Global: ~/.config/bizgraph/bizgraph.toml
#   Env:    BIZGRAPH_* environment variables (e.g. BIZGRAPH_DATA_DIR)
#   CLI:    --data-dir

# Directory for the network file and its timestamped backups
# data_dir = "~/.local/share/bizgraph"

# Name of the working network document inside data_dir
# network_file = "network.json"

# Minimum children per node for networks created from scratch
# min_children_threshold = 2
"#
        .to_string()
    }
}

fn config_err(e: ConfigError) -> ApplicationError {
    ApplicationError::Config {
        message: e.to_string(),
    }
}
