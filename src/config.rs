//! Pool configuration.
//!
//! Configuration is optional: the defaults run a two-worker pool with an
//! auto-discovered interpreter. A JSON config file can be named explicitly,
//! through `PYSCOUT_CONFIG`, or dropped at the conventional per-user location
//! (`<config dir>/pyscout/config.json`); the first source that exists wins.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PyscoutError, PyscoutResult};

// ============================================================================
// Constants
// ============================================================================

/// Environment variable naming a config file.
pub const CONFIG_ENV_VAR: &str = "PYSCOUT_CONFIG";

const CONFIG_DIR_NAME: &str = "pyscout";
const CONFIG_FILE_NAME: &str = "config.json";

fn default_worker_count() -> usize {
    2
}

fn default_shutdown_grace_ms() -> u64 {
    1000
}

// ============================================================================
// PyscoutConfig
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PyscoutConfig {
    /// Number of parser workers to spawn.
    pub worker_count: usize,
    /// Interpreter override; discovery applies when absent.
    pub python: Option<PathBuf>,
    /// Directory for rendezvous sockets and the worker script. Defaults to
    /// a scratch directory under the system temp dir.
    pub socket_dir: Option<PathBuf>,
    /// How long a worker gets to exit after the terminate signal before it
    /// is killed.
    pub shutdown_grace_ms: u64,
    /// Replace crashed workers instead of running with a smaller pool.
    pub respawn_crashed: bool,
}

impl Default for PyscoutConfig {
    fn default() -> Self {
        Self {
            worker_count: default_worker_count(),
            python: None,
            socket_dir: None,
            shutdown_grace_ms: default_shutdown_grace_ms(),
            respawn_crashed: false,
        }
    }
}

impl PyscoutConfig {
    /// Loads configuration from the first available source: the explicit
    /// path, `PYSCOUT_CONFIG`, the per-user config file, then defaults.
    pub fn load(explicit: Option<&Path>) -> PyscoutResult<PyscoutConfig> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::from_file(Path::new(&path));
        }
        if let Some(path) = Self::user_config_path() {
            if path.exists() {
                return Self::from_file(&path);
            }
        }
        Ok(Self::default())
    }

    /// Reads and validates one config file.
    pub fn from_file(path: &Path) -> PyscoutResult<PyscoutConfig> {
        let text = fs::read_to_string(path).map_err(|source| PyscoutError::io(path, source))?;
        let config: PyscoutConfig = serde_json::from_str(&text)
            .map_err(|error| PyscoutError::config(format!("{}: {error}", path.display())))?;
        config.validate()?;
        debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// `<config dir>/pyscout/config.json`, if a config dir exists.
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    pub fn validate(&self) -> PyscoutResult<()> {
        if self.worker_count == 0 {
            return Err(PyscoutError::config("worker_count must be at least 1"));
        }
        Ok(())
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

// ============================================================================
// Tests
// ============================================================================
