//! Configuration loading and management
//!
//! # Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//! 1. Built-in defaults
//! 2. Global config: ~/.config/nerve/config.toml
//! 3. Project config: .nerve/config.toml
//! 4. Environment variables: NERVE_*
//! 5. Builder overrides from the embedding caller
//!
//! # Example Config
//!
//! ```toml
//! project_name = "checkout-service"
//! lock_timeout_secs = 1800
//! database_url = "sqlite://.nerve/coordination.db"
//! state_file = "history/nerve-center-state.json"
//! history_dir = "history"
//! sweep_interval_secs = 60
//! ```

mod load;

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

pub use load::{
    apply_env_with, global_config_path, load_config, load_config_in, load_toml_file,
    project_config_path,
};

use crate::{Error, Result};

/// Maximum project name length.
pub const MAX_PROJECT_NAME_LEN: usize = 255;

/// Default lock staleness timeout (30 minutes).
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 1800;

/// Resolved engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Project name resolved to a project id once per engine.
    pub project_name: String,
    /// Seconds after which an unrefreshed lock is treated as absent.
    pub lock_timeout_secs: u64,
    /// Durable store URL. `None` runs the engine in local mode.
    pub database_url: Option<String>,
    /// Snapshot file for the local store.
    pub state_file: PathBuf,
    /// Directory receiving archived session notepads.
    pub history_dir: PathBuf,
    /// Background sweep period; 0 disables the sweeper.
    pub sweep_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project_name: "default".to_string(),
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
            database_url: None,
            state_file: PathBuf::from("history/nerve-center-state.json"),
            history_dir: PathBuf::from("history"),
            sweep_interval_secs: 0,
        }
    }
}

/// One configuration layer as read from a TOML file. Absent keys keep the
/// value of the layer below.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigLayer {
    pub project_name: Option<String>,
    pub lock_timeout_secs: Option<u64>,
    pub database_url: Option<String>,
    pub state_file: Option<PathBuf>,
    pub history_dir: Option<PathBuf>,
    pub sweep_interval_secs: Option<u64>,
}

impl Config {
    /// Config for a self-contained local engine rooted at `dir`.
    pub fn local(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            state_file: dir.join("nerve-center-state.json"),
            history_dir: dir.join("history"),
            ..Self::default()
        }
    }

    /// Merge a file layer into this config (layer takes precedence).
    pub fn merge(self, layer: ConfigLayer) -> Self {
        Self {
            project_name: layer.project_name.unwrap_or(self.project_name),
            lock_timeout_secs: layer.lock_timeout_secs.unwrap_or(self.lock_timeout_secs),
            database_url: layer.database_url.or(self.database_url),
            state_file: layer.state_file.unwrap_or(self.state_file),
            history_dir: layer.history_dir.unwrap_or(self.history_dir),
            sweep_interval_secs: layer
                .sweep_interval_secs
                .unwrap_or(self.sweep_interval_secs),
        }
    }

    #[must_use]
    pub fn with_project_name(mut self, name: impl Into<String>) -> Self {
        self.project_name = name.into();
        self
    }

    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout_secs = timeout.as_secs();
        self
    }

    #[must_use]
    pub fn with_database_url(mut self, url: impl Into<String>) -> Self {
        self.database_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = path.into();
        self
    }

    #[must_use]
    pub fn with_history_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.history_dir = path.into();
        self
    }

    #[must_use]
    pub const fn with_sweep_interval(mut self, interval: Duration) -> Self {
        self.sweep_interval_secs = interval.as_secs();
        self
    }

    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }

    /// Sweep period, or `None` when the background sweeper is disabled.
    pub const fn sweep_interval(&self) -> Option<Duration> {
        if self.sweep_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.sweep_interval_secs))
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` for an empty or overlong project name, an empty
    /// state file or history dir, or an empty database URL.
    pub fn validate(&self) -> Result<()> {
        let name = self.project_name.trim();
        if name.is_empty() {
            return Err(Error::invalid_config("project_name cannot be empty"));
        }
        if name.chars().count() > MAX_PROJECT_NAME_LEN {
            return Err(Error::invalid_config(format!(
                "project_name cannot exceed {MAX_PROJECT_NAME_LEN} characters"
            )));
        }
        if self.state_file.as_os_str().is_empty() {
            return Err(Error::invalid_config("state_file cannot be empty"));
        }
        if self.history_dir.as_os_str().is_empty() {
            return Err(Error::invalid_config("history_dir cannot be empty"));
        }
        if self
            .database_url
            .as_deref()
            .is_some_and(|url| url.trim().is_empty())
        {
            return Err(Error::invalid_config(
                "database_url cannot be empty - unset it to run in local mode",
            ));
        }
        Ok(())
    }
}
