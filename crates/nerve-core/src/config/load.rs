//! Configuration loading from files and environment
//!
//! This module handles loading configuration from:
//! 1. Built-in defaults
//! 2. Global config: ~/.config/nerve/config.toml
//! 3. Project config: .nerve/config.toml
//! 4. Environment variables: NERVE_*

use std::path::{Path, PathBuf};

use super::{Config, ConfigLayer};
use crate::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC API
// ═══════════════════════════════════════════════════════════════════════════

/// Load configuration for the current directory.
///
/// # Errors
///
/// Returns error if:
/// - The current directory cannot be determined
/// - A config file is malformed TOML
/// - An environment variable holds an unparsable value
/// - The merged config fails validation
pub fn load_config() -> Result<Config> {
    let project_path = project_config_path()?;
    load_layers(global_config_path().as_deref(), &project_path, |key| {
        std::env::var(key).ok()
    })
}

/// Load configuration for a project rooted at `root`.
///
/// # Errors
///
/// Same as [`load_config`].
pub fn load_config_in(root: &Path) -> Result<Config> {
    load_layers(
        global_config_path().as_deref(),
        &root.join(".nerve/config.toml"),
        |key| std::env::var(key).ok(),
    )
}

fn load_layers(
    global_path: Option<&Path>,
    project_path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<Config> {
    let config = Config::default();

    let config = match global_path.filter(|path| path.exists()) {
        Some(path) => config.merge(load_toml_file(path)?),
        None => config,
    };

    let config = if project_path.exists() {
        config.merge(load_toml_file(project_path)?)
    } else {
        config
    };

    let config = apply_env_with(config, lookup)?;
    config.validate()?;
    Ok(config)
}

// ═══════════════════════════════════════════════════════════════════════════
// PATH HELPERS
// ═══════════════════════════════════════════════════════════════════════════

/// Get path to global config file
pub fn global_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "nerve")
        .map(|proj_dirs| proj_dirs.config_dir().join("config.toml"))
}

/// Get path to project config file
///
/// # Errors
///
/// Returns error if current directory cannot be determined
pub fn project_config_path() -> Result<PathBuf> {
    std::env::current_dir()
        .map(|dir| dir.join(".nerve/config.toml"))
        .map_err(|e| Error::io_error(format!("Failed to get current directory: {e}")))
}

/// Load a TOML file into a config layer
///
/// # Errors
///
/// Returns error if:
/// - Path is a directory instead of a file
/// - File cannot be read
/// - TOML is malformed or names an unknown key
pub fn load_toml_file(path: &Path) -> Result<ConfigLayer> {
    if path.is_dir() {
        return Err(Error::io_error(format!(
            "Config path is a directory, not a file: {}",
            path.display()
        )));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::io_error(format!(
            "Failed to read config file {}: {e}",
            path.display()
        ))
    })?;

    toml::from_str(&content).map_err(|e| {
        Error::parse_error(format!(
            "Failed to parse config file {}: {e}",
            path.display()
        ))
    })
}

// ═══════════════════════════════════════════════════════════════════════════
// ENVIRONMENT VARIABLE OVERRIDES
// ═══════════════════════════════════════════════════════════════════════════

/// Apply `NERVE_*` overrides read through `lookup`.
///
/// An empty `NERVE_DATABASE_URL` forces local mode.
///
/// # Errors
///
/// Returns `InvalidConfig` naming the variable when a numeric value does not parse.
pub fn apply_env_with(mut config: Config, lookup: impl Fn(&str) -> Option<String>) -> Result<Config> {
    if let Some(value) = lookup("NERVE_PROJECT_NAME") {
        config.project_name = value;
    }

    if let Some(value) = lookup("NERVE_LOCK_TIMEOUT_SECS") {
        config.lock_timeout_secs = parse_u64("NERVE_LOCK_TIMEOUT_SECS", &value)?;
    }

    if let Some(value) = lookup("NERVE_DATABASE_URL") {
        config.database_url = Some(value).filter(|url| !url.trim().is_empty());
    }

    if let Some(value) = lookup("NERVE_CENTER_STATE_FILE") {
        config.state_file = PathBuf::from(value);
    }

    if let Some(value) = lookup("NERVE_HISTORY_DIR") {
        config.history_dir = PathBuf::from(value);
    }

    if let Some(value) = lookup("NERVE_SWEEP_INTERVAL_SECS") {
        config.sweep_interval_secs = parse_u64("NERVE_SWEEP_INTERVAL_SECS", &value)?;
    }

    Ok(config)
}

fn parse_u64(key: &str, value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .map_err(|e| Error::invalid_config(format!("Invalid {key} value '{value}': {e}")))
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, io::Write};

    use serial_test::serial;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn write_file(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut file = std::fs::File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }

    #[test]
    fn test_no_files_returns_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let config = load_layers(None, &dir.path().join(".nerve/config.toml"), env(&[]))?;
        assert_eq!(config, Config::default());
        Ok(())
    }

    #[test]
    fn test_project_overrides_global() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let global = dir.path().join("global.toml");
        let project = dir.path().join(".nerve/config.toml");
        write_file(&global, "project_name = \"global\"\nlock_timeout_secs = 10\n")?;
        write_file(&project, "project_name = \"project\"\n")?;

        let config = load_layers(Some(&global), &project, env(&[]))?;
        assert_eq!(config.project_name, "project");
        assert_eq!(config.lock_timeout_secs, 10);
        Ok(())
    }

    #[test]
    fn test_env_overrides_files() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let project = dir.path().join(".nerve/config.toml");
        write_file(&project, "lock_timeout_secs = 10\n")?;

        let config = load_layers(
            None,
            &project,
            env(&[
                ("NERVE_LOCK_TIMEOUT_SECS", "90"),
                ("NERVE_DATABASE_URL", "sqlite://x.db"),
                ("NERVE_CENTER_STATE_FILE", "state.json"),
            ]),
        )?;
        assert_eq!(config.lock_timeout_secs, 90);
        assert_eq!(config.database_url.as_deref(), Some("sqlite://x.db"));
        assert_eq!(config.state_file, PathBuf::from("state.json"));
        Ok(())
    }

    #[test]
    fn test_empty_database_url_env_forces_local_mode() -> Result<()> {
        let config = apply_env_with(
            Config::default().with_database_url("sqlite://x.db"),
            env(&[("NERVE_DATABASE_URL", "")]),
        )?;
        assert_eq!(config.database_url, None);
        Ok(())
    }

    #[test]
    fn test_invalid_env_number_names_variable() {
        let result = apply_env_with(
            Config::default(),
            env(&[("NERVE_SWEEP_INTERVAL_SECS", "soon")]),
        );
        let message = result.err().map(|e| e.to_string()).unwrap_or_default();
        assert!(message.contains("NERVE_SWEEP_INTERVAL_SECS"));
    }

    #[test]
    fn test_malformed_toml_returns_parse_error() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("bad.toml");
        write_file(&path, "project_name = \n invalid toml [[[")?;

        let result = load_toml_file(&path);
        assert!(matches!(result, Err(Error::Validation(_))));
        Ok(())
    }

    #[test]
    fn test_unknown_key_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("config.toml");
        write_file(&path, "lock_timeout = 5\n")?;
        assert!(load_toml_file(&path).is_err());
        Ok(())
    }

    #[test]
    fn test_directory_path_is_rejected() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let result = load_toml_file(dir.path());
        assert!(matches!(result, Err(Error::System(_))));
        Ok(())
    }

    #[test]
    fn test_invalid_merged_config_fails_validation() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let project = dir.path().join(".nerve/config.toml");
        write_file(&project, "project_name = \"\"\n")?;
        assert!(load_layers(None, &project, env(&[])).is_err());
        Ok(())
    }

    #[test]
    #[serial]
    fn test_load_config_in_reads_process_env() -> Result<()> {
        let dir = tempfile::tempdir()?;
        write_file(
            &dir.path().join(".nerve/config.toml"),
            "project_name = \"from-file\"\n",
        )?;
        std::env::set_var("NERVE_PROJECT_NAME", "from-env");
        let result = load_config_in(dir.path());
        std::env::remove_var("NERVE_PROJECT_NAME");

        assert_eq!(result?.project_name, "from-env");
        Ok(())
    }

    #[test]
    fn test_global_config_path_ends_with_config_toml() {
        if let Some(path) = global_config_path() {
            assert!(path.ends_with("config.toml"));
        }
    }
}
