//! Configuration file support
//!
//! `~/.witr/config.toml`. Every section is optional; missing keys take
//! their defaults and command-line flags override whatever the file says.

use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};
use witr_core::TableExtensions;
use witr_platform::DEFAULT_TIMEOUT_MS;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Could not determine home directory")]
    NoHome,

    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Config file already exists at {}", .0.display())]
    AlreadyExists(PathBuf),
}

/// User configuration from ~/.witr/config.toml
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output: OutputConfig,
    pub sources: SourcesConfig,
    /// Extra entries appended to the built-in launch tables
    pub tables: TableExtensions,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub no_color: bool,
    pub json: bool,
    pub short: bool,
    pub tree: bool,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SourcesConfig {
    /// Bound on each external command
    pub timeout_ms: u64,
    /// Try fallback socket tables when the primary one fails
    pub fallback: bool,
}

impl Default for SourcesConfig {
    fn default() -> Self {
        Self {
            timeout_ms: DEFAULT_TIMEOUT_MS,
            fallback: true,
        }
    }
}

/// Get the config file path
pub fn config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(".witr").join("config.toml"))
}

/// Parse a config file; a missing file is the default config
pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load configuration, falling back to defaults on any problem
pub fn load_config() -> Config {
    let Some(path) = config_path() else {
        return Config::default();
    };
    match load_from(&path) {
        Ok(config) => {
            debug!(path = %path.display(), "Loaded configuration");
            config
        }
        Err(e) => {
            warn!(error = %e, "Ignoring configuration file");
            Config::default()
        }
    }
}

/// Write the sample config; never overwrites an existing file
pub fn init_config() -> Result<PathBuf, ConfigError> {
    let path = config_path().ok_or(ConfigError::NoHome)?;
    write_sample(&path)?;
    Ok(path)
}

pub fn write_sample(path: &Path) -> Result<(), ConfigError> {
    if path.exists() {
        return Err(ConfigError::AlreadyExists(path.to_path_buf()));
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|source| ConfigError::Write {
            path: parent.to_path_buf(),
            source,
        })?;
    }
    fs::write(path, sample_config()).map_err(|source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    })
}

/// Generate a sample config file content
pub fn sample_config() -> &'static str {
    r#"# witr configuration file
# Place this file at ~/.witr/config.toml

[output]
# Disable colored output
no_color = false
# Use JSON output by default
json = false
# Use short (one-line) output by default
short = false
# Use tree view by default
tree = false

[sources]
# Give up on an external tool (ss, lsof, systemctl, ...) after this long
timeout_ms = 2000
# Try the next socket source when the first one fails
fallback = true

[tables]
# Extra entries for the launch-origin tables, added to the built-in ones
# shells = ["xonsh"]
# process_managers = ["pm2"]
# filter_utilities = ["ugrep"]
#
# [tables.supervisors]
# hivemind = "hivemind"
#
# [tables.container_runtimes]
# containerd-shim-kata-v2 = "kata"
#
# [tables.cron_runners]
# systemd-cron = "cron"
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.sources.timeout_ms, 2000);
        assert!(config.sources.fallback);
        assert!(!config.output.json);
        assert!(config.tables.is_empty());
    }

    #[test]
    fn test_sample_parses_to_defaults() {
        let config: Config = toml::from_str(sample_config()).unwrap();
        assert_eq!(config.sources.timeout_ms, 2000);
        assert!(config.tables.is_empty());
    }

    #[test]
    fn test_partial_file() {
        let config: Config = toml::from_str(
            r#"
[output]
tree = true

[sources]
fallback = false

[tables]
shells = ["xonsh"]

[tables.supervisors]
hivemind = "hivemind"
"#,
        )
        .unwrap();
        assert!(config.output.tree);
        assert!(!config.sources.fallback);
        assert_eq!(config.sources.timeout_ms, 2000);
        assert_eq!(config.tables.shells, vec!["xonsh".to_string()]);
        assert_eq!(config.tables.supervisors.get("hivemind").map(String::as_str), Some("hivemind"));
    }

    #[test]
    fn test_load_from_missing_and_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        assert!(load_from(&path).unwrap().tables.is_empty());

        fs::write(&path, "[output\njson = ").unwrap();
        assert!(matches!(load_from(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_write_sample_refuses_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".witr").join("config.toml");
        write_sample(&path).unwrap();
        assert!(load_from(&path).is_ok());
        assert!(matches!(write_sample(&path), Err(ConfigError::AlreadyExists(_))));
    }
}
