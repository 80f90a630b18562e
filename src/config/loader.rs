//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::ServerConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
///
/// Relative project paths are resolved against the directory holding the
/// file, so a config can be started from any working directory.
pub fn load_config(path: &Path) -> Result<ServerConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let mut config = parse_config(&content)?;

    if let Some(dir) = path.parent() {
        anchor_paths(&mut config, dir);
    }

    Ok(config)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<ServerConfig, ConfigError> {
    let config: ServerConfig = toml::from_str(content).map_err(ConfigError::Parse)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

fn anchor_paths(config: &mut ServerConfig, dir: &Path) {
    if config.projects.root.is_relative() {
        config.projects.root = dir.join(&config.projects.root);
    }
    if let Some(views) = config.projects.views_dir.as_mut() {
        if views.is_relative() {
            *views = dir.join(&*views);
        }
    }
    for mount in &mut config.projects.static_mounts {
        if mount.dir.is_relative() {
            mount.dir = dir.join(&mount.dir);
        }
    }
    if config.dev.cache_root.is_relative() {
        config.dev.cache_root = dir.join(&config.dev.cache_root);
    }
}
