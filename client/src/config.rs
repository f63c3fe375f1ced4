//! Configuration management.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the configuration file looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = ".rom.toml";

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct ConfigFile {
    #[serde(default)]
    session: SessionConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SessionConfig {
    #[serde(default = "default_cascade_release")]
    cascade_release: bool,
    #[serde(default = "default_error_buffer")]
    error_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cascade_release: default_cascade_release(),
            error_buffer: default_error_buffer(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

fn default_cascade_release() -> bool {
    true
}

fn default_error_buffer() -> usize {
    16
}

/// Client runtime configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Release objects owned by a released object locally as well
    pub cascade_release: bool,
    /// Capacity of each object's error channel
    pub error_buffer: usize,
    /// Log level (if set, overrides RUST_LOG environment variable)
    pub log_level: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        let file = ConfigFile::default();
        Self {
            cascade_release: file.session.cascade_release,
            error_buffer: file.session.error_buffer,
            log_level: file.logging.log_level,
        }
    }
}

impl ClientConfig {
    /// Load configuration with priority: env vars > config file > defaults.
    ///
    /// `path` selects the config file; without it `.rom.toml` in the current
    /// directory is used when present. Environment variables use the `ROM_`
    /// prefix with the section as first segment, e.g.
    /// `ROM_SESSION_CASCADE_RELEASE=false`.
    pub fn from_figment(path: Option<&Path>) -> anyhow::Result<Self> {
        let config_path: Option<PathBuf> = match path {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::current_dir()
                .ok()
                .map(|d| d.join(CONFIG_FILE_NAME))
                .filter(|p| p.exists()),
        };

        // 1. Start with defaults
        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile::default()));

        // 2. Merge config file
        if let Some(ref path) = config_path {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        // 3. Merge environment variables (ROM_* prefix)
        figment = figment.merge(
            Env::prefixed("ROM_")
                .map(|key| key.as_str().replacen('_', ".", 1).into()),
        );

        let config_file: ConfigFile = figment.extract()?;

        Ok(Self {
            cascade_release: config_file.session.cascade_release,
            error_buffer: config_file.session.error_buffer.max(1),
            log_level: config_file.logging.log_level,
        })
    }
}
