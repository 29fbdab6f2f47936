//! Configuration loading
//!
//! Every setting is resolved with the following priority:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`FOURACC_*`)
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! The TOML file is `$FOURACC_CONFIG` when set, else
//! `<config dir>/fouracc/fouracc-srv.toml`. A missing or unreadable file only
//! logs a warning; a malformed one is an error.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};

/// Prefix of every environment variable read by [`Config::resolve`]
pub const ENV_PREFIX: &str = "FOURACC_";

/// Environment variable naming the TOML config file
pub const CONFIG_ENV: &str = "FOURACC_CONFIG";

pub const DEFAULT_LISTEN: &str = "0.0.0.0:8080";
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 24;
pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 300;
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 500 << 20;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid value {value:?} for {key}")]
    Invalid { key: String, value: String },
}

/// Contents of the TOML config file; every key is optional
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// HTTP listen address
    #[serde(default)]
    pub listen: Option<String>,

    /// Directory under which the scratch root is created
    #[serde(default)]
    pub scratch_parent: Option<PathBuf>,

    #[serde(default)]
    pub session_ttl_hours: Option<u64>,

    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,

    /// Upload size limit
    #[serde(default)]
    pub max_upload_bytes: Option<usize>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Reads `path`; `Ok(None)` when the file is missing or unreadable.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "could not read config file, using defaults");
                return Ok(None);
            }
        };
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded TOML configuration from {:?}", path);
        Ok(Some(config))
    }
}

/// Command-line overrides
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub config_file: Option<PathBuf>,
    pub listen: Option<SocketAddr>,
    pub scratch_parent: Option<PathBuf>,
    pub session_ttl_hours: Option<u64>,
    pub sweep_interval_secs: Option<u64>,
    pub max_upload_bytes: Option<usize>,
    pub log_level: Option<String>,
}

/// Resolved server configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub listen: SocketAddr,
    pub scratch_parent: PathBuf,
    pub session_ttl: Duration,
    pub sweep_interval: Duration,
    pub max_upload_bytes: usize,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            scratch_parent: std::env::temp_dir(),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_HOURS * 3600),
            sweep_interval: Duration::from_secs(DEFAULT_SWEEP_INTERVAL_SECS),
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            log_level: default_log_level(),
        }
    }
}

/// Location of the TOML config file, if one can be determined
pub fn config_file_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    dirs::config_dir().map(|d| d.join("fouracc").join("fouracc-srv.toml"))
}

/// Reads `FOURACC_<key>`; unset or empty variables are `None`.
fn env_value<T: FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    let name = format!("{}{}", ENV_PREFIX, key);
    match std::env::var(&name) {
        Ok(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key: name, value }),
        _ => Ok(None),
    }
}

fn parse_toml<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>, ConfigError> {
    value
        .map(|v| {
            v.trim().parse().map_err(|_| ConfigError::Invalid {
                key: key.to_string(),
                value: v,
            })
        })
        .transpose()
}

fn positive(key: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        });
    }
    Ok(value)
}

impl Config {
    /// Resolves the configuration from the command line, the environment,
    /// the TOML file and the defaults.
    pub fn resolve(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        let toml = match config_file_path(overrides.config_file.as_deref()) {
            Some(path) => TomlConfig::load(&path)?.unwrap_or_default(),
            None => TomlConfig::default(),
        };
        Self::from_layers(overrides, toml)
    }

    /// Merges already loaded layers with the environment.
    pub fn from_layers(overrides: ConfigOverrides, toml: TomlConfig) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let listen = match overrides.listen {
            Some(addr) => addr,
            None => match env_value("LISTEN")? {
                Some(addr) => addr,
                None => parse_toml("listen", toml.listen)?.unwrap_or(defaults.listen),
            },
        };

        let scratch_parent = overrides
            .scratch_parent
            .or(env_value("SCRATCH_PARENT")?)
            .or(toml.scratch_parent)
            .unwrap_or(defaults.scratch_parent);

        let ttl_hours = overrides
            .session_ttl_hours
            .or(env_value("SESSION_TTL_HOURS")?)
            .or(toml.session_ttl_hours)
            .unwrap_or(DEFAULT_SESSION_TTL_HOURS);

        let sweep_secs = overrides
            .sweep_interval_secs
            .or(env_value("SWEEP_INTERVAL_SECS")?)
            .or(toml.sweep_interval_secs)
            .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);

        let max_upload_bytes = overrides
            .max_upload_bytes
            .or(env_value("MAX_UPLOAD_BYTES")?)
            .or(toml.max_upload_bytes)
            .unwrap_or(defaults.max_upload_bytes);

        let log_level = overrides
            .log_level
            .or(env_value("LOG_LEVEL")?)
            .unwrap_or(toml.logging.level);

        Ok(Config {
            listen,
            scratch_parent,
            session_ttl: Duration::from_secs(positive("session_ttl_hours", ttl_hours)?.saturating_mul(3600)),
            sweep_interval: Duration::from_secs(positive("sweep_interval_secs", sweep_secs)?),
            max_upload_bytes,
            log_level,
        })
    }
}
