//! Configuration for the `taskflow` shell.
//!
//! Supports layered configuration with the following priority (highest first):
//! 1. CLI arguments
//! 2. Environment variables (via clap `env` attribute)
//! 3. TOML config file (`~/.config/taskflow/config.toml`)
//! 4. Compiled defaults
//!
//! Missing config file is not an error (defaults are used). An explicit
//! `--config` path that doesn't exist is an error.

use std::path::PathBuf;
use std::time::Duration;

use crate::focus::{DEFAULT_FOCUS_DURATION, DEFAULT_TICK};
use crate::session::{DEFAULT_COLLECTION, SessionConfig};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        /// Path that was attempted.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Failed to parse the TOML configuration.
    #[error("failed to parse config file: {0}")]
    ParseToml(#[from] toml::de::Error),
}

// ---------------------------------------------------------------------------
// TOML file structs (all fields Option for partial overrides)
// ---------------------------------------------------------------------------

/// Top-level TOML config file structure.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ConfigFile {
    store: StoreFileConfig,
    focus: FocusFileConfig,
    notifications: NotificationsFileConfig,
}

/// `[store]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct StoreFileConfig {
    collection: Option<String>,
}

/// `[focus]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct FocusFileConfig {
    duration_secs: Option<u64>,
    tick_ms: Option<u64>,
}

/// `[notifications]` section of the config file.
#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct NotificationsFileConfig {
    enabled: Option<bool>,
}

// ---------------------------------------------------------------------------
// Resolved configuration (concrete types, all fields populated)
// ---------------------------------------------------------------------------

/// Fully resolved application configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// Document collection holding tasks.
    pub collection: String,
    /// Length of one focus session.
    pub focus_duration: Duration,
    /// Interval between focus countdown steps.
    pub focus_tick: Duration,
    /// Whether "new task" alerts are delivered.
    pub notifications: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            focus_duration: DEFAULT_FOCUS_DURATION,
            focus_tick: DEFAULT_TICK,
            notifications: true,
        }
    }
}

impl AppConfig {
    /// Load configuration by merging CLI args, env vars, and a TOML file.
    ///
    /// If `--config` is given and the file does not exist, returns an
    /// error. Otherwise the default path (`~/.config/taskflow/config.toml`)
    /// is tried and silently ignored if missing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the config file cannot be read or parsed.
    pub fn load(cli: &CliArgs) -> Result<Self, ConfigError> {
        let file = load_config_file(cli.config.as_deref())?;
        Ok(Self::resolve(cli, &file))
    }

    /// Priority: CLI > file > default.
    fn resolve(cli: &CliArgs, file: &ConfigFile) -> Self {
        let defaults = Self::default();

        Self {
            collection: cli
                .collection
                .clone()
                .or_else(|| file.store.collection.clone())
                .filter(|c| !c.trim().is_empty())
                .unwrap_or(defaults.collection),
            focus_duration: cli
                .focus_minutes
                .map(|m| Duration::from_secs(m.saturating_mul(60)))
                .or_else(|| file.focus.duration_secs.map(Duration::from_secs))
                .unwrap_or(defaults.focus_duration),
            focus_tick: file
                .focus
                .tick_ms
                .filter(|&ms| ms > 0)
                .map_or(defaults.focus_tick, Duration::from_millis),
            notifications: !cli.no_notifications
                && file.notifications.enabled.unwrap_or(defaults.notifications),
        }
    }

    /// Settings for the session controller.
    #[must_use]
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            collection: self.collection.clone(),
        }
    }
}

/// CLI arguments parsed by clap.
#[derive(clap::Parser, Debug, Default)]
#[command(version, about = "Personal task list with realtime sync")]
pub struct CliArgs {
    /// Document collection holding tasks.
    #[arg(long, env = "TASKFLOW_COLLECTION")]
    pub collection: Option<String>,

    /// Path to config file (default: `~/.config/taskflow/config.toml`).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Focus session length in minutes.
    #[arg(long)]
    pub focus_minutes: Option<u64>,

    /// Suppress "new task" alerts.
    #[arg(long)]
    pub no_notifications: bool,

    /// Log level filter (trace, debug, info, warn, error).
    #[arg(long, default_value = "info", env = "TASKFLOW_LOG")]
    pub log_level: String,

    /// Path to log file (default: `$TMPDIR/taskflow.log`).
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Internal helpers
// ---------------------------------------------------------------------------

/// Load and parse a TOML config file.
///
/// If `explicit_path` is `Some`, the file must exist (error if not).
/// If `explicit_path` is `None`, the default path is tried and missing file
/// is treated as empty config.
fn load_config_file(explicit_path: Option<&std::path::Path>) -> Result<ConfigFile, ConfigError> {
    if let Some(p) = explicit_path {
        let contents = std::fs::read_to_string(p).map_err(|e| ConfigError::ReadFile {
            path: p.to_path_buf(),
            source: e,
        })?;
        return Ok(toml::from_str(&contents)?);
    }

    let Some(config_dir) = dirs::config_dir() else {
        tracing::debug!("no config directory, using defaults");
        return Ok(ConfigFile::default());
    };
    let path = config_dir.join("taskflow").join("config.toml");

    match std::fs::read_to_string(&path) {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ConfigFile::default()),
        Err(e) => Err(ConfigError::ReadFile { path, source: e }),
    }
}
