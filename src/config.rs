//! Orchestrator configuration.
//!
//! Resolution order, lowest to highest:
//! 1. built-in defaults
//! 2. a TOML file (`maestro.toml`), when present
//! 3. `MAESTRO_*` environment variables
//!
//! ```toml
//! [session]
//! model = "opus"
//! max_turns = 80
//!
//! [retry]
//! dag = { max_retries = 1 }
//!
//! [logging]
//! filter = "maestro=debug"
//! json = true
//! ```

use crate::error::OrchestrationError;
use crate::manifest::services::ManifestDefaults;
use crate::session::services::SupervisorSettings;
use crate::strategy::{RetryPolicies, RetryPolicy};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

/// Prefix of every environment override.
pub const ENV_PREFIX: &str = "MAESTRO_";

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Read {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },
    /// The file is not valid configuration.
    #[error("invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// An environment override could not be parsed.
    #[error("invalid value for {key}: {value:?}")]
    InvalidOverride {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

impl From<ConfigError> for OrchestrationError {
    fn from(err: ConfigError) -> Self {
        Self::validation(err.to_string())
    }
}

/// `[manifest]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManifestSettings {
    /// Directory receiving one `<session-id>.json` per spawn.
    pub dir: PathBuf,
    /// Write manifest files; when off they live in the store only.
    pub write: bool,
    /// Plugin directory holding one subdirectory per skill.
    pub skills_dir: PathBuf,
}

impl Default for ManifestSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(".maestro/manifests"),
            write: true,
            skills_dir: PathBuf::from(".maestro/skills"),
        }
    }
}

/// `[events]` section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventSettings {
    /// Envelopes buffered per subscriber before it lags.
    pub capacity: usize,
}

impl Default for EventSettings {
    fn default() -> Self {
        Self { capacity: 1024 }
    }
}

/// `[spawn]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnSettings {
    /// Agent binary.
    pub binary: PathBuf,
    /// Arguments passed before the per-session ones.
    pub args: Vec<String>,
}

impl Default for SpawnSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("claude"),
            args: Vec::new(),
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Filter directive used when `RUST_LOG` is unset.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "maestro=info".to_owned(),
            json: false,
        }
    }
}

/// Complete orchestrator configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Fallback model, turn budget, and working directory for spawns.
    pub session: ManifestDefaults,
    /// Manifest persistence.
    pub manifest: ManifestSettings,
    /// Event bus sizing.
    pub events: EventSettings,
    /// Automatic retry per coordinator strategy. Off by default.
    pub retry: RetryPolicies,
    /// Agent process launch.
    pub spawn: SpawnSettings,
    /// Tracing subscriber.
    pub logging: LoggingSettings,
}

impl OrchestratorConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML or unknown value
    /// types.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Loads `path`, falling back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file exists but cannot be read
    /// and [`ConfigError::Parse`] when it is malformed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::read_to_string(path) {
            Ok(text) => {
                debug!(path = %path.display(), "configuration loaded");
                Self::from_toml(&text)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "configuration file absent, using defaults");
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Read {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Loads `path` and applies the process environment.
    ///
    /// # Errors
    ///
    /// Propagates [`OrchestratorConfig::load`] and
    /// [`OrchestratorConfig::with_env`] errors.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        Self::load(path)?.with_env(std::env::vars())
    }

    /// Applies `MAESTRO_*` overrides from `vars`.
    ///
    /// Recognised keys: `MODEL`, `MAX_TURNS`, `WORKING_DIR`, `MANIFEST_DIR`,
    /// `WRITE_MANIFESTS`, `SKILLS_DIR`, `EVENT_CAPACITY`, `MAX_RETRIES` (every strategy),
    /// `AGENT_BINARY`, `LOG`, and `LOG_JSON`. Other `MAESTRO_*` keys are
    /// ignored with a warning.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidOverride`] for a value that does not
    /// parse.
    pub fn with_env<I, K, V>(mut self, vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (raw_key, raw_value) in vars {
            let Some(key) = raw_key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value: String = raw_value.into();
            match key {
                "MODEL" => self.session.model = value,
                "MAX_TURNS" => self.session.max_turns = parse(key, &value)?,
                "WORKING_DIR" => self.session.working_dir = Some(PathBuf::from(value)),
                "MANIFEST_DIR" => self.manifest.dir = PathBuf::from(value),
                "WRITE_MANIFESTS" => self.manifest.write = parse_flag(key, &value)?,
                "SKILLS_DIR" => self.manifest.skills_dir = PathBuf::from(value),
                "EVENT_CAPACITY" => self.events.capacity = parse(key, &value)?,
                "MAX_RETRIES" => {
                    self.retry = RetryPolicies::uniform(RetryPolicy::new(parse(key, &value)?));
                }
                "AGENT_BINARY" => self.spawn.binary = PathBuf::from(value),
                "LOG" => self.logging.filter = value,
                "LOG_JSON" => self.logging.json = parse_flag(key, &value)?,
                other => warn!(key = %other, "unknown MAESTRO_ override ignored"),
            }
        }
        Ok(self)
    }

    /// Supervisor settings derived from this configuration.
    #[must_use]
    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            manifest_dir: self.manifest.dir.clone(),
            write_manifests: self.manifest.write,
            defaults: self.session.clone(),
            retry: self.retry,
        }
    }
}

fn parse<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidOverride {
        key: format!("{ENV_PREFIX}{key}"),
        value: value.to_owned(),
    }
}
