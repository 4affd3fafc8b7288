//! Configuration file handling for ~/.tilecascade/config.ini.
//!
//! Maps INI sections onto the queue, index, and worker settings the
//! pipeline commands need. A missing file yields defaults; unknown
//! values are rejected with the offending section and key named.

use crate::index::IndexKind;
use crate::queue::{QueueKind, DEFAULT_VISIBILITY};
use ini::Ini;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default cache set key used when the config names none.
pub const DEFAULT_SET_KEY: &str = "tiles";

/// Default queue read timeout in seconds.
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 20;

/// Configuration file errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the config file
    #[error("failed to read config file: {0}")]
    Read(#[from] ini::Error),

    /// A value that does not parse or names an unknown backend
    #[error("invalid configuration: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}

/// Queue selection and tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct QueueSettings {
    /// Backend name: durable, memory, file, or stdout
    pub kind: String,
    /// Spool directory for the durable backend
    pub directory: PathBuf,
    /// Visibility window for delivered durable messages
    pub visibility: Duration,
    /// Output path for the file backend
    pub path: PathBuf,
    /// How long workers block waiting for jobs
    pub read_timeout: Duration,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            kind: "durable".to_string(),
            directory: config_directory().join("queue"),
            visibility: DEFAULT_VISIBILITY,
            path: PathBuf::from("tiles.txt"),
            read_timeout: Duration::from_secs(DEFAULT_READ_TIMEOUT_SECS),
        }
    }
}

/// Cache-index selection.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSettings {
    /// Backend name: disk, memory, or none
    pub kind: String,
    /// Directory holding disk index files
    pub directory: PathBuf,
    /// Set key naming the token set within the backend
    pub set_key: String,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            kind: "disk".to_string(),
            directory: config_directory().join("index"),
            set_key: DEFAULT_SET_KEY.to_string(),
        }
    }
}

/// Worker pool tuning.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerSettings {
    pub workers: usize,
    pub messages_at_once: usize,
    pub daemon: bool,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            workers: 4,
            messages_at_once: 10,
            daemon: false,
        }
    }
}

/// Complete tilecascade configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Config {
    pub queue: QueueSettings,
    pub index: IndexSettings,
    pub worker: WorkerSettings,
}

impl Config {
    /// Loads configuration from the default path
    /// (~/.tilecascade/config.ini), falling back to defaults when the
    /// file does not exist.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if the file exists but cannot be read or
    /// holds an invalid value.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&config_file_path())
    }

    /// Loads configuration from a specific path; a missing file yields
    /// defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let ini = Ini::load_from_file(path)?;
        parse_ini(&ini)
    }

    /// Resolves the configured queue backend.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an unknown backend name.
    pub fn queue_kind(&self) -> Result<QueueKind, ConfigError> {
        match self.queue.kind.as_str() {
            "durable" => Ok(QueueKind::Durable {
                directory: self.queue.directory.clone(),
                visibility: self.queue.visibility,
            }),
            "memory" => Ok(QueueKind::Memory),
            "file" => Ok(QueueKind::File {
                path: self.queue.path.clone(),
            }),
            "stdout" => Ok(QueueKind::Stdout),
            other => Err(invalid(
                "queue",
                "kind",
                other,
                "expected durable, memory, file, or stdout",
            )),
        }
    }

    /// Resolves the configured cache-index backend, `None` when
    /// deduplication is disabled.
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` for an unknown backend name.
    pub fn index_kind(&self) -> Result<Option<IndexKind>, ConfigError> {
        match self.index.kind.as_str() {
            "disk" => Ok(Some(IndexKind::Disk {
                directory: self.index.directory.clone(),
            })),
            "memory" => Ok(Some(IndexKind::Memory)),
            "none" => Ok(None),
            other => Err(invalid(
                "index",
                "kind",
                other,
                "expected disk, memory, or none",
            )),
        }
    }
}

/// Path to the config directory (~/.tilecascade).
pub fn config_directory() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tilecascade")
}

/// Path to the config file (~/.tilecascade/config.ini).
pub fn config_file_path() -> PathBuf {
    config_directory().join("config.ini")
}

fn invalid(section: &str, key: &str, value: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_u64(section: &str, key: &str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(section, key, value, "expected a non-negative integer"))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        _ => Err(invalid(section, key, value, "expected true or false")),
    }
}

fn parse_ini(ini: &Ini) -> Result<Config, ConfigError> {
    let mut config = Config::default();

    if let Some(section) = ini.section(Some("queue")) {
        for (key, value) in section.iter() {
            match key {
                "kind" => config.queue.kind = value.to_string(),
                "directory" => config.queue.directory = PathBuf::from(value),
                "visibility_secs" => {
                    config.queue.visibility =
                        Duration::from_secs(parse_u64("queue", key, value)?);
                }
                "path" => config.queue.path = PathBuf::from(value),
                "read_timeout_secs" => {
                    config.queue.read_timeout =
                        Duration::from_secs(parse_u64("queue", key, value)?);
                }
                _ => return Err(invalid("queue", key, value, "unknown key")),
            }
        }
    }

    if let Some(section) = ini.section(Some("index")) {
        for (key, value) in section.iter() {
            match key {
                "kind" => config.index.kind = value.to_string(),
                "directory" => config.index.directory = PathBuf::from(value),
                "set_key" => config.index.set_key = value.to_string(),
                _ => return Err(invalid("index", key, value, "unknown key")),
            }
        }
    }

    if let Some(section) = ini.section(Some("worker")) {
        for (key, value) in section.iter() {
            match key {
                "workers" => {
                    config.worker.workers = parse_u64("worker", key, value)? as usize;
                }
                "messages_at_once" => {
                    config.worker.messages_at_once = parse_u64("worker", key, value)? as usize;
                }
                "daemon" => config.worker.daemon = parse_bool("worker", key, value)?,
                _ => return Err(invalid("worker", key, value, "unknown key")),
            }
        }
    }

    Ok(config)
}
