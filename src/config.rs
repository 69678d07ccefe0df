//! Client configuration, persisted as JSON under the platform config dir.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::FileStore;

const CONFIG_DIR_NAME: &str = "foresights";
const CONFIG_FILE_NAME: &str = "config.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config I/O error at {path}: {source}")]
    Io { path: PathBuf, source: io::Error },

    #[error("could not parse config at {path}: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },

    #[error("could not encode config: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("platform has no config directory")]
    NoConfigDir,

    #[error("platform has no local data directory; set ledger_dir")]
    NoDataDir,
}

/// Everything the client needs to know about where to connect and where to
/// keep state. Missing fields take their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Sensor stream (`ws://` only).
    pub telemetry_endpoint: String,
    pub coaching_endpoint: String,
    pub coaching_timeout_ms: u64,
    /// How long a single receive may block before it reports a timeout.
    pub recv_timeout_ms: u64,
    /// Directory for the streak ledger. Defaults to the platform data dir.
    pub ledger_dir: Option<PathBuf>,
    /// Remove `"` from coaching text before showing it.
    pub strip_quotes: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            telemetry_endpoint: crate::conn::DEFAULT_ENDPOINT.to_owned(),
            coaching_endpoint: crate::coach::DEFAULT_ENDPOINT.to_owned(),
            coaching_timeout_ms: crate::coach::DEFAULT_TIMEOUT.as_millis() as u64,
            recv_timeout_ms: 5_000,
            ledger_dir: None,
            strip_quotes: false,
        }
    }
}

impl ClientConfig {
    /// `<config dir>/foresights/config.json`
    pub fn default_path() -> Option<PathBuf> {
        Some(dirs::config_dir()?.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Read a config file. `Ok(None)` if it does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ConfigError::Io { path: path.to_owned(), source }),
        };
        serde_json::from_str(&text)
            .map(Some)
            .map_err(|source| ConfigError::Parse { path: path.to_owned(), source })
    }

    /// Load from `path`, or the default location if `None`. Falls back to
    /// defaults if there is no file.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = match path {
            Some(p) => p.to_owned(),
            None => match Self::default_path() {
                Some(p) => p,
                None => {
                    debug!("no platform config dir, using defaults");
                    return Ok(Self::default());
                }
            },
        };
        match Self::from_file(&path)? {
            Some(config) => {
                debug!("loaded config from {}", path.display());
                Ok(config)
            }
            None => {
                debug!("no config at {}, using defaults", path.display());
                Ok(Self::default())
            }
        }
    }

    /// Write to `path`, or the default location if `None`.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf, ConfigError> {
        let path = match path {
            Some(p) => p.to_owned(),
            None => Self::default_path().ok_or(ConfigError::NoConfigDir)?,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::Io { path: parent.to_owned(), source })?;
        }
        let text = serde_json::to_string_pretty(self)?;
        fs::write(&path, text).map_err(|source| ConfigError::Io { path: path.clone(), source })?;
        Ok(path)
    }

    pub fn coaching_timeout(&self) -> Duration {
        Duration::from_millis(self.coaching_timeout_ms)
    }

    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// The store backing the streak ledger.
    pub fn ledger_store(&self) -> Result<FileStore, ConfigError> {
        let dir = match &self.ledger_dir {
            Some(dir) => dir.clone(),
            None => FileStore::default_dir().ok_or(ConfigError::NoDataDir)?,
        };
        Ok(FileStore::new(dir))
    }
}
