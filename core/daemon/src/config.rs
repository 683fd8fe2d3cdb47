//! Daemon configuration.
//!
//! Read from a TOML file. A missing file yields defaults rooted at
//! `~/.beatsaber-historian`.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HistorianError, Result};

const APP_DIR: &str = ".beatsaber-historian";
const SOCKET_NAME: &str = "historian.sock";
const HISTORY_DIR: &str = "history";
const CONFIG_NAME: &str = "config.toml";
const DEFAULT_WEBSOCKET_URI: &str = "ws://localhost:6557/socket";
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
struct ConfigFile {
    #[serde(default)]
    unix_socket: Option<PathBuf>,
    #[serde(default)]
    history_directory: Option<PathBuf>,
    #[serde(default)]
    beatsaber_websocket_uri: Option<String>,
    #[serde(default)]
    heartrate_monitor: Option<String>,
    #[serde(default)]
    reconnect_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistorianConfig {
    pub unix_socket: PathBuf,
    pub history_directory: PathBuf,
    pub beatsaber_websocket_uri: String,
    pub heartrate_monitor: Option<String>,
    pub reconnect_delay: Duration,
}

impl HistorianConfig {
    /// Defaults rooted at `base` (normally `~/.beatsaber-historian`).
    pub fn with_base_dir(base: &Path) -> Self {
        Self {
            unix_socket: base.join(SOCKET_NAME),
            history_directory: base.join(HISTORY_DIR),
            beatsaber_websocket_uri: DEFAULT_WEBSOCKET_URI.to_string(),
            heartrate_monitor: None,
            reconnect_delay: Duration::from_millis(DEFAULT_RECONNECT_DELAY_MS),
        }
    }

    fn from_file(file: ConfigFile, base: &Path) -> Self {
        let defaults = Self::with_base_dir(base);
        Self {
            unix_socket: file.unix_socket.unwrap_or(defaults.unix_socket),
            history_directory: file.history_directory.unwrap_or(defaults.history_directory),
            beatsaber_websocket_uri: file
                .beatsaber_websocket_uri
                .unwrap_or(defaults.beatsaber_websocket_uri),
            heartrate_monitor: file.heartrate_monitor,
            reconnect_delay: file
                .reconnect_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.reconnect_delay),
        }
    }
}

pub fn default_base_dir() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or(HistorianError::HomeDirNotFound)?;
    Ok(home.join(APP_DIR))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(default_base_dir()?.join(CONFIG_NAME))
}

/// Loads the configuration at `path` (or the default location).
pub fn load_config(path: Option<PathBuf>) -> Result<HistorianConfig> {
    let config_path = match path {
        Some(path) => path,
        None => default_config_path()?,
    };
    let base = default_base_dir()?;

    if !config_path.exists() {
        return Ok(HistorianConfig::with_base_dir(&base));
    }

    let content = fs_err::read_to_string(&config_path).map_err(|err| {
        HistorianError::io(format!("reading config {}", config_path.display()), err)
    })?;
    parse_config(&content, &config_path, &base)
}

fn parse_config(content: &str, path: &Path, base: &Path) -> Result<HistorianConfig> {
    let file = toml::from_str::<ConfigFile>(content).map_err(|err| HistorianError::Config {
        path: path.to_path_buf(),
        details: err.to_string(),
    })?;
    Ok(HistorianConfig::from_file(file, base))
}
