// Settings file for the Anubis companion server

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use crate::core::constants::{
    CARD_POLL_INTERVAL, REPORT_REFRESH_INTERVAL, TRIALS_FIRETEAM_MODE, UPSTREAM_TIMEOUT,
};
use crate::core::report::ReportSettings;
use crate::core::session::SessionSettings;

// =============================================================================
// SETTINGS STRUCTURES
// =============================================================================

/// Local WebSocket server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// 0 picks a free port
    #[serde(default)]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: 0,
        }
    }
}

impl ServerSettings {
    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Upstream API endpoints and credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiSettings {
    /// API key sent as `X-API-Key`
    #[serde(default)]
    pub key: String,
    /// Bearer token handed over by the desktop shell. Empty = anonymous.
    #[serde(default)]
    pub access_token: String,
    #[serde(default = "default_platform_url")]
    pub platform_url: String,
    #[serde(default = "default_fireteam_url")]
    pub fireteam_url: String,
    #[serde(default = "default_trials_report_url")]
    pub trials_report_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_platform_url() -> String {
    "https://www.bungie.net/Platform/Destiny".to_string()
}
fn default_fireteam_url() -> String {
    "https://api.guardian.gg".to_string()
}
fn default_trials_report_url() -> String {
    "https://api.destinytrialsreport.com".to_string()
}
fn default_timeout_secs() -> u64 {
    UPSTREAM_TIMEOUT.as_secs()
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            key: String::new(),
            access_token: String::new(),
            platform_url: default_platform_url(),
            fireteam_url: default_fireteam_url(),
            trials_report_url: default_trials_report_url(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Fireteam report refresh
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSection {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    /// Fireteam API game mode (14 = Trials of Osiris)
    #[serde(default = "default_fireteam_mode")]
    pub fireteam_mode: u32,
}

fn default_refresh_interval_secs() -> u64 {
    REPORT_REFRESH_INTERVAL.as_secs()
}
fn default_fireteam_mode() -> u32 {
    TRIALS_FIRETEAM_MODE
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            fireteam_mode: default_fireteam_mode(),
        }
    }
}

/// Trials card polling
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CardSection {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

fn default_poll_interval_secs() -> u64 {
    CARD_POLL_INTERVAL.as_secs()
}

impl Default for CardSection {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

/// UI configuration store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageSettings {
    /// JSON file path (relative to the settings file or absolute)
    #[serde(default = "default_storage_path")]
    pub path: String,
}

fn default_storage_path() -> String {
    "anubis-config.json".to_string()
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            path: default_storage_path(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Write logs to stdout
    #[serde(default = "default_console")]
    pub console: bool,
    /// Log file path (relative to the settings file or absolute). Empty = no file logging.
    #[serde(default)]
    pub log_file: String,
    /// Level for dependencies; `RUST_LOG` overrides it
    #[serde(default = "default_level")]
    pub level: String,
    /// Level for this crate's own events
    #[serde(default = "default_crate_level")]
    pub crate_level: String,
    /// When the log file starts over
    #[serde(default)]
    pub rotation: LogRotation,
}

/// Rotation of the log file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

fn default_console() -> bool {
    true
}

fn default_level() -> String {
    "info".to_string()
}

fn default_crate_level() -> String {
    "debug".to_string()
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            console: default_console(),
            log_file: String::new(),
            level: default_level(),
            crate_level: default_crate_level(),
            rotation: LogRotation::default(),
        }
    }
}

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub api: ApiSettings,
    #[serde(default)]
    pub report: ReportSection,
    #[serde(default)]
    pub card: CardSection,
    #[serde(default)]
    pub storage: StorageSettings,
    #[serde(default)]
    pub logging: LoggingSettings,
}

// =============================================================================
// SETTINGS LOADING
// =============================================================================

#[derive(Debug)]
pub enum SettingsError {
    ReadError(std::io::Error),
    ParseError(toml::de::Error),
}

impl std::fmt::Display for SettingsError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SettingsError::ReadError(e) => write!(f, "Failed to read settings file: {}", e),
            SettingsError::ParseError(e) => write!(f, "Failed to parse settings file: {}", e),
        }
    }
}

impl std::error::Error for SettingsError {}

impl Settings {
    pub const SETTINGS_FILENAME: &'static str = "anubis.toml";

    /// Default settings path: next to the executable, else the working directory
    pub fn default_path() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(Self::SETTINGS_FILENAME)))
            .filter(|path| path.exists())
            .unwrap_or_else(|| PathBuf::from(Self::SETTINGS_FILENAME))
    }

    pub fn from_toml(contents: &str) -> Result<Self, SettingsError> {
        toml::from_str(contents).map_err(SettingsError::ParseError)
    }

    /// Load settings from `path`; a missing file yields the defaults
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        debug!(path = %path.display(), "[config] Looking for settings");

        if !path.exists() {
            debug!("[config] No settings file found, using defaults");
            return Ok(Settings::default());
        }

        let contents = fs::read_to_string(path).map_err(SettingsError::ReadError)?;
        let settings = Self::from_toml(&contents)?;
        info!(path = %path.display(), "[config] Loaded settings");
        Ok(settings)
    }

    /// Resolve a path from the settings file against the file's directory
    pub fn resolve(settings_path: &Path, value: &str) -> PathBuf {
        let path = Path::new(value);
        if path.is_absolute() {
            return path.to_path_buf();
        }
        match settings_path.parent() {
            Some(dir) => dir.join(path),
            None => path.to_path_buf(),
        }
    }

    pub fn log_file(&self, settings_path: &Path) -> Option<PathBuf> {
        if self.logging.log_file.trim().is_empty() {
            return None;
        }
        Some(Self::resolve(settings_path, &self.logging.log_file))
    }

    pub fn storage_path(&self, settings_path: &Path) -> PathBuf {
        Self::resolve(settings_path, &self.storage.path)
    }

    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            report: ReportSettings {
                refresh_interval: Duration::from_secs(self.report.refresh_interval_secs),
                fireteam_mode: self.report.fireteam_mode,
            },
            card_poll_interval: Duration::from_secs(self.card.poll_interval_secs),
        }
    }
}
