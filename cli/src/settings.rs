//! Persistent settings for the command-line front end.
//!
//! Settings live in a pretty-printed JSON file. Reading never fails: a
//! missing or unreadable file falls back to defaults. Writing needs an
//! authenticated [`Session`].

use std::fs;
use std::path::{Path, PathBuf};

use copier_engine::ChecksumAlgorithm;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{Session, DEFAULT_TIMEOUT_MINUTES};

pub const SETTINGS_VERSION: &str = "3.0";
pub const DEFAULT_NETWORK_HOST: &str = "127.0.0.1";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("settings can only be changed after authenticating")]
    NotAuthenticated,

    #[error("invalid settings: {0}")]
    Invalid(String),

    #[error("failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Where the destination folder lives.
#[derive(
    Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum FolderType {
    #[default]
    Local,
    Network,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source_path: String,
    pub destination_path: String,
    pub network_host: String,
    pub folder_type: FolderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub session_timeout_minutes: u64,
    pub verify: Option<ChecksumAlgorithm>,
    /// Also write logs to this file, rotated by size
    pub log_file: Option<String>,
    pub version: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            source_path: String::new(),
            destination_path: String::new(),
            network_host: DEFAULT_NETWORK_HOST.to_string(),
            folder_type: FolderType::Local,
            password_hash: None,
            session_timeout_minutes: DEFAULT_TIMEOUT_MINUTES,
            verify: None,
            log_file: None,
            version: SETTINGS_VERSION.to_string(),
        }
    }
}

impl Settings {
    /// Check the values a copy would depend on.
    ///
    /// Empty paths are allowed here; `copy` rejects them when it runs.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !self.source_path.is_empty() {
            let source = Path::new(&self.source_path);
            if !source.exists() {
                return Err(SettingsError::Invalid(format!(
                    "source path does not exist: {}",
                    self.source_path
                )));
            }
            if !source.is_dir() {
                return Err(SettingsError::Invalid(format!(
                    "source path is not a directory: {}",
                    self.source_path
                )));
            }
        }
        if self.folder_type == FolderType::Network && self.network_host.trim().is_empty() {
            return Err(SettingsError::Invalid(
                "network folder type requires a network host".to_string(),
            ));
        }
        Ok(())
    }

    /// A copy safe to share: the password hash is removed.
    pub fn without_secret(&self) -> Settings {
        Settings {
            password_hash: None,
            ..self.clone()
        }
    }
}

/// Settings file location and persistence.
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SettingsStore { path: path.into() }
    }

    /// `<config dir>/folder-copier/settings.json`, or `./settings.json` when
    /// the platform has no config directory.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .map(|dir| dir.join("folder-copier"))
            .unwrap_or_default()
            .join("settings.json")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn backup_file(&self) -> PathBuf {
        let mut name = self.path.clone().into_os_string();
        name.push(".backup");
        PathBuf::from(name)
    }

    pub fn load(&self) -> Settings {
        match read_settings(&self.path) {
            Ok(Some(settings)) => {
                tracing::debug!(path = %self.path.display(), "settings loaded");
                settings
            }
            Ok(None) => {
                tracing::info!(path = %self.path.display(), "settings file not found, using defaults");
                Settings::default()
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not load settings, using defaults");
                Settings::default()
            }
        }
    }

    /// Write `settings`, keeping the previous file as `<file>.backup`.
    ///
    /// A successful save counts as activity and restarts the session timer.
    pub fn save(&self, session: &mut Session, settings: &Settings) -> Result<(), SettingsError> {
        if !session.is_valid() {
            return Err(SettingsError::NotAuthenticated);
        }
        self.write(settings)?;
        session.extend();
        Ok(())
    }

    /// Put every setting back to its default, except the password.
    pub fn reset(&self, session: &mut Session) -> Result<Settings, SettingsError> {
        let defaults = Settings {
            password_hash: self.load().password_hash,
            ..Settings::default()
        };
        self.save(session, &defaults)?;
        tracing::info!(path = %self.path.display(), "settings reset to defaults");
        Ok(defaults)
    }

    /// Write without a session check.
    ///
    /// Only for storing the very first password, when no session can exist.
    pub(crate) fn write(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|source| SettingsError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }

        if self.path.exists() {
            let backup = self.backup_file();
            if let Err(e) = fs::copy(&self.path, &backup) {
                tracing::warn!(path = %backup.display(), error = %e, "could not create settings backup");
            }
        }

        let json = serde_json::to_string_pretty(settings).map_err(|source| SettingsError::Parse {
            path: self.path.clone(),
            source,
        })?;
        fs::write(&self.path, json).map_err(|source| SettingsError::Io {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(path = %self.path.display(), "settings saved");
        Ok(())
    }

    /// Write the current settings to `target`, without the password hash.
    pub fn export(&self, target: &Path) -> Result<(), SettingsError> {
        let shared = self.load().without_secret();
        let json = serde_json::to_string_pretty(&shared).map_err(|source| SettingsError::Parse {
            path: target.to_path_buf(),
            source,
        })?;
        fs::write(target, json).map_err(|source| SettingsError::Io {
            path: target.to_path_buf(),
            source,
        })?;
        tracing::info!(path = %target.display(), "settings exported");
        Ok(())
    }

    /// Replace the settings with those in `source`.
    ///
    /// The imported values are validated first. The current password hash is
    /// kept unless the file carries its own.
    pub fn import(&self, session: &mut Session, source: &Path) -> Result<Settings, SettingsError> {
        let mut imported = read_settings(source)?.ok_or_else(|| SettingsError::Io {
            path: source.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        })?;
        imported.validate()?;

        if imported.password_hash.is_none() {
            imported.password_hash = self.load().password_hash;
        }
        imported.version = SETTINGS_VERSION.to_string();

        self.save(session, &imported)?;
        tracing::info!(path = %source.display(), "settings imported");
        Ok(imported)
    }
}

/// `Ok(None)` when the file does not exist.
fn read_settings(path: &Path) -> Result<Option<Settings>, SettingsError> {
    let text = match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SettingsError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|source| SettingsError::Parse {
            path: path.to_path_buf(),
            source,
        })
}
