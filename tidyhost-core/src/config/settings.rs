//! Formatter settings for tidyhost.
//!
//! Settings are persisted as JSON in the user's config directory.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::external_tools::types::{VersionKey, FALLBACK_VERSION};
use crate::process::{FORMATTER_TIMEOUT, INSTALL_TIMEOUT};

// =============================================================================
// Defaults
// =============================================================================

/// Extensions formatted when the user has not configured any.
pub const DEFAULT_EXTENSIONS: &str =
    "js,jsx,ts,tsx,json,css,scss,less,html,htm,md,markdown,xml,yml,yaml";

/// JavaScript runtime used to launch the formatter and npm.
pub const DEFAULT_RUNTIME: &str = "node";

const SETTINGS_DIR: &str = "tidyhost";
const SETTINGS_FILE: &str = "settings.json";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to access settings file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),
}

// =============================================================================
// Extension Filter
// =============================================================================

/// Parses a user-entered extension list.
///
/// Entries may be separated by commas, semicolons or whitespace, may carry a
/// leading dot, and are matched case-insensitively.
pub fn parse_extensions(raw: &str) -> HashSet<String> {
    raw.split(|c: char| matches!(c, ',' | ';' | ' ' | '\t' | '\r' | '\n'))
        .map(str::trim)
        .map(|ext| ext.strip_prefix('.').unwrap_or(ext))
        .filter(|ext| !ext.is_empty())
        .map(str::to_lowercase)
        .collect()
}

// =============================================================================
// Settings
// =============================================================================

/// Formatter settings - persisted as JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Run the formatter whenever a document is saved.
    pub format_on_save: bool,

    /// Extensions to format, as entered by the user.
    pub included_extensions: String,

    /// Formatter version for the private install ("latest" or e.g. "3.3.3").
    /// Rewritten to "latest" when the configured version does not exist.
    pub embedded_version: String,

    pub formatter_timeout_secs: u64,

    pub install_timeout_secs: u64,

    /// Runtime executable, looked up on PATH when not absolute.
    pub runtime: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            format_on_save: false,
            included_extensions: DEFAULT_EXTENSIONS.to_string(),
            embedded_version: FALLBACK_VERSION.to_string(),
            formatter_timeout_secs: FORMATTER_TIMEOUT.as_secs(),
            install_timeout_secs: INSTALL_TIMEOUT.as_secs(),
            runtime: DEFAULT_RUNTIME.to_string(),
        }
    }
}

impl Settings {
    /// Default settings file: `{config_dir}/tidyhost/settings.json`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(SETTINGS_DIR).join(SETTINGS_FILE))
    }

    /// Load settings from a file, using defaults for missing values.
    ///
    /// If the file doesn't exist or can't be parsed, returns defaults.
    pub fn load_from(path: &Path) -> Self {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str::<Settings>(&json) {
                Ok(loaded) => loaded,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to parse settings, using defaults");
                    Self::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read settings, using defaults");
                Self::default()
            }
        };

        settings.validate();
        settings
    }

    /// Save settings to a file, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Validate and clamp settings to valid ranges.
    pub fn validate(&mut self) {
        self.formatter_timeout_secs = self.formatter_timeout_secs.clamp(1, 300);
        self.install_timeout_secs = self.install_timeout_secs.clamp(30, 3600);

        if self.embedded_version.trim().is_empty() {
            self.embedded_version = FALLBACK_VERSION.to_string();
        }
        if self.runtime.trim().is_empty() {
            self.runtime = DEFAULT_RUNTIME.to_string();
        }
    }

    pub fn version_key(&self) -> VersionKey {
        VersionKey::new(&self.embedded_version)
    }

    pub fn extensions(&self) -> HashSet<String> {
        parse_extensions(&self.included_extensions)
    }

    /// Returns true if files with this path's extension should be formatted.
    pub fn is_enabled_for(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.extensions().contains(&ext.to_lowercase())
    }

    pub fn formatter_timeout(&self) -> Duration {
        Duration::from_secs(self.formatter_timeout_secs)
    }

    pub fn install_timeout(&self) -> Duration {
        Duration::from_secs(self.install_timeout_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
