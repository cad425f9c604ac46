//! Shared, mutable settings.
//!
//! One [`ConfigStore`] is shared (`Arc`) by everything in a process. The
//! install manager writes the fallback version back through it, and later
//! invocations observe the new value.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use tracing::{debug, info};

use super::settings::{ConfigError, Settings};
use crate::external_tools::types::VersionKey;

#[derive(Debug)]
pub struct ConfigStore {
    settings: RwLock<Settings>,
    /// File the settings were loaded from; changes are written back here.
    path: Option<PathBuf>,
    /// Set once the version key was overridden for this process. Version
    /// changes are then kept in memory so the user's pinned version survives.
    version_overridden: AtomicBool,
}

impl ConfigStore {
    /// In-memory store, never persisted.
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            path: None,
            version_overridden: AtomicBool::new(false),
        }
    }

    /// Store backed by a settings file. Missing or invalid files yield defaults.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = Settings::load_from(&path);
        Self {
            settings: RwLock::new(settings),
            path: Some(path),
            version_overridden: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Copy of the current settings.
    pub fn snapshot(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn version_key(&self) -> VersionKey {
        self.read(Settings::version_key)
    }

    /// Changes the version key and writes it back to the settings file,
    /// unless the key was overridden for this process.
    pub fn set_version_key(&self, key: &VersionKey) -> Result<(), ConfigError> {
        let snapshot = {
            let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
            settings.embedded_version = key.as_str().to_string();
            settings.clone()
        };

        info!(version = %key, "Formatter version changed");

        match &self.path {
            Some(path) if self.is_version_overridden() => {
                debug!(path = %path.display(), "Version key overridden, not persisting");
                Ok(())
            }
            Some(path) => snapshot.save_to(path),
            None => Ok(()),
        }
    }

    /// Changes the version key for this process only. Later version changes
    /// are not persisted either.
    pub fn override_version_key(&self, key: &VersionKey) {
        let mut settings = self.settings.write().unwrap_or_else(PoisonError::into_inner);
        settings.embedded_version = key.as_str().to_string();
        self.version_overridden.store(true, Ordering::Release);
    }

    pub fn is_version_overridden(&self) -> bool {
        self.version_overridden.load(Ordering::Acquire)
    }

    pub fn runtime(&self) -> String {
        self.read(|s| s.runtime.clone())
    }

    pub fn formatter_timeout(&self) -> Duration {
        self.read(Settings::formatter_timeout)
    }

    pub fn install_timeout(&self) -> Duration {
        self.read(Settings::install_timeout)
    }

    pub fn format_on_save(&self) -> bool {
        self.read(|s| s.format_on_save)
    }

    pub fn is_enabled_for(&self, path: &Path) -> bool {
        self.read(|s| s.is_enabled_for(path))
    }

    fn read<T>(&self, f: impl FnOnce(&Settings) -> T) -> T {
        let settings = self.settings.read().unwrap_or_else(PoisonError::into_inner);
        f(&settings)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}
