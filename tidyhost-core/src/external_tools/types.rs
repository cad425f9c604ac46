//! Core types for the managed formatter install.
//!
//! This module defines the version key that selects a formatter release, the
//! install status reported to hosts, and the fixed names and relative paths of
//! the formatter package.

use serde::{Deserialize, Serialize};
use std::fmt;

// ============================================================================
// Tool Constants
// ============================================================================

/// npm package name of the managed formatter.
pub const TOOL_NAME: &str = "prettier";

/// File whose presence marks a directory as a project root.
pub const PROJECT_MANIFEST: &str = "package.json";

/// Formatter entry script, relative to an install or project root.
pub const SCRIPT_RELATIVE_PATH: &[&str] = &["node_modules", "prettier", "bin", "prettier.cjs"];

/// Entry script name used by older formatter releases.
pub const SCRIPT_RELATIVE_PATH_LEGACY: &[&str] =
    &["node_modules", "prettier", "bin", "prettier.js"];

/// Version key substituted when the configured version does not exist.
pub const FALLBACK_VERSION: &str = "latest";

// ============================================================================
// Version Key
// ============================================================================

/// Selects which formatter release the private install uses.
///
/// Either a literal version (`3.3.3`), a range npm understands, or the
/// [`FALLBACK_VERSION`] sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VersionKey(String);

impl VersionKey {
    /// Creates a version key, trimming whitespace. Empty input becomes the fallback.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            Self::fallback()
        } else {
            Self(trimmed.to_string())
        }
    }

    /// The fallback sentinel (`latest`).
    pub fn fallback() -> Self {
        Self(FALLBACK_VERSION.to_string())
    }

    /// Returns true if this key is the fallback sentinel.
    pub fn is_fallback(&self) -> bool {
        self.0 == FALLBACK_VERSION
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Package spec passed to `npm install`, e.g. `prettier@3.3.3`.
    pub fn package_spec(&self) -> String {
        format!("{}@{}", TOOL_NAME, self.0)
    }
}

impl Default for VersionKey {
    fn default() -> Self {
        Self::fallback()
    }
}

impl fmt::Display for VersionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Install Status
// ============================================================================

/// Current state of the private install for one version key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStatus {
    /// Nothing on disk yet, or the last attempt failed.
    NotInstalled,
    /// An install for this key is running in this process.
    Installing,
    /// The formatter entry script exists on disk.
    Installed,
}

impl InstallStatus {
    /// Returns true if the formatter can be run.
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Installed)
    }
}

impl fmt::Display for InstallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInstalled => write!(f, "not installed"),
            Self::Installing => write!(f, "installing"),
            Self::Installed => write!(f, "installed"),
        }
    }
}
