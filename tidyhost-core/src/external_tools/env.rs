//! Environment helpers for spawned runtime processes.
//!
//! The host may ship its own Node.js and npm. Those directories are appended
//! to `PATH` so formatter and package-manager processes can find them even
//! when the system `PATH` does not.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::PathBuf;
use tracing::{debug, warn};

use super::paths::HostLayout;

/// Returns the host-bundled directories to append to `PATH`.
///
/// The shared runtime directory wins when it exists. Otherwise the bundled
/// tool directory and its source-control subdirectory are used.
pub fn bundled_path_dirs(layout: &HostLayout) -> Vec<PathBuf> {
    if !layout.exe_dir().is_dir() {
        return Vec::new();
    }

    let Some(shared) = layout.shared_runtime_dir() else {
        return Vec::new();
    };

    if shared.is_dir() {
        vec![shared]
    } else {
        vec![layout.bundled_tools_dir(), layout.bundled_scm_dir()]
    }
}

/// Appends the host-bundled directories to an existing PATH value.
///
/// Never fails: if anything cannot be resolved the base value is returned as is.
pub fn augment_path(base: Option<&OsStr>, layout: Option<&HostLayout>) -> OsString {
    let base_value = base.map(OsStr::to_os_string).unwrap_or_default();

    let Some(layout) = layout else {
        return base_value;
    };

    let extra = bundled_path_dirs(layout);
    if extra.is_empty() {
        return base_value;
    }

    let entries: Vec<PathBuf> = std::env::split_paths(&base_value)
        .filter(|p| !p.as_os_str().is_empty())
        .chain(extra)
        .collect();

    match std::env::join_paths(entries) {
        Ok(joined) => joined,
        Err(e) => {
            warn!("Failed to extend PATH with bundled tools: {}", e);
            base_value
        }
    }
}

/// Returns environment variable overrides for runtime processes.
pub fn env_overrides(layout: Option<&HostLayout>) -> HashMap<String, OsString> {
    let mut overrides = HashMap::new();

    let current = std::env::var_os("PATH");
    let new_path = augment_path(current.as_deref(), layout);
    if !new_path.is_empty() {
        debug!(path = ?new_path, "PATH for runtime processes");
        overrides.insert("PATH".to_string(), new_path);
    }

    overrides
}
