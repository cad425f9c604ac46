//! Formatter provisioning.
//!
//! The formatter is an npm package. Each configured version gets its own
//! private install under the OS temp directory, created on demand with the
//! host's npm. A formatter installed in the document's own project takes
//! precedence over the private install.
//!
//! # Architecture
//!
//! - `types`: Version keys, install status, script locations
//! - `paths`: Install directories, project-local lookup, host layout, npm lookup
//! - `env`: PATH augmentation for runtime processes
//! - `manager`: Single-flight install with version fallback
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use tidyhost_core::config::ConfigStore;
//! use tidyhost_core::external_tools::InstallManager;
//! use tidyhost_core::process::TokioProcessRunner;
//!
//! let manager = Arc::new(InstallManager::new(
//!     Arc::new(ConfigStore::default()),
//!     Arc::new(TokioProcessRunner),
//! ));
//!
//! if manager.ensure_installed().await {
//!     println!("Formatter at {}", manager.current_install().executable.display());
//! }
//! ```

pub mod env;
pub mod manager;
pub mod paths;
pub mod types;

pub use env::{augment_path, bundled_path_dirs, env_overrides};
pub use manager::{is_version_not_found, InstallError, InstallManager};
pub use paths::{
    find_executable_in, find_executable_on_path, find_package_manager_cli,
    find_project_local_script, find_project_local_script_from, get_tidyhost_temp_dir,
    sanitize_dir_name, HostLayout, PrivateInstall, ToolPaths,
};
pub use types::{InstallStatus, VersionKey, FALLBACK_VERSION, TOOL_NAME};
