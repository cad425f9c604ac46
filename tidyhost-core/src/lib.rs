//! Tidyhost Core Library
//!
//! This crate drives an external, versioned code formatter (Prettier, run
//! with node) on behalf of an editor-like host. It includes:
//!
//! - Private per-version installs provisioned with npm, with version fallback
//! - Project-local formatter discovery
//! - Child process execution with piped input and hard timeouts
//! - Per-document single-flight formatting
//! - Host integration: sessions, command status, format-on-save
//! - Configuration management (settings file, shared version key)

pub mod config;
pub mod external_tools;
pub mod format;
pub mod host;
pub mod logging;
pub mod process;

#[cfg(test)]
mod test_support;

// Re-exports for convenience
pub use config::{parse_extensions, ConfigError, ConfigStore, Settings};

pub use external_tools::{
    find_project_local_script, InstallError, InstallManager, InstallStatus, PrivateInstall,
    ToolPaths, VersionKey,
};

pub use format::{FormatInvoker, FormatOutcome, FormatSession};

pub use host::{
    command_status, format_document, on_before_save, CommandStatus, DocumentHost,
    SessionRegistry,
};

pub use process::{ProcessInvocation, ProcessOutcome, ProcessRunner, TextEncoding, TokioProcessRunner};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn exports_are_accessible() {
        fn _check_types(
            _settings: &Settings,
            _store: &ConfigStore,
            _manager: &InstallManager,
            _invoker: &FormatInvoker,
            _session: &FormatSession,
            _registry: &SessionRegistry,
            _runner: &TokioProcessRunner,
            _host: &dyn DocumentHost,
            _status: CommandStatus,
        ) {
        }
    }
}
