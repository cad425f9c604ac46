//! Install manager for the private formatter install.
//!
//! The `InstallManager` owns the on-disk install for each version key. An
//! install runs `npm init -y` followed by `npm install prettier@<version>` in
//! the version's directory. A version that does not exist in the registry is
//! retried once with the `latest` fallback, which is also written back to the
//! settings unless the version was overridden for this process.

use std::collections::{HashMap, HashSet};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::env::env_overrides;
use super::paths::{find_package_manager_cli, HostLayout, PrivateInstall, ToolPaths};
use super::types::{InstallStatus, VersionKey};
use crate::config::ConfigStore;
use crate::logging::clean_output;
use crate::process::{ProcessInvocation, ProcessOutcome, ProcessRunner};

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("npm-cli.js not found on PATH or in the host's bundled tools")]
    PackageManagerMissing,
    #[error("Failed to create {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("`{step}` failed: the requested version does not exist")]
    VersionNotFound { step: String },
    #[error("`{step}` failed (exit code {exit_code:?}): {stderr}")]
    StepFailed {
        step: String,
        exit_code: Option<i32>,
        stderr: String,
    },
    #[error("`{step}` timed out after {elapsed:?}")]
    TimedOut { step: String, elapsed: Duration },
    #[error("`{step}` could not be started: {error}")]
    FailedToStart { step: String, error: String },
    #[error("Install finished but {} does not exist", .0.display())]
    ExecutableMissing(PathBuf),
    #[error("An install of version {0} is already running")]
    AlreadyInstalling(VersionKey),
}

/// Returns true if npm output reports a version missing from the registry.
pub fn is_version_not_found(output: &str) -> bool {
    output.contains("ETARGET")
        || output.contains("notarget")
        || output.contains("No matching version found")
}

// ============================================================================
// Installing Guard
// ============================================================================

/// Clears a version's installing flag when dropped, on every exit path.
struct InstallingGuard<'a> {
    installing: &'a Mutex<HashSet<VersionKey>>,
    key: VersionKey,
}

impl Drop for InstallingGuard<'_> {
    fn drop(&mut self) {
        self.installing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

// ============================================================================
// Install Manager
// ============================================================================

/// Provisions the private formatter install.
///
/// Thread-safe and meant to be shared (`Arc`) by every document in a process.
/// At most one install per version key runs at a time; callers arriving while
/// it runs are told "not ready" instead of waiting.
pub struct InstallManager {
    paths: ToolPaths,
    config: Arc<ConfigStore>,
    runner: Arc<dyn ProcessRunner>,
    layout: Option<HostLayout>,
    /// Version keys with an install in flight. Also serializes the fallback write-back.
    installing: Mutex<HashSet<VersionKey>>,
}

impl InstallManager {
    /// Creates a manager using the OS temp directory and the detected host layout.
    pub fn new(config: Arc<ConfigStore>, runner: Arc<dyn ProcessRunner>) -> Self {
        let paths = ToolPaths::from_temp_dir();
        let layout = HostLayout::detect();

        info!(
            "InstallManager initialized. Install root: {}, host dir: {:?}",
            paths.root().display(),
            layout.as_ref().map(|l| l.exe_dir().to_path_buf())
        );

        Self {
            paths,
            config,
            runner,
            layout,
            installing: Mutex::new(HashSet::new()),
        }
    }

    /// Uses a different install root.
    pub fn with_paths(mut self, paths: ToolPaths) -> Self {
        self.paths = paths;
        self
    }

    /// Uses a different host layout (or none).
    pub fn with_layout(mut self, layout: Option<HostLayout>) -> Self {
        self.layout = layout;
        self
    }

    pub fn paths(&self) -> &ToolPaths {
        &self.paths
    }

    pub fn config(&self) -> &Arc<ConfigStore> {
        &self.config
    }

    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    pub fn layout(&self) -> Option<&HostLayout> {
        self.layout.as_ref()
    }

    /// Environment overrides for runtime processes (PATH with bundled tools).
    pub fn runtime_env(&self) -> HashMap<String, OsString> {
        env_overrides(self.layout.as_ref())
    }

    /// Locates `npm-cli.js` using the same PATH runtime processes get.
    pub fn package_manager_cli(&self) -> Option<PathBuf> {
        let env = self.runtime_env();
        find_package_manager_cli(
            self.layout.as_ref(),
            env.get("PATH").map(OsString::as_os_str),
        )
    }

    // ========================================================================
    // Status Queries
    // ========================================================================

    /// Private install for the currently configured version.
    pub fn current_install(&self) -> PrivateInstall {
        self.paths.private_install(&self.config.version_key())
    }

    /// Returns true if the configured version is installed.
    pub fn is_ready(&self) -> bool {
        self.current_install().is_ready()
    }

    /// Returns true if `version` is installed.
    pub fn is_ready_for(&self, version: &VersionKey) -> bool {
        self.paths.private_install(version).is_ready()
    }

    pub fn status(&self) -> InstallStatus {
        let key = self.config.version_key();
        if self.lock_installing().contains(&key) {
            InstallStatus::Installing
        } else if self.is_ready_for(&key) {
            InstallStatus::Installed
        } else {
            InstallStatus::NotInstalled
        }
    }

    // ========================================================================
    // Installation
    // ========================================================================

    /// Makes sure the configured version is installed.
    ///
    /// Returns `false` immediately if an install of that version is already
    /// running, `true` if it is already on disk, and otherwise installs it and
    /// reports the outcome. Failures are logged, never returned.
    pub async fn ensure_installed(&self) -> bool {
        let key = self.config.version_key();
        let install = self.paths.private_install(&key);

        let _installing = {
            let mut installing = self.lock_installing();
            if installing.contains(&key) {
                debug!(version = %key, "Install already in progress");
                return false;
            }
            if install.is_ready() {
                return true;
            }
            installing.insert(key.clone());
            InstallingGuard {
                installing: &self.installing,
                key: key.clone(),
            }
        };

        let started = Instant::now();
        match self.install_with_fallback(key, install).await {
            Ok(install) => {
                info!(
                    executable = %install.executable.display(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Formatter installed"
                );
                true
            }
            Err(e) => {
                error!(
                    error = %e,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Formatter installation failed"
                );
                false
            }
        }
    }

    /// Starts an install in the background if the configured version is missing.
    pub fn spawn_warm_up(self: &Arc<Self>) -> JoinHandle<bool> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            if manager.is_ready() {
                return true;
            }
            info!("Formatter not installed yet, installing in the background");
            manager.ensure_installed().await
        })
    }

    async fn install_with_fallback(
        &self,
        mut key: VersionKey,
        mut install: PrivateInstall,
    ) -> Result<PrivateInstall, InstallError> {
        let mut is_retry = false;
        let mut _fallback_installing: Option<InstallingGuard<'_>> = None;

        loop {
            match self.install_once(&key, &install).await {
                Ok(()) => return Ok(install),
                Err(InstallError::VersionNotFound { step }) if !is_retry && !key.is_fallback() => {
                    let fallback = VersionKey::fallback();
                    warn!(
                        step = %step,
                        version = %key,
                        fallback = %fallback,
                        "Formatter version not found, retrying with fallback"
                    );

                    {
                        let mut installing = self.lock_installing();
                        if installing.contains(&fallback) {
                            return Err(InstallError::AlreadyInstalling(fallback));
                        }
                        installing.insert(fallback.clone());
                        if let Err(e) = self.config.set_version_key(&fallback) {
                            warn!(error = %e, "Failed to persist fallback version");
                        }
                    }
                    _fallback_installing = Some(InstallingGuard {
                        installing: &self.installing,
                        key: fallback.clone(),
                    });

                    install = self.paths.private_install(&fallback);
                    key = fallback;
                    is_retry = true;

                    if install.is_ready() {
                        return Ok(install);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn install_once(
        &self,
        key: &VersionKey,
        install: &PrivateInstall,
    ) -> Result<(), InstallError> {
        tokio::fs::create_dir_all(&install.install_dir)
            .await
            .map_err(|source| InstallError::Io {
                path: install.install_dir.clone(),
                source,
            })?;

        let env = self.runtime_env();
        let npm_cli = find_package_manager_cli(
            self.layout.as_ref(),
            env.get("PATH").map(OsString::as_os_str),
        )
        .ok_or(InstallError::PackageManagerMissing)?;

        info!("npm init -y (working dir: {})", install.install_dir.display());
        self.run_npm(&npm_cli, install, &env, &["init", "-y"])
            .await?;

        let package = key.package_spec();
        info!("npm install {}...", package);
        self.run_npm(&npm_cli, install, &env, &["install", &package])
            .await?;

        if !install.is_ready() {
            return Err(InstallError::ExecutableMissing(install.executable.clone()));
        }
        Ok(())
    }

    async fn run_npm(
        &self,
        npm_cli: &Path,
        install: &PrivateInstall,
        env: &HashMap<String, OsString>,
        args: &[&str],
    ) -> Result<(), InstallError> {
        let step = format!("npm {}", args.join(" "));
        let invocation = ProcessInvocation::new(self.config.runtime())
            .arg(npm_cli)
            .args(args)
            .current_dir(&install.install_dir)
            .envs(env.clone())
            .timeout(self.config.install_timeout());

        match self.runner.run(invocation).await {
            ProcessOutcome::Completed {
                stdout,
                stderr,
                exit_code,
            } => {
                if !stdout.trim().is_empty() {
                    debug!(step = %step, "{}", clean_output(&stdout));
                }
                if !stderr.trim().is_empty() {
                    debug!(step = %step, stderr = %clean_output(&stderr), "npm reported on stderr");
                }

                if exit_code == Some(0) {
                    Ok(())
                } else if is_version_not_found(&stderr) || is_version_not_found(&stdout) {
                    Err(InstallError::VersionNotFound { step })
                } else {
                    Err(InstallError::StepFailed {
                        step,
                        exit_code,
                        stderr: clean_output(&stderr),
                    })
                }
            }
            ProcessOutcome::TimedOut { elapsed } => Err(InstallError::TimedOut { step, elapsed }),
            ProcessOutcome::FailedToStart { error } => {
                Err(InstallError::FailedToStart { step, error })
            }
        }
    }

    fn lock_installing(&self) -> MutexGuard<'_, HashSet<VersionKey>> {
        self.installing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}
