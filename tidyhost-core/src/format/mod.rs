//! Formatter invocation.
//!
//! [`FormatInvoker::try_format`] turns a document's current text into a
//! [`FormatOutcome`]. It makes sure the private install exists, prefers a
//! formatter installed in the document's own project, pipes the text through
//! `<runtime> <script> --stdin-filepath <path>` and compares the result with
//! the input. It never applies text or saves; the host does that.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::external_tools::{find_project_local_script, InstallManager};
use crate::logging::clean_output;
use crate::process::{ProcessInvocation, ProcessOutcome, TextEncoding};

// =============================================================================
// Outcome
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatOutcome {
    /// The formatter produced text that differs from the input.
    Formatted(String),
    /// A run for this document was already in flight; this trigger was dropped.
    SkippedReentrant,
    /// Neither a project-local nor a private formatter is available.
    SkippedNoTool,
    /// The formatter timed out or wrote nothing to stdout.
    SkippedNoOutput,
    /// The formatter's output equals the input.
    SkippedUnchanged,
}

impl FormatOutcome {
    pub fn is_formatted(&self) -> bool {
        matches!(self, Self::Formatted(_))
    }

    /// Short name for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Formatted(_) => "formatted",
            Self::SkippedReentrant => "skipped (already running)",
            Self::SkippedNoTool => "skipped (no formatter)",
            Self::SkippedNoOutput => "skipped (no output)",
            Self::SkippedUnchanged => "unchanged",
        }
    }
}

// =============================================================================
// Session
// =============================================================================

/// Per-document formatting state.
#[derive(Debug)]
pub struct FormatSession {
    path: PathBuf,
    encoding: TextEncoding,
    running: AtomicBool,
}

/// Clears the session's running flag when dropped.
#[derive(Debug)]
pub struct RunningGuard<'a> {
    running: &'a AtomicBool,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

impl FormatSession {
    pub fn new(path: impl Into<PathBuf>, encoding: TextEncoding) -> Self {
        Self {
            path: path.into(),
            encoding,
            running: AtomicBool::new(false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Marks the session as running. Returns `None` if it already is.
    pub fn try_begin(&self) -> Option<RunningGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunningGuard {
                running: &self.running,
            })
    }
}

// =============================================================================
// Invoker
// =============================================================================

#[derive(Clone)]
pub struct FormatInvoker {
    installer: Arc<InstallManager>,
}

impl FormatInvoker {
    pub fn new(installer: Arc<InstallManager>) -> Self {
        Self { installer }
    }

    pub fn installer(&self) -> &Arc<InstallManager> {
        &self.installer
    }

    /// Returns true if the private install for the configured version exists.
    pub fn is_ready(&self) -> bool {
        self.installer.is_ready()
    }

    /// Script to run for `file_path`: project-local first, then the private install.
    pub fn resolve_script(&self, file_path: &Path) -> Option<PathBuf> {
        find_project_local_script(file_path).or_else(|| {
            let install = self.installer.current_install();
            install.is_ready().then_some(install.executable)
        })
    }

    pub async fn try_format(&self, session: &FormatSession, current_text: &str) -> FormatOutcome {
        let Some(_running) = session.try_begin() else {
            debug!(path = %session.path().display(), "Format already running, trigger dropped");
            return FormatOutcome::SkippedReentrant;
        };

        if !self.installer.ensure_installed().await {
            debug!("Private formatter install not ready");
        }

        let Some(script) = self.resolve_script(session.path()) else {
            warn!(path = %session.path().display(), "No formatter available");
            return FormatOutcome::SkippedNoTool;
        };

        let config = self.installer.config();
        let mut invocation = ProcessInvocation::new(config.runtime())
            .arg(&script)
            .arg("--stdin-filepath")
            .arg(session.path())
            .envs(self.installer.runtime_env())
            .input(current_text)
            .encoding(session.encoding())
            .timeout(config.formatter_timeout());
        if let Some(dir) = session.path().parent().filter(|dir| dir.is_dir()) {
            invocation = invocation.current_dir(dir);
        }

        match self.installer.runner().run(invocation).await {
            ProcessOutcome::Completed {
                stdout,
                stderr,
                exit_code,
            } => {
                if !stderr.trim().is_empty() {
                    info!(
                        path = %session.path().display(),
                        exit_code = ?exit_code,
                        "{}",
                        clean_output(&stderr)
                    );
                }

                if stdout.is_empty() {
                    if exit_code != Some(0) {
                        warn!(
                            path = %session.path().display(),
                            exit_code = ?exit_code,
                            "Formatter failed without output"
                        );
                    }
                    FormatOutcome::SkippedNoOutput
                } else if stdout == current_text {
                    FormatOutcome::SkippedUnchanged
                } else {
                    FormatOutcome::Formatted(stdout)
                }
            }
            ProcessOutcome::TimedOut { elapsed } => {
                warn!(
                    path = %session.path().display(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Formatter timed out"
                );
                FormatOutcome::SkippedNoOutput
            }
            ProcessOutcome::FailedToStart { error } => {
                error!(
                    script = %script.display(),
                    error = %error,
                    "Formatter could not be started"
                );
                FormatOutcome::SkippedNoTool
            }
        }
    }
}
