//! Editor integration.
//!
//! A host (editor, CLI) exposes its documents through [`DocumentHost`]. The
//! [`SessionRegistry`] keeps one [`FormatSession`] per open document, and
//! [`format_document`] / [`on_before_save`] connect the two with the
//! [`FormatInvoker`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::format::{FormatInvoker, FormatOutcome, FormatSession};
use crate::process::TextEncoding;

pub const FORMAT_COMMAND_LABEL: &str = "Format Document";
pub const INSTALLING_COMMAND_LABEL: &str = "Format Document (installing npm modules...)";

/// A document as seen by the formatter.
#[async_trait]
pub trait DocumentHost: Send + Sync {
    fn path(&self) -> &Path;

    fn encoding(&self) -> TextEncoding {
        TextEncoding::Utf8
    }

    /// Current text of the document.
    async fn snapshot(&self) -> Result<String>;

    /// Replaces the document text and saves it.
    async fn apply_and_save(&self, new_text: String) -> Result<()>;
}

// =============================================================================
// Sessions
// =============================================================================

/// Open documents and their format sessions, keyed by path.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<PathBuf, Arc<FormatSession>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the session for `path`, creating it on first attach.
    pub fn attach(&self, path: &Path, encoding: TextEncoding) -> Arc<FormatSession> {
        let mut sessions = self.lock();
        Arc::clone(sessions.entry(path.to_path_buf()).or_insert_with(|| {
            debug!(path = %path.display(), "Format session created");
            Arc::new(FormatSession::new(path, encoding))
        }))
    }

    pub fn get(&self, path: &Path) -> Option<Arc<FormatSession>> {
        self.lock().get(path).cloned()
    }

    /// Drops the session for a closed document. Returns true if one existed.
    pub fn close(&self, path: &Path) -> bool {
        self.lock().remove(path).is_some()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PathBuf, Arc<FormatSession>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// =============================================================================
// Command Status
// =============================================================================

/// Label and enabled state of the "format document" command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandStatus {
    pub label: &'static str,
    pub enabled: bool,
}

impl CommandStatus {
    pub fn for_readiness(ready: bool) -> Self {
        if ready {
            Self {
                label: FORMAT_COMMAND_LABEL,
                enabled: true,
            }
        } else {
            Self {
                label: INSTALLING_COMMAND_LABEL,
                enabled: false,
            }
        }
    }
}

pub fn command_status(invoker: &FormatInvoker) -> CommandStatus {
    CommandStatus::for_readiness(invoker.is_ready())
}

// =============================================================================
// Commands
// =============================================================================

/// Formats a document and saves it if the text changed.
pub async fn format_document(
    invoker: &FormatInvoker,
    session: &FormatSession,
    host: &dyn DocumentHost,
) -> Result<FormatOutcome> {
    let started = Instant::now();
    let text = host
        .snapshot()
        .await
        .with_context(|| format!("Failed to read {}", host.path().display()))?;

    let outcome = invoker.try_format(session, &text).await;

    if let FormatOutcome::Formatted(new_text) = &outcome {
        host.apply_and_save(new_text.clone())
            .await
            .with_context(|| format!("Failed to save {}", host.path().display()))?;
    }

    info!(
        path = %host.path().display(),
        outcome = outcome.label(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Format finished"
    );
    Ok(outcome)
}

/// Save hook. Formats only when format-on-save is on and the extension is enabled.
pub async fn on_before_save(
    invoker: &FormatInvoker,
    sessions: &SessionRegistry,
    host: &dyn DocumentHost,
) -> Result<Option<FormatOutcome>> {
    let config = invoker.installer().config();
    if !config.format_on_save() || !config.is_enabled_for(host.path()) {
        return Ok(None);
    }

    let session = sessions.attach(host.path(), host.encoding());
    format_document(invoker, &session, host).await.map(Some)
}
