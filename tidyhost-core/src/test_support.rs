//! Scripted process runner shared by unit tests.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::external_tools::types::SCRIPT_RELATIVE_PATH;
use crate::process::{ProcessInvocation, ProcessOutcome, ProcessRunner};

type Handler = Box<dyn Fn(&ProcessInvocation) -> ProcessOutcome + Send + Sync>;

/// Records every invocation and answers with a caller-supplied handler.
pub(crate) struct ScriptedRunner {
    handler: Handler,
    calls: Mutex<Vec<ProcessInvocation>>,
    gate_first: AtomicBool,
    /// Signalled when the gated call has started.
    pub entered: Notify,
    /// Lets the gated call finish.
    pub release: Notify,
}

impl ScriptedRunner {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&ProcessInvocation) -> ProcessOutcome + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            gate_first: AtomicBool::new(false),
            entered: Notify::new(),
            release: Notify::new(),
        }
    }

    /// Makes the first invocation wait for `release` before answering.
    pub fn gate_first_call(self) -> Self {
        self.gate_first.store(true, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> Vec<ProcessInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn completed(stdout: &str, stderr: &str, exit_code: i32) -> ProcessOutcome {
        ProcessOutcome::Completed {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code: Some(exit_code),
        }
    }
}

#[async_trait]
impl ProcessRunner for ScriptedRunner {
    async fn run(&self, invocation: ProcessInvocation) -> ProcessOutcome {
        self.calls.lock().unwrap().push(invocation.clone());

        if self.gate_first.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }

        (self.handler)(&invocation)
    }
}

pub(crate) fn args_of(invocation: &ProcessInvocation) -> Vec<String> {
    invocation
        .args
        .iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

/// Creates an empty file, including parent directories.
pub(crate) fn touch(path: &Path) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, "").unwrap();
}

pub(crate) fn script_under(dir: &Path) -> PathBuf {
    SCRIPT_RELATIVE_PATH
        .iter()
        .fold(dir.to_path_buf(), |path, part| path.join(part))
}

/// Fake npm: `init` succeeds, `install prettier@X` drops the entry script into
/// the working directory unless `X` is listed as missing from the registry.
pub(crate) fn fake_npm(
    missing_versions: &[&str],
) -> impl Fn(&ProcessInvocation) -> ProcessOutcome + Send + Sync + 'static {
    let missing: Vec<String> = missing_versions.iter().map(|v| v.to_string()).collect();

    move |invocation: &ProcessInvocation| {
        let args = args_of(invocation);
        if args.iter().any(|a| a == "init") {
            return ScriptedRunner::completed("Wrote to package.json", "", 0);
        }

        let Some(package) = args.last() else {
            return ScriptedRunner::completed("", "no arguments", 1);
        };
        let version = package.rsplit('@').next().unwrap_or_default();
        if missing.iter().any(|m| m == version) {
            return ScriptedRunner::completed(
                "",
                &format!(
                    "npm ERR! code ETARGET\nnpm ERR! notarget No matching version found for {}.",
                    package
                ),
                1,
            );
        }

        let dir = invocation.working_dir.clone().unwrap();
        touch(&script_under(&dir));
        ScriptedRunner::completed("added 1 package in 1s", "", 0)
    }
}

/// Log lines captured by [`capture_logs`].
#[derive(Clone, Default)]
pub(crate) struct LogBuffer(Arc<Mutex<Vec<u8>>>);

impl LogBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl io::Write for LogBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Routes this thread's tracing output into a buffer until the guard drops.
///
/// `#[tokio::test]` runs on a current-thread runtime, so the whole test body
/// logs through the returned subscriber.
pub(crate) fn capture_logs() -> (LogBuffer, tracing::subscriber::DefaultGuard) {
    let buffer = LogBuffer::default();
    let writer = buffer.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_writer(move || writer.clone())
        .with_ansi(false)
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    (buffer, tracing::subscriber::set_default(subscriber))
}
