//! Child process execution with piped input and a hard timeout.
//!
//! Both the formatter and the package manager are run through
//! [`ProcessRunner`]. The runner writes the input payload to stdin, closes it,
//! drains stdout and stderr concurrently and kills the child if the timeout
//! elapses first. It never retries.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;
use tokio::time::{timeout, Duration, Instant};
use tracing::{debug, warn};

/// Default timeout for a formatter run (15 seconds).
pub const FORMATTER_TIMEOUT: Duration = Duration::from_secs(15);

/// Default timeout for a package-manager step (5 minutes).
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(5 * 60);

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

// =============================================================================
// Text Encoding
// =============================================================================

/// Text encoding of a document, used for the formatter's stdin and stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
}

impl TextEncoding {
    pub fn encode(&self, text: &str) -> Vec<u8> {
        match self {
            Self::Utf8 => text.as_bytes().to_vec(),
            Self::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            Self::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }

    /// Decodes bytes, replacing invalid sequences.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            Self::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            Self::Utf16Le => decode_utf16(bytes, u16::from_le_bytes),
            Self::Utf16Be => decode_utf16(bytes, u16::from_be_bytes),
        }
    }
}

fn decode_utf16(bytes: &[u8], unit: fn([u8; 2]) -> u16) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| unit([pair[0], pair[1]]))
        .collect();
    String::from_utf16_lossy(&units)
}

// =============================================================================
// Invocation
// =============================================================================

/// Everything needed to start one child process. Built fresh per call.
#[derive(Debug, Clone)]
pub struct ProcessInvocation {
    pub program: OsString,
    pub args: Vec<OsString>,
    pub working_dir: Option<PathBuf>,
    /// Variables set on top of the inherited environment.
    pub env: HashMap<String, OsString>,
    pub input: Option<String>,
    pub encoding: TextEncoding,
    pub timeout: Duration,
}

impl ProcessInvocation {
    pub fn new(program: impl Into<OsString>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            working_dir: None,
            env: HashMap::new(),
            input: None,
            encoding: TextEncoding::Utf8,
            timeout: FORMATTER_TIMEOUT,
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn current_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.working_dir = Some(dir.as_ref().to_path_buf());
        self
    }

    pub fn envs(mut self, vars: HashMap<String, OsString>) -> Self {
        self.env.extend(vars);
        self
    }

    pub fn input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }

    pub fn encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Program and arguments as one printable line, for logs.
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|s| s.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

// =============================================================================
// Outcome
// =============================================================================

/// Result of running a child process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The child exited and both streams were drained.
    Completed {
        stdout: String,
        stderr: String,
        /// `None` if the child was terminated by a signal.
        exit_code: Option<i32>,
    },
    /// The timeout elapsed; the child was killed and its output discarded.
    TimedOut { elapsed: Duration },
    /// The child could not be started.
    FailedToStart { error: String },
}

impl ProcessOutcome {
    /// Returns true for a completed run with exit code 0.
    pub fn is_success(&self) -> bool {
        matches!(
            self,
            Self::Completed {
                exit_code: Some(0),
                ..
            }
        )
    }
}

// =============================================================================
// Runner
// =============================================================================

/// Runs child processes.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, invocation: ProcessInvocation) -> ProcessOutcome;
}

/// [`ProcessRunner`] backed by `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, invocation: ProcessInvocation) -> ProcessOutcome {
        let started = Instant::now();
        let command_line = invocation.command_line();

        let mut cmd = Command::new(&invocation.program);
        cmd.args(&invocation.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        if let Some(dir) = &invocation.working_dir {
            cmd.current_dir(dir);
        }
        for (key, value) in &invocation.env {
            cmd.env(key, value);
        }

        #[cfg(windows)]
        cmd.creation_flags(CREATE_NO_WINDOW);

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                warn!(command = %command_line, error = %e, "Failed to start process");
                return ProcessOutcome::FailedToStart {
                    error: e.to_string(),
                };
            }
        };

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        let payload = invocation
            .input
            .as_deref()
            .filter(|text| !text.is_empty())
            .map(|text| invocation.encoding.encode(text));

        // Writing runs alongside the drains so a child that answers before
        // reading all of its input cannot deadlock on a full pipe.
        let output_future = async {
            let write = async move {
                let Some(mut stdin) = stdin else {
                    return;
                };
                if let Some(bytes) = payload {
                    if let Err(e) = stdin.write_all(&bytes).await {
                        debug!(error = %e, "Child closed stdin before reading all input");
                    }
                }
                // Dropping the handle closes the pipe and signals end of input.
                drop(stdin);
            };

            let ((), stdout_bytes, stderr_bytes) =
                tokio::join!(write, read_stream(stdout), read_stream(stderr));
            let exit_status = child.wait().await;
            (stdout_bytes, stderr_bytes, exit_status)
        };

        let result = timeout(invocation.timeout, output_future).await;

        match result {
            Ok((stdout_bytes, stderr_bytes, exit_status)) => {
                let exit_code = match exit_status {
                    Ok(status) => status.code(),
                    Err(e) => {
                        warn!(command = %command_line, error = %e, "Failed to wait for process");
                        None
                    }
                };

                debug!(
                    command = %command_line,
                    exit_code = ?exit_code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Process completed"
                );

                ProcessOutcome::Completed {
                    stdout: invocation.encoding.decode(&stdout_bytes),
                    stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
                    exit_code,
                }
            }
            Err(_) => {
                // The child may exit between the timeout and the kill; that is fine.
                if let Err(e) = child.kill().await {
                    debug!(error = %e, "Kill after timeout failed");
                }
                let elapsed = started.elapsed();
                warn!(
                    command = %command_line,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Process timed out and was killed"
                );
                ProcessOutcome::TimedOut { elapsed }
            }
        }
    }
}

async fn read_stream<R>(stream: Option<R>) -> Vec<u8>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        if let Err(e) = stream.read_to_end(&mut buf).await {
            debug!(error = %e, "Error while draining child output");
        }
    }
    buf
}
