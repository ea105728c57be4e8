//! Analysis invoker — hands one cycle's listings to the z-score engine.
//!
//! Defines the `Analyzer` trait and `ProcessAnalyzer`, which runs an
//! external program per cycle:
//!
//! 1. Serialize the request to a JSON array.
//! 2. Spawn the program, passing the payload as its last argument or on
//!    stdin (`AnalysisInput`).
//! 3. Read stdout while waiting for exit. Stdout past `max_output_bytes`
//!    kills the child → `MalformedOutput`.
//! 4. Non-zero exit → `ProcessFailed` (output discarded); zero → parse
//!    stdout as `[{name, price, z_score}]`.
//!
//! The whole run is bounded by `timeout`; on expiry the child is killed.
//! Children are spawned with `kill_on_drop`, so an abandoned cycle never
//! leaves a process behind.

use async_trait::async_trait;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStdin, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::{AnalysisConfig, AnalysisInput};
use crate::types::{AnalysisError, AnalysisRequest, Recommendation};

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Stderr kept for diagnostics.
const MAX_STDERR_BYTES: usize = 8 * 1024;

/// Argument payloads above this size get a warning: many platforms cap a
/// single argv entry around 128 KiB. Switch `input` to `stdin` past it.
const ARG_WARN_BYTES: usize = 100 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// How long pipes may stay open after the process exits.
const PIPE_GRACE: Duration = Duration::from_millis(500);

// ---------------------------------------------------------------------------
// Analyzer trait
// ---------------------------------------------------------------------------

/// Abstraction over the statistical engine that flags underpriced listings.
///
/// At most one `analyze` call runs per cycle. An empty result is a
/// success ("no deals"), not an error.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Recommendation>, AnalysisError>;

    /// Engine name for logging.
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Process analyzer
// ---------------------------------------------------------------------------

/// Runs an external analysis program once per request.
#[derive(Debug, Clone)]
pub struct ProcessAnalyzer {
    program: String,
    args: Vec<String>,
    input: AnalysisInput,
    working_dir: Option<PathBuf>,
    timeout: Duration,
    max_output_bytes: usize,
}

impl ProcessAnalyzer {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        let defaults = AnalysisConfig::default();
        Self {
            program: program.into(),
            args,
            input: defaults.input,
            working_dir: None,
            timeout: defaults.timeout(),
            max_output_bytes: defaults.max_output_bytes,
        }
    }

    pub fn from_config(cfg: &AnalysisConfig) -> Self {
        Self {
            program: cfg.program.clone(),
            args: cfg.args.clone(),
            input: cfg.input,
            working_dir: cfg.working_dir.clone(),
            timeout: cfg.timeout(),
            max_output_bytes: cfg.max_output_bytes,
        }
    }

    pub fn with_input(mut self, input: AnalysisInput) -> Self {
        self.input = input;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_output_bytes(mut self, max: usize) -> Self {
        self.max_output_bytes = max;
        self
    }

    fn command(&self, payload: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match self.input {
            AnalysisInput::Argument => {
                if payload.len() > ARG_WARN_BYTES {
                    warn!(
                        bytes = payload.len(),
                        "Analysis payload is large for a command-line argument; consider input = \"stdin\""
                    );
                }
                cmd.arg(payload).stdin(Stdio::null());
            }
            AnalysisInput::Stdin => {
                cmd.stdin(Stdio::piped());
            }
        }

        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }
        cmd
    }
}

/// Bytes read from one pipe.
#[derive(Debug, Default)]
struct Drained {
    bytes: Vec<u8>,
    /// Total bytes seen, including those past the cap.
    total: usize,
}

impl Drained {
    fn overflowed(&self) -> bool {
        self.total > self.bytes.len()
    }

    fn push(&mut self, chunk: &[u8], cap: usize) {
        let room = cap.saturating_sub(self.bytes.len());
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
        self.total += chunk.len();
    }
}

/// Read stdout into `out` until EOF, stopping as soon as it passes `cap`.
async fn read_capped<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize, out: &mut Drained) -> io::Result<()> {
    let Some(mut reader) = reader else {
        return Ok(());
    };
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        out.push(&chunk[..n], cap);
        if out.overflowed() {
            return Ok(());
        }
    }
}

/// Read stderr to EOF, keeping the first `cap` bytes.
async fn drain<R: AsyncRead + Unpin>(reader: Option<R>, cap: usize) -> io::Result<Drained> {
    let mut out = Drained::default();
    let Some(mut reader) = reader else {
        return Ok(out);
    };
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            return Ok(out);
        }
        out.push(&chunk[..n], cap);
    }
}

/// Write the payload and close stdin. A child that exits without reading
/// closes the pipe early; that is left for the exit status to judge.
async fn feed(stdin: Option<ChildStdin>, payload: String) {
    if let Some(mut pipe) = stdin {
        if let Err(e) = pipe.write_all(payload.as_bytes()).await {
            debug!(error = %e, "Analysis process closed stdin early");
        }
        // Dropping the handle closes the pipe and signals EOF.
    }
}

/// Background pipe tasks of one run. Aborted on drop.
struct PipeTasks {
    stderr: JoinHandle<io::Result<Drained>>,
    feed: Option<JoinHandle<()>>,
}

impl PipeTasks {
    /// Captured stderr, waiting at most `PIPE_GRACE` for the pipe to close.
    async fn stderr(&mut self) -> String {
        match tokio::time::timeout(PIPE_GRACE, &mut self.stderr).await {
            Ok(Ok(Ok(drained))) => String::from_utf8_lossy(&drained.bytes).trim().to_string(),
            _ => String::new(),
        }
    }
}

impl Drop for PipeTasks {
    fn drop(&mut self) {
        self.stderr.abort();
        if let Some(feed) = &self.feed {
            feed.abort();
        }
    }
}

enum Collected {
    Exited {
        status: io::Result<ExitStatus>,
        stdout: io::Result<Drained>,
    },
    /// Stdout passed the cap; the child may still be running.
    Overflow,
}

/// Read stdout while waiting for the child to exit.
///
/// Once the child has exited, stdout gets `PIPE_GRACE` to reach EOF. A
/// background grandchild can hold the pipe open indefinitely; whatever was
/// read by then is used.
async fn collect<R: AsyncRead + Unpin>(child: &mut Child, stdout: Option<R>, cap: usize) -> Collected {
    let mut out = Drained::default();
    let read_result = {
        let read = read_capped(stdout, cap, &mut out);
        tokio::pin!(read);
        tokio::select! {
            result = &mut read => result,
            _ = child.wait() => match tokio::time::timeout(PIPE_GRACE, &mut read).await {
                Ok(result) => result,
                Err(_) => {
                    debug!("Analysis output pipe still open after exit; using output read so far");
                    Ok(())
                }
            },
        }
    };

    if out.overflowed() {
        return Collected::Overflow;
    }
    Collected::Exited {
        status: child.wait().await,
        stdout: read_result.map(|()| out),
    }
}

async fn terminate(child: &mut Child, reason: &str) {
    if let Err(e) = child.kill().await {
        warn!(error = %e, reason, "Failed to kill analysis process");
    }
}

fn parse_output(stdout: &Drained) -> Result<Vec<Recommendation>, AnalysisError> {
    serde_json::from_slice(&stdout.bytes).map_err(|e| {
        let preview: String = String::from_utf8_lossy(&stdout.bytes).chars().take(120).collect();
        AnalysisError::MalformedOutput {
            detail: format!("{e} (output starts with {preview:?})"),
        }
    })
}

#[async_trait]
impl Analyzer for ProcessAnalyzer {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<Vec<Recommendation>, AnalysisError> {
        let payload = request.to_payload()?;
        debug!(
            program = %self.program,
            input = ?self.input,
            listings = request.len(),
            bytes = payload.len(),
            "Spawning analysis process"
        );

        let mut child = self.command(&payload).spawn().map_err(|e| AnalysisError::Spawn {
            program: self.program.clone(),
            detail: e.to_string(),
        })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let mut pipes = PipeTasks {
            stderr: tokio::spawn(drain(child.stderr.take(), MAX_STDERR_BYTES)),
            feed: match self.input {
                AnalysisInput::Stdin => Some(tokio::spawn(feed(stdin, payload))),
                AnalysisInput::Argument => None,
            },
        };
        let cap = self.max_output_bytes;

        let collected = tokio::time::timeout(self.timeout, collect(&mut child, stdout, cap)).await;
        let (status, out) = match collected {
            Ok(Collected::Exited { status, stdout }) => (status, stdout),
            Ok(Collected::Overflow) => {
                // A process that already failed on its own reports that failure.
                if let Ok(Some(status)) = child.try_wait() {
                    if !status.success() {
                        return Err(AnalysisError::ProcessFailed {
                            code: status.code(),
                            stderr: pipes.stderr().await,
                        });
                    }
                }
                terminate(&mut child, "output cap exceeded").await;
                warn!(cap, "Analysis output exceeded cap; process killed");
                return Err(AnalysisError::MalformedOutput {
                    detail: format!("output exceeded {cap} bytes"),
                });
            }
            Err(_) => {
                terminate(&mut child, "timed out").await;
                return Err(AnalysisError::Timeout {
                    after_ms: self.timeout.as_millis() as u64,
                });
            }
        };

        let status = status.map_err(|e| AnalysisError::ProcessFailed {
            code: None,
            stderr: format!("failed to wait for process: {e}"),
        })?;
        let stderr = pipes.stderr().await;

        if !status.success() {
            warn!(
                code = ?status.code(),
                stderr = %stderr,
                "Analysis process exited unsuccessfully; output discarded"
            );
            return Err(AnalysisError::ProcessFailed {
                code: status.code(),
                stderr,
            });
        }

        let out = out.map_err(|e| AnalysisError::MalformedOutput {
            detail: format!("failed to read output: {e}"),
        })?;
        if !stderr.is_empty() {
            debug!(stderr = %stderr, "Analysis process wrote to stderr");
        }
        parse_output(&out)
    }

    fn name(&self) -> &'static str {
        "process"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
