//! Execution of external tools with abort and timeout support.
//!
//! [`ToolCommand::run`] races the child against its timeout and the job's
//! [`AbortSignal`]; a child that loses the race is killed on drop.
//! [`ToolCommand::execute`] is the blocking entry point used from worker
//! threads and the CLI.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::Command;

use crate::segment::AbortSignal;
use crate::{Error, Result};

/// Default command timeout: 1 hour.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(3600);

/// Keep at most this many bytes of stderr in error messages.
const STDERR_TAIL_BYTES: usize = 2048;

/// Output captured from a tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

/// A builder for constructing and executing external tool invocations.
///
/// # Example
///
/// ```no_run
/// use vidsplit_av::command::ToolCommand;
/// use vidsplit_av::AbortSignal;
/// use std::path::PathBuf;
///
/// let output = ToolCommand::new(PathBuf::from("ffprobe"))
///     .arg("-v").arg("quiet")
///     .arg("-show_format")
///     .arg("/path/to/video.mkv")
///     .execute(&AbortSignal::new())?;
/// println!("{}", output.stdout);
/// # Ok::<(), vidsplit_av::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    timeout: Duration,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: PathBuf) -> Self {
        Self {
            program,
            args: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Set the maximum execution time.
    pub fn timeout(&mut self, d: Duration) -> &mut Self {
        self.timeout = d;
        self
    }

    /// Arguments collected so far.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// The configured execution time limit.
    pub fn get_timeout(&self) -> Duration {
        self.timeout
    }

    fn program_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// Run the command to completion on a private single-threaded runtime.
    ///
    /// Must not be called from async code; use [`ToolCommand::run`] there.
    pub fn execute(&self, abort: &AbortSignal) -> Result<ToolOutput> {
        abort.check()?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| {
                Error::encoding(self.program_name(), format!("failed to start runtime: {e}"))
            })?;
        runtime.block_on(self.run(abort))
    }

    /// Run the command, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// - [`Error::ToolNotFound`] if the program does not exist.
    /// - [`Error::Aborted`] if `abort` is raised while the child runs; the
    ///   child is killed.
    /// - [`Error::Encoding`] on timeout, spawn failure or non-zero exit
    ///   (message includes the tail of stderr).
    pub async fn run(&self, abort: &AbortSignal) -> Result<ToolOutput> {
        let program_name = self.program_name();

        abort.check()?;

        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::tool_not_found(program_name.clone())
                } else {
                    Error::encoding(program_name.clone(), format!("failed to spawn: {e}"))
                }
            })?;

        let output = tokio::select! {
            biased;

            _ = abort.aborted() => {
                tracing::debug!("{} killed by abort signal", program_name);
                return Err(Error::Aborted);
            }
            result = tokio::time::timeout(self.timeout, child.wait_with_output()) => match result {
                Ok(Ok(output)) => output,
                Ok(Err(e)) => {
                    return Err(Error::encoding(
                        program_name,
                        format!("I/O error waiting for process: {e}"),
                    ));
                }
                Err(_elapsed) => {
                    return Err(Error::encoding(
                        program_name,
                        format!("timed out after {:?}", self.timeout),
                    ));
                }
            },
        };

        let output = ToolOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !output.status.success() {
            return Err(Error::encoding(
                program_name,
                format!(
                    "exited with status {}: {}",
                    output.status,
                    stderr_tail(output.stderr.trim())
                ),
            ));
        }

        Ok(output)
    }
}

fn stderr_tail(stderr: &str) -> &str {
    if stderr.len() <= STDERR_TAIL_BYTES {
        return stderr;
    }
    let mut start = stderr.len() - STDERR_TAIL_BYTES;
    while !stderr.is_char_boundary(start) {
        start += 1;
    }
    &stderr[start..]
}
