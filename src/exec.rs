//! Subprocess execution with cooperative cancellation.
//!
//! Package managers are driven through the [`Executor`] trait so unit tests
//! can substitute a scripted executor. [`SystemExecutor`] polls the child
//! process and kills it as soon as the supplied [`CancelToken`] is cancelled
//! or its deadline passes.
use std::io::Read;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::cancel::CancelToken;
use crate::error::ExecError;

/// Interval between `try_wait` polls while a child is running.
const POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
    /// Whether the process exited with status zero.
    pub success: bool,
    /// Exit code, `None` when terminated by a signal.
    pub code: Option<i32>,
}

impl ExecResult {
    /// Standard output followed by standard error, as package managers
    /// split their diagnostics unpredictably between the two.
    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.is_empty(), self.stderr.is_empty()) {
            (_, true) => self.stdout.clone(),
            (true, false) => self.stderr.clone(),
            (false, false) => format!("{}\n{}", self.stdout, self.stderr),
        }
    }
}

/// Abstraction over process execution.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run a command and return its output regardless of exit status.
    ///
    /// # Errors
    ///
    /// Returns [`ExecError::Spawn`] if the program cannot be started and
    /// [`ExecError::Interrupted`] if `cancel` fires before it exits.
    fn run_unchecked(
        &self,
        cancel: &CancelToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError>;

    /// Run a command, failing if it exits non-zero.
    ///
    /// # Errors
    ///
    /// Everything [`run_unchecked`](Self::run_unchecked) returns, plus
    /// [`ExecError::Failed`] on a non-zero exit.
    fn run(
        &self,
        cancel: &CancelToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        let result = self.run_unchecked(cancel, program, args)?;
        if !result.success {
            return Err(ExecError::Failed {
                program: program.to_string(),
                code: result.code.unwrap_or(-1),
                stderr: result.stderr.trim().to_string(),
            });
        }
        Ok(result)
    }

    /// Resolve a program on `PATH`.
    fn which(&self, program: &str) -> Option<PathBuf>;
}

/// Executor that spawns real processes.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run_unchecked(
        &self,
        cancel: &CancelToken,
        program: &str,
        args: &[&str],
    ) -> Result<ExecResult, ExecError> {
        cancel.check().map_err(|reason| ExecError::Interrupted {
            program: program.to_string(),
            reason,
        })?;

        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| ExecError::Spawn {
                program: program.to_string(),
                source,
            })?;
        tracing::trace!("spawned {program} {}", args.join(" "));

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {}
                Err(source) => {
                    kill(&mut child);
                    return Err(ExecError::Spawn {
                        program: program.to_string(),
                        source,
                    });
                }
            }
            if let Err(reason) = cancel.check() {
                kill(&mut child);
                tracing::debug!("{program} stopped: {reason}");
                return Err(ExecError::Interrupted {
                    program: program.to_string(),
                    reason,
                });
            }
            thread::sleep(POLL_INTERVAL);
        };

        Ok(ExecResult {
            stdout: join(stdout),
            stderr: join(stderr),
            success: status.success(),
            code: status.code(),
        })
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Read a pipe to completion on a background thread so the child never
/// blocks on a full pipe buffer.
fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<Vec<u8>>> {
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = reader.read_to_end(&mut buf);
            buf
        })
    })
}

fn join(handle: Option<JoinHandle<Vec<u8>>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default()
}

fn kill(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}
