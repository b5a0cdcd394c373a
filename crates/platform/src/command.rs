//! Bounded external command execution
//!
//! Every tool a source shells out to (`ss`, `lsof`, `systemctl`, ...)
//! runs through [`CommandRunner`], which kills the child once the configured
//! timeout elapses and reports it as [`SourceError::Timeout`].

use std::io::{ErrorKind, Read};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, trace};
use witr_core::{SourceError, SourceResult};

/// How often a running child is polled for exit
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Runs external commands with a deadline
#[derive(Debug, Clone, Copy)]
pub struct CommandRunner {
    timeout: Duration,
}

impl Default for CommandRunner {
    fn default() -> Self {
        Self::new(Duration::from_millis(crate::DEFAULT_TIMEOUT_MS))
    }
}

impl CommandRunner {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `program args...` and capture its output
    ///
    /// A missing binary is [`SourceError::Unavailable`]; a child still running
    /// at the deadline is killed and reported as [`SourceError::Timeout`].
    pub fn run(
        &self,
        collaborator: &'static str,
        program: &str,
        args: &[&str],
    ) -> SourceResult<CommandOutput> {
        debug!(program, ?args, timeout = ?self.timeout, "Running command");
        let mut child = Command::new(program)
            .args(args)
            .env("LC_ALL", "C")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => SourceError::unavailable(collaborator, format!("{} not installed", program)),
                ErrorKind::PermissionDenied => SourceError::AccessDenied {
                    what: program.to_string(),
                },
                _ => SourceError::unavailable(collaborator, e),
            })?;

        // Drain pipes on their own threads so a chatty child cannot block on a full pipe
        let stdout = child.stdout.take().map(spawn_reader);
        let stderr = child.stderr.take().map(spawn_reader);

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(SourceError::Timeout {
                        collaborator,
                        after: self.timeout,
                    });
                }
                Ok(None) => thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(SourceError::unavailable(collaborator, e)),
            }
        };

        let output = CommandOutput {
            success: status.success(),
            code: status.code(),
            stdout: join_reader(stdout),
            stderr: join_reader(stderr),
        };
        trace!(program, code = ?output.code, bytes = output.stdout.len(), "Command finished");
        Ok(output)
    }

    /// Like [`run`](Self::run) but a non-zero exit is an error
    pub fn run_ok(
        &self,
        collaborator: &'static str,
        program: &str,
        args: &[&str],
    ) -> SourceResult<String> {
        let output = self.run(collaborator, program, args)?;
        if output.success {
            return Ok(output.stdout);
        }
        let stderr = output.stderr.trim();
        if looks_like_permission_error(stderr) {
            return Err(SourceError::AccessDenied {
                what: format!("{} ({})", program, stderr),
            });
        }
        Err(SourceError::unavailable(
            collaborator,
            format!("{} exited with {:?}: {}", program, output.code, stderr),
        ))
    }
}

fn spawn_reader<R: Read + Send + 'static>(mut pipe: R) -> thread::JoinHandle<String> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        let _ = pipe.read_to_end(&mut buf);
        String::from_utf8_lossy(&buf).into_owned()
    })
}

fn join_reader(handle: Option<thread::JoinHandle<String>>) -> String {
    handle.and_then(|h| h.join().ok()).unwrap_or_default()
}

fn looks_like_permission_error(stderr: &str) -> bool {
    let lower = stderr.to_lowercase();
    lower.contains("permission denied") || lower.contains("operation not permitted") || lower.contains("access denied")
}
