//! Timeout-bounded process execution with incremental output capture

use crate::{CommandSpec, Error, LogSink, Result};
use std::io;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Child;
use tokio::time::{Instant, sleep_until, timeout, timeout_at};
use tracing::{debug, info, trace, warn};

/// How long to keep draining output after an overrunning process was killed
const KILL_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Which output stream of the process is captured; the other is discarded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// How a supervised process ended
#[derive(Debug, Clone)]
pub enum Termination {
    /// The process exited on its own
    Exited(ExitStatus),
    /// The deadline passed and the process was killed
    TimedOut,
    /// The deadline passed and killing the process failed
    KillFailed(std::sync::Arc<io::Error>),
    /// Waiting for the process failed
    WaitFailed(std::sync::Arc<io::Error>),
}

/// Record of one finished process invocation
#[derive(Debug, Clone)]
pub struct ProcessRun {
    /// Rendered command line
    pub command: String,
    /// Captured output, one `\n`-terminated line per line read
    pub output: String,
    /// How the process ended
    pub termination: Termination,
    /// Wall time from spawn until the process was reaped
    pub elapsed: Duration,
    /// Deadline the process ran under
    pub timeout: Duration,
}

impl ProcessRun {
    /// True if the process exited with status 0
    #[must_use]
    pub fn success(&self) -> bool {
        matches!(&self.termination, Termination::Exited(status) if status.success())
    }

    /// Convert into the captured output, or the error describing the failure
    ///
    /// The error still carries the captured output for diagnostics.
    pub fn into_result(self) -> Result<String> {
        match self.termination {
            Termination::Exited(status) if status.success() => Ok(self.output),
            Termination::Exited(status) => Err(Error::Exit {
                command: self.command,
                code: status.code(),
                output: self.output,
            }),
            Termination::TimedOut => Err(Error::Timeout {
                command: self.command,
                timeout: self.timeout,
                output: self.output,
            }),
            Termination::KillFailed(source) => Err(Error::Kill {
                command: self.command,
                source,
                output: self.output,
            }),
            Termination::WaitFailed(source) => Err(Error::Io {
                command: self.command,
                operation: "wait".to_string(),
                source,
            }),
        }
    }
}

/// Runs external commands under a hard deadline
///
/// Output is read line by line while the process runs. Each line is appended
/// to the returned text and forwarded to an optional [`LogSink`]. A process
/// that overruns is killed (on Unix together with its process group) and
/// reaped before the call returns.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    timeout: Duration,
}

impl ProcessRunner {
    /// Create a runner enforcing `timeout` on every command
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Deadline applied to each command
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a command and return its standard output
    pub async fn run_stdout(
        &self,
        spec: &CommandSpec,
        sink: Option<&dyn LogSink>,
    ) -> Result<String> {
        self.run(spec, OutputStream::Stdout, sink).await
    }

    /// Run a command and return its standard error
    pub async fn run_stderr(
        &self,
        spec: &CommandSpec,
        sink: Option<&dyn LogSink>,
    ) -> Result<String> {
        self.run(spec, OutputStream::Stderr, sink).await
    }

    /// Run a command, capturing `stream`
    ///
    /// Non-zero exit, timeout and kill failure are errors that carry the
    /// output captured so far.
    pub async fn run(
        &self,
        spec: &CommandSpec,
        stream: OutputStream,
        sink: Option<&dyn LogSink>,
    ) -> Result<String> {
        self.execute(spec, stream, sink).await?.into_result()
    }

    /// Run a command and return the full record of how it went
    ///
    /// Only validation and spawn failures are returned as `Err`; everything
    /// that happens after the process started is described by the
    /// [`ProcessRun`].
    pub async fn execute(
        &self,
        spec: &CommandSpec,
        stream: OutputStream,
        sink: Option<&dyn LogSink>,
    ) -> Result<ProcessRun> {
        spec.validate()?;
        let command_line = spec.display();

        let mut cmd = spec.to_command();
        cmd.stdin(Stdio::null()).kill_on_drop(true);
        match stream {
            OutputStream::Stdout => cmd.stdout(Stdio::piped()).stderr(Stdio::null()),
            OutputStream::Stderr => cmd.stdout(Stdio::null()).stderr(Stdio::piped()),
        };
        // Own process group so a timeout or cancellation takes down helper children too
        #[cfg(unix)]
        cmd.process_group(0);

        debug!(
            command = %command_line,
            timeout_secs = self.timeout.as_secs_f64(),
            "Spawning process"
        );
        let started = Instant::now();
        let deadline = started + self.timeout;
        let mut child = cmd
            .spawn()
            .map_err(|e| Error::spawn(command_line.clone(), e))?;
        let pid = child.id();
        let mut group = GroupGuard::new(pid);

        let pipe: Box<dyn AsyncRead + Unpin + Send> = match stream {
            OutputStream::Stdout => match child.stdout.take() {
                Some(out) => Box::new(out),
                None => return Err(missing_pipe(&command_line)),
            },
            OutputStream::Stderr => match child.stderr.take() {
                Some(err) => Box::new(err),
                None => return Err(missing_pipe(&command_line)),
            },
        };

        let mut output = String::new();
        let termination = {
            let reader = pump_lines(pipe, sink, &mut output);
            tokio::pin!(reader);
            let mut reader_done = false;

            let mut exited = loop {
                tokio::select! {
                    () = &mut reader, if !reader_done => reader_done = true,
                    status = child.wait() => break Some(status),
                    () = sleep_until(deadline) => break None,
                }
            };

            // A descendant may still hold the pipe after the child exited
            if exited.is_some() && !reader_done {
                reader_done = timeout_at(deadline, &mut reader).await.is_ok();
                if !reader_done {
                    exited = None;
                }
            }

            match exited {
                Some(Ok(status)) => Termination::Exited(status),
                Some(Err(e)) => Termination::WaitFailed(std::sync::Arc::new(e)),
                None => {
                    warn!(
                        command = %command_line,
                        timeout_secs = self.timeout.as_secs_f64(),
                        "Process timed out, killing"
                    );
                    let killed = terminate(&mut child, pid).await;
                    if !reader_done && timeout(KILL_DRAIN_GRACE, &mut reader).await.is_err() {
                        warn!(command = %command_line, "Output still open after kill, abandoning reader");
                    }
                    match killed {
                        Ok(()) => Termination::TimedOut,
                        Err(e) => Termination::KillFailed(std::sync::Arc::new(e)),
                    }
                }
            }
        };
        // Reaped; a dropped future past this point has nothing left to kill
        group.disarm();

        let run = ProcessRun {
            command: command_line,
            output,
            termination,
            elapsed: started.elapsed(),
            timeout: self.timeout,
        };
        info!(
            command = %run.command,
            success = run.success(),
            elapsed_ms = run.elapsed.as_millis() as u64,
            "Process finished"
        );
        Ok(run)
    }
}

/// Kills the process group of a run that is dropped before its child is reaped
///
/// `kill_on_drop` only reaches the direct child. Helpers it started share
/// its process group, so a cancelled run takes the whole group down.
struct GroupGuard {
    #[cfg_attr(not(unix), allow(dead_code))]
    pid: Option<u32>,
    armed: bool,
}

impl GroupGuard {
    const fn new(pid: Option<u32>) -> Self {
        Self { pid, armed: true }
    }

    const fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for GroupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            match kill_process_group(pid) {
                Ok(()) => debug!(pid, "Killed process group of cancelled run"),
                Err(e) if e.raw_os_error() == Some(libc::ESRCH) => {}
                Err(e) => warn!(pid, error = %e, "Failed to kill process group of cancelled run"),
            }
        }
    }
}

fn missing_pipe(command: &str) -> Error {
    Error::io(
        command,
        "capture output",
        io::Error::other("output pipe was not created"),
    )
}

/// Read `pipe` line by line until EOF, feeding `sink` and `output`
async fn pump_lines(
    pipe: Box<dyn AsyncRead + Unpin + Send>,
    sink: Option<&dyn LogSink>,
    output: &mut String,
) {
    let mut segments = BufReader::new(pipe).split(b'\n');
    loop {
        match segments.next_segment().await {
            Ok(Some(segment)) => {
                let text = String::from_utf8_lossy(&segment);
                let line = text.strip_suffix('\r').unwrap_or(&text);
                trace!(line, "process output");
                if let Some(sink) = sink {
                    sink.append(line);
                }
                output.push_str(line);
                output.push('\n');
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "Error reading process output");
                break;
            }
        }
    }
}

/// Kill an overrunning child and reap it
///
/// The kill result is returned separately from reaping: a failed kill means
/// the process vanished between the deadline firing and the kill, which is
/// reported rather than ignored.
async fn terminate(child: &mut Child, pid: Option<u32>) -> io::Result<()> {
    #[cfg(unix)]
    let killed = match pid {
        Some(pid) => kill_process_group(pid),
        None => child.start_kill(),
    };
    #[cfg(not(unix))]
    let killed = {
        let _ = pid;
        child.start_kill()
    };

    if let Err(e) = child.wait().await {
        warn!(error = %e, "Failed to reap killed process");
    }
    killed
}

#[cfg(unix)]
#[allow(unsafe_code)]
fn kill_process_group(pid: u32) -> io::Result<()> {
    let pgid = libc::pid_t::try_from(pid)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "pid out of range"))?;
    // SAFETY: kill(2) has no memory-safety preconditions. The negative pid
    // addresses the group created by `process_group(0)` at spawn.
    let rc = unsafe { libc::kill(-pgid, libc::SIGKILL) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}
