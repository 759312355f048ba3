//! Error types for the safelight-process crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Main error type for process execution
///
/// I/O sources are held in an `Arc` so the error can be cloned and handed to
/// every caller waiting on the same build.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum Error {
    /// Command failed validation before anything was spawned
    #[error("Invalid command: {message}")]
    #[diagnostic(code(safelight::process::invalid_command))]
    InvalidCommand {
        /// What is wrong with the command
        message: String,
    },

    /// The process could not be started
    #[error("Failed to start `{command}`: {source}")]
    #[diagnostic(
        code(safelight::process::spawn),
        help("Check that the executable exists and is executable")
    )]
    Spawn {
        /// Rendered command line
        command: String,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// I/O error while supervising a running process
    #[error("I/O error during {operation} of `{command}`: {source}")]
    #[diagnostic(code(safelight::process::io))]
    Io {
        /// Rendered command line
        command: String,
        /// Description of the operation that failed
        operation: String,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },

    /// The process exceeded its deadline and was killed
    #[error("Timed out after {}s: `{command}`", timeout.as_secs_f64())]
    #[diagnostic(
        code(safelight::process::timeout),
        help("Run the command above to debug, or raise the build timeout")
    )]
    Timeout {
        /// Rendered command line
        command: String,
        /// The deadline that was exceeded
        timeout: Duration,
        /// Output captured before the process was killed
        output: String,
    },

    /// The process exited unsuccessfully
    #[error("`{command}` exited with {}", code.map_or_else(|| "a signal".to_string(), |c| format!("status {c}")))]
    #[diagnostic(
        code(safelight::process::exit),
        help("Run the command above to debug")
    )]
    Exit {
        /// Rendered command line
        command: String,
        /// Exit code, `None` if terminated by a signal
        code: Option<i32>,
        /// Output captured from the process
        output: String,
    },

    /// Killing an overrunning process failed
    #[error("Failed to kill `{command}` after timeout: {source}")]
    #[diagnostic(code(safelight::process::kill))]
    Kill {
        /// Rendered command line
        command: String,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
        /// Output captured before the kill attempt
        output: String,
    },
}

impl Error {
    /// Create an invalid command error
    pub fn invalid_command(message: impl Into<String>) -> Self {
        Self::InvalidCommand {
            message: message.into(),
        }
    }

    /// Create a spawn error
    pub fn spawn(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            command: command.into(),
            source: Arc::new(source),
        }
    }

    /// Create a supervision I/O error
    pub fn io(
        command: impl Into<String>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            command: command.into(),
            operation: operation.into(),
            source: Arc::new(source),
        }
    }

    /// Output captured from the process, if it ran at all
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Timeout { output, .. } | Self::Exit { output, .. } | Self::Kill { output, .. } => {
                Some(output)
            }
            _ => None,
        }
    }

    /// Rendered command line, if a command was involved
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::InvalidCommand { .. } => None,
            Self::Spawn { command, .. }
            | Self::Io { command, .. }
            | Self::Timeout { command, .. }
            | Self::Exit { command, .. }
            | Self::Kill { command, .. } => Some(command),
        }
    }

    /// True for the distinguished timeout error
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Result type for process execution
pub type Result<T> = std::result::Result<T, Error>;
