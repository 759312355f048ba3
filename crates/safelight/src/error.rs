//! Error types for the safelight server and CLI

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Exit code for a successful run
pub const EXIT_OK: i32 = 0;
/// Exit code for CLI or configuration errors
pub const EXIT_CONFIG: i32 = 2;
/// Exit code for failed builds
pub const EXIT_BUILD: i32 = 3;

/// Server and CLI errors
#[derive(Error, Debug, Diagnostic)]
pub enum Error {
    /// Invalid configuration value or file
    #[error("Configuration error: {message}")]
    #[diagnostic(code(safelight::config))]
    Config {
        /// What is wrong
        message: String,
        /// How to fix it
        #[help]
        help: Option<String>,
    },

    /// A build failed
    #[error(transparent)]
    #[diagnostic(transparent)]
    Build(#[from] safelight_builder::Error),

    /// Only NaCl targets have a builder
    #[error("Unsupported target: {target}")]
    #[diagnostic(
        code(safelight::unsupported_target),
        help("Only NaCl targets can be built, e.g. x86-64-nacl-sse41")
    )]
    UnsupportedTarget {
        /// The rejected target
        target: String,
    },

    /// File system operation failed
    #[error("Failed to {operation} {}: {source}", path.display())]
    #[diagnostic(
        code(safelight::io),
        help("Check file permissions and ensure the path exists")
    )]
    Io {
        /// What was being done
        operation: String,
        /// Path involved
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The HTTP listener failed
    #[error("Server error: {message}")]
    #[diagnostic(code(safelight::server))]
    Server {
        /// What went wrong
        message: String,
    },
}

impl Error {
    /// Create a configuration error
    #[must_use]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: None,
        }
    }

    /// Create a configuration error with help text
    #[must_use]
    pub fn config_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            help: Some(help.into()),
        }
    }

    /// Create an I/O error for `operation` on `path`
    #[must_use]
    pub fn io(
        operation: impl Into<String>,
        path: impl Into<PathBuf>,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create a server error
    #[must_use]
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Process exit code for this error
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Config { .. }
            | Self::Build(safelight_builder::Error::Artifacts(
                safelight_artifacts::Error::Configuration { .. },
            )) => EXIT_CONFIG,
            _ => EXIT_BUILD,
        }
    }
}

/// Result type for the server and CLI
pub type Result<T> = std::result::Result<T, Error>;
