//! Error types for the safelight-builder crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use safelight_artifacts::ArtifactKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

/// Error type for build coordination
///
/// Cloneable so that one failed build can be reported to every request that
/// was waiting on it.
#[derive(Error, Debug, Clone, Diagnostic)]
pub enum Error {
    /// Target, signature, cache or manifest problem
    #[error(transparent)]
    #[diagnostic(transparent)]
    Artifacts(#[from] safelight_artifacts::Error),

    /// Generator could not be started, failed, or timed out
    #[error(transparent)]
    #[diagnostic(transparent)]
    Process(#[from] safelight_process::Error),

    /// Request fields failed validation
    #[error("Invalid build request: {message}")]
    #[diagnostic(code(safelight::builder::invalid_request))]
    InvalidRequest {
        /// What is wrong with the request
        message: String,
    },

    /// The generator succeeded but reported no artifact this build recognizes
    #[error("Generator for {build_name} produced no recognizable artifact")]
    #[diagnostic(
        code(safelight::builder::no_artifacts),
        help("The generator must print the path of each file it writes")
    )]
    NoArtifacts {
        /// Internal build name, e.g. `safelight_demo`
        build_name: String,
        /// Generator command line
        command: String,
        /// Generator output that was scanned
        output: String,
    },

    /// One expected artifact was not reported or does not exist
    #[error("Missing {kind} artifact{}", path.as_ref().map_or(String::new(), |p| format!(": {}", p.display())))]
    #[diagnostic(code(safelight::builder::artifact_missing))]
    ArtifactMissing {
        /// Kind of the missing artifact
        kind: ArtifactKind,
        /// Path the generator reported, if any
        path: Option<Box<Path>>,
        /// Generator command line
        command: String,
        /// Generator output that was scanned
        output: String,
    },

    /// The task running a build ended without producing a result
    #[error("Build task ended without a result: {message}")]
    #[diagnostic(code(safelight::builder::build_aborted))]
    BuildAborted {
        /// Why the task ended
        message: String,
    },

    /// An artifact file exists but could not be read
    #[error("Failed to read {kind} artifact {}: {source}", path.display())]
    #[diagnostic(
        code(safelight::builder::artifact_read),
        help("Check file permissions in the generator output directory")
    )]
    ArtifactRead {
        /// Kind of the unreadable artifact
        kind: ArtifactKind,
        /// Path of the file
        path: Box<Path>,
        /// Generator command line
        command: String,
        /// The underlying I/O error
        #[source]
        source: Arc<std::io::Error>,
    },
}

impl Error {
    /// Create an invalid request error
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: message.into(),
        }
    }

    /// Create an artifact read error
    #[must_use]
    pub fn artifact_read(
        kind: ArtifactKind,
        path: PathBuf,
        command: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::ArtifactRead {
            kind,
            path: path.into_boxed_path(),
            command: command.into(),
            source: Arc::new(source),
        }
    }

    /// Generator output attached to this error, if the generator ran
    #[must_use]
    pub fn output(&self) -> Option<&str> {
        match self {
            Self::Process(e) => e.output(),
            Self::NoArtifacts { output, .. } | Self::ArtifactMissing { output, .. } => Some(output),
            _ => None,
        }
    }

    /// Command line to rerun by hand, if a command was involved
    #[must_use]
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Process(e) => e.command(),
            Self::NoArtifacts { command, .. }
            | Self::ArtifactMissing { command, .. }
            | Self::ArtifactRead { command, .. } => Some(command.as_str()),
            _ => None,
        }
    }

    /// True when the target string was rejected
    #[must_use]
    pub const fn is_malformed_target(&self) -> bool {
        matches!(
            self,
            Self::Artifacts(safelight_artifacts::Error::MalformedTarget { .. })
        )
    }

    /// Human-readable report: the error, the command and the captured output
    #[must_use]
    pub fn report(&self) -> String {
        let mut report = self.to_string();
        if let Some(command) = self.command() {
            report.push_str("\n\nCommand:\n  ");
            report.push_str(command);
        }
        if let Some(output) = self.output().filter(|o| !o.is_empty()) {
            report.push_str("\n\nOutput:\n");
            report.push_str(output);
        }
        report
    }
}

/// Result type for build coordination
pub type Result<T> = std::result::Result<T, Error>;
