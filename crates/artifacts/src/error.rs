//! Error types for the artifacts crate

// Rust 1.92 compiler bug: false positives for thiserror/miette derive macro fields
// https://github.com/rust-lang/rust/issues/147648
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

/// Error type for artifact and cache operations
#[derive(Error, Debug, Clone, Diagnostic, PartialEq, Eq)]
pub enum Error {
    /// Target string does not start with a recognized architecture prefix
    #[error("Malformed target: {target}")]
    #[diagnostic(
        code(safelight::artifacts::malformed_target),
        help("Targets look like <arch>-<bits>-<platform>[-<feature>...], e.g. x86-64-nacl-sse41")
    )]
    MalformedTarget {
        /// The rejected target string
        target: String,
    },

    /// Signature string is not a SHA-256 hex digest
    #[error("Malformed signature: {signature}")]
    #[diagnostic(code(safelight::artifacts::malformed_signature))]
    MalformedSignature {
        /// The rejected signature string
        signature: String,
    },

    /// Cache configuration error
    #[error("Cache configuration error: {message}")]
    #[diagnostic(code(safelight::artifacts::config))]
    Configuration {
        /// Error message describing the configuration issue
        message: String,
    },

    /// Serialization error
    #[error("Serialization error: {message}")]
    #[diagnostic(code(safelight::artifacts::serialization))]
    Serialization {
        /// Error message describing the serialization issue
        message: String,
    },
}

impl Error {
    /// Create a malformed target error
    #[must_use]
    pub fn malformed_target(target: impl Into<String>) -> Self {
        Self::MalformedTarget {
            target: target.into(),
        }
    }

    /// Create a malformed signature error
    #[must_use]
    pub fn malformed_signature(signature: impl Into<String>) -> Self {
        Self::MalformedSignature {
            signature: signature.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration {
            message: msg.into(),
        }
    }

    /// Create a serialization error
    #[must_use]
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization {
            message: msg.into(),
        }
    }
}

/// Result type for artifact operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_target_error() {
        let err = Error::malformed_target("foo-bar");
        assert_eq!(err.to_string(), "Malformed target: foo-bar");
    }

    #[test]
    fn test_configuration_error() {
        let err = Error::configuration("capacity must be non-zero");
        assert!(err.to_string().contains("Cache configuration error"));
        assert!(err.to_string().contains("capacity must be non-zero"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }
}
