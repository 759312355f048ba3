//! Deterministic build signatures
//!
//! A signature identifies *what* is being built, independent of the target it
//! is built for. It is the lowercase hex SHA-256 of the build's identifying
//! inputs, composed according to a [`SignaturePolicy`].

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

/// Length of a signature in hex characters
pub const SIGNATURE_LEN: usize = 64;

/// Hex SHA-256 identifying a build's inputs
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature(String);

impl Signature {
    /// Parse a signature received from a client
    ///
    /// Accepts exactly 64 lowercase hex characters.
    pub fn parse(s: &str) -> Result<Self> {
        let valid = s.len() == SIGNATURE_LEN
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(Error::malformed_signature(s))
        }
    }

    /// Full hex representation
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Signature {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Signature> for String {
    fn from(sig: Signature) -> Self {
        sig.0
    }
}

/// The identifying inputs of one build
#[derive(Debug, Clone, Copy)]
pub struct SignatureInputs<'a> {
    /// Name of the filter function being generated
    pub function_name: &'a str,
    /// Location of the generator source
    pub generator_source: &'a str,
    /// Extra arguments forwarded to the generator
    pub generator_args: &'a [String],
}

/// Which inputs take part in a signature
///
/// `NameAndSource` reproduces the historical behavior: builds that differ
/// only in extra generator arguments share one cache slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignaturePolicy {
    /// `SHA-256(function_name + "/" + generator_source)`
    #[default]
    NameAndSource,
    /// Like `NameAndSource`, followed by every generator argument
    NameSourceAndArgs,
}

impl SignaturePolicy {
    /// Compute the signature of `inputs` under this policy
    #[must_use]
    pub fn compute(self, inputs: &SignatureInputs<'_>) -> Signature {
        let mut hasher = Sha256::new();
        hasher.update(inputs.function_name.as_bytes());
        hasher.update(b"/");
        hasher.update(inputs.generator_source.as_bytes());

        if self == Self::NameSourceAndArgs {
            // Arguments never contain NUL, so it is an unambiguous separator
            for arg in inputs.generator_args {
                hasher.update([0u8]);
                hasher.update(arg.as_bytes());
            }
        }

        Signature(hex::encode(hasher.finalize()))
    }
}

impl std::str::FromStr for SignaturePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "name-and-source" => Ok(Self::NameAndSource),
            "name-source-and-args" => Ok(Self::NameSourceAndArgs),
            _ => Err(format!("Unknown signature policy: {s}")),
        }
    }
}
