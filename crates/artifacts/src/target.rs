//! Target identifiers
//!
//! A target names the platform an artifact is built for, e.g.
//! `x86-64-nacl-sse41`. Its architecture prefix determines the CPU label used
//! in load manifests.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// CPU label of a target, as used in manifest `program` keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Cpu {
    /// 32-bit ARM
    #[serde(rename = "arm")]
    Arm,
    /// Portable NaCl bitcode
    #[serde(rename = "pnacl")]
    Pnacl,
    /// 32-bit x86
    #[serde(rename = "x86-32")]
    X86_32,
    /// 64-bit x86
    #[serde(rename = "x86-64")]
    X86_64,
}

/// Recognized target prefixes and the CPU each maps to
const PREFIXES: [(&str, Cpu); 4] = [
    ("arm-32-", Cpu::Arm),
    ("pnacl-32-", Cpu::Pnacl),
    ("x86-32-", Cpu::X86_32),
    ("x86-64-", Cpu::X86_64),
];

impl Cpu {
    /// Manifest label, e.g. `x86-64`
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Arm => "arm",
            Self::Pnacl => "pnacl",
            Self::X86_32 => "x86-32",
            Self::X86_64 => "x86-64",
        }
    }

    /// Directory name used for prebuilt binaries, e.g. `x86_64`
    #[must_use]
    pub fn dir_name(self) -> String {
        self.label().replace('-', "_")
    }
}

impl fmt::Display for Cpu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A validated target identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Target {
    raw: String,
    cpu: Cpu,
}

impl Target {
    /// Parse a target string
    ///
    /// The string must start with a recognized `<arch>-<bits>-` prefix, have a
    /// non-empty platform component, and contain only ASCII alphanumerics,
    /// `-` and `_` since it ends up in file names and URLs.
    pub fn parse(raw: &str) -> Result<Self> {
        let charset_ok = !raw.is_empty()
            && raw
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_');
        if !charset_ok {
            return Err(Error::malformed_target(raw));
        }

        let cpu = PREFIXES
            .iter()
            .find(|(prefix, _)| raw.starts_with(prefix) && raw.len() > prefix.len())
            .map(|(_, cpu)| *cpu)
            .ok_or_else(|| Error::malformed_target(raw))?;

        Ok(Self {
            raw: raw.to_string(),
            cpu,
        })
    }

    /// The target string as given
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// CPU label derived from the prefix
    #[must_use]
    pub const fn cpu(&self) -> Cpu {
        self.cpu
    }

    /// Whether the target names the NaCl platform (`...-nacl...`)
    #[must_use]
    pub fn is_nacl(&self) -> bool {
        self.raw.split('-').any(|part| part == "nacl")
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl std::str::FromStr for Target {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_prefixes() {
        assert_eq!(Target::parse("arm-32-nacl").unwrap().cpu(), Cpu::Arm);
        assert_eq!(Target::parse("pnacl-32-nacl").unwrap().cpu(), Cpu::Pnacl);
        assert_eq!(Target::parse("x86-32-nacl").unwrap().cpu(), Cpu::X86_32);
        assert_eq!(
            Target::parse("x86-64-nacl-sse41").unwrap().cpu(),
            Cpu::X86_64
        );
    }

    #[test]
    fn test_unrecognized_prefix_is_malformed() {
        let err = Target::parse("foo-bar").unwrap_err();
        assert_eq!(err, Error::malformed_target("foo-bar"));
    }

    #[test]
    fn test_prefix_without_platform_is_malformed() {
        assert!(Target::parse("x86-64-").is_err());
        assert!(Target::parse("x86-64").is_err());
    }

    #[test]
    fn test_rejects_path_characters() {
        assert!(Target::parse("x86-64-nacl/../../etc").is_err());
        assert!(Target::parse("x86-64-nacl.nexe").is_err());
        assert!(Target::parse("").is_err());
    }

    #[test]
    fn test_is_nacl() {
        assert!(Target::parse("x86-64-nacl-sse41").unwrap().is_nacl());
        assert!(!Target::parse("x86-64-linux").unwrap().is_nacl());
        assert!(!Target::parse("x86-64-linux-naclish").unwrap().is_nacl());
    }

    #[test]
    fn test_cpu_dir_name() {
        assert_eq!(Cpu::X86_64.dir_name(), "x86_64");
        assert_eq!(Cpu::Arm.dir_name(), "arm");
    }
}
