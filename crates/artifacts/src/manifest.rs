//! NaCl load manifests (`.nmf`)
//!
//! A manifest tells the client where to fetch the binary for its CPU:
//!
//! ```json
//! {"files":{},"program":{"x86-64":{"url":"/safelight_<sig>_x86-64-nacl.nexe"}}}
//! ```

use crate::{ArtifactKind, Cpu, Error, Result, Signature, Target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// CPUs listed in manifests for prebuilt, non build-specific binaries
pub const PREBUILT_CPUS: [Cpu; 3] = [Cpu::X86_64, Cpu::X86_32, Cpu::Arm];

/// Location of the binary for one CPU
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    /// URL the client fetches the binary from
    pub url: String,
}

/// A load manifest document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Auxiliary files; always empty for safelight binaries
    pub files: BTreeMap<String, serde_json::Value>,
    /// Binary location per CPU label
    pub program: BTreeMap<String, ProgramEntry>,
}

impl Manifest {
    /// Manifest for one build: a single CPU entry pointing at the build's binary
    ///
    /// `url_prefix` is prepended to the artifact file name; `/` serves it from
    /// the server root.
    #[must_use]
    pub fn for_build(signature: &Signature, target: &Target, url_prefix: &str) -> Self {
        let mut manifest = Self::default();
        manifest.program.insert(
            target.cpu().label().to_string(),
            ProgramEntry {
                url: artifact_url(url_prefix, signature, target, ArtifactKind::Binary),
            },
        );
        manifest
    }

    /// Manifest for a prebuilt binary available for every CPU in [`PREBUILT_CPUS`]
    ///
    /// Binaries are expected at `<prebuilt_dir>/<cpu_dir>/<binary_name>.nexe`.
    #[must_use]
    pub fn prebuilt(prebuilt_dir: &str, binary_name: &str) -> Self {
        let dir = prebuilt_dir.trim_end_matches('/');
        let mut manifest = Self::default();
        for cpu in PREBUILT_CPUS {
            manifest.program.insert(
                cpu.label().to_string(),
                ProgramEntry {
                    url: format!("{dir}/{}/{binary_name}.nexe", cpu.dir_name()),
                },
            );
        }
        manifest
    }

    /// Compact JSON encoding
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self)
            .map_err(|e| Error::serialization(format!("Failed to serialize manifest: {e}")))
    }
}

/// URL path of one artifact of a build, e.g. `/safelight_<sig>_<target>.nexe`
#[must_use]
pub fn artifact_url(
    url_prefix: &str,
    signature: &Signature,
    target: &Target,
    kind: ArtifactKind,
) -> String {
    let sep = if url_prefix.ends_with('/') { "" } else { "/" };
    format!(
        "{url_prefix}{sep}safelight_{signature}_{target}.{}",
        kind.extension()
    )
}
