//! Artifact bundles: the complete output of one build

use crate::{Signature, Target};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Kind of a build artifact, identified on the wire by its file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ArtifactKind {
    /// Sandboxed executable (`.nexe`)
    Binary,
    /// Assembly listing (`.s`)
    Assembly,
    /// Lowered intermediate representation (`.stmt`)
    IntermediateRepresentation,
    /// Human-readable HTML report (`.html`)
    Report,
    /// Load manifest synthesized by the coordinator (`.nmf`)
    Manifest,
}

impl ArtifactKind {
    /// Kinds the generator writes to disk, in reporting order
    pub const FILE_KINDS: [Self; 4] = [
        Self::Binary,
        Self::Assembly,
        Self::IntermediateRepresentation,
        Self::Report,
    ];

    /// File extension, without the dot
    #[must_use]
    pub const fn extension(self) -> &'static str {
        match self {
            Self::Binary => "nexe",
            Self::Assembly => "s",
            Self::IntermediateRepresentation => "stmt",
            Self::Report => "html",
            Self::Manifest => "nmf",
        }
    }

    /// Look up a kind by extension; unknown extensions are `None`
    #[must_use]
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "nexe" => Some(Self::Binary),
            "s" => Some(Self::Assembly),
            "stmt" => Some(Self::IntermediateRepresentation),
            "html" => Some(Self::Report),
            "nmf" => Some(Self::Manifest),
            _ => None,
        }
    }

    /// Short human label, e.g. `binary`
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Binary => "binary",
            Self::Assembly => "assembly",
            Self::IntermediateRepresentation => "intermediate-representation",
            Self::Report => "report",
            Self::Manifest => "manifest",
        }
    }

    /// MIME type used when serving this kind
    #[must_use]
    pub const fn content_type(self) -> &'static str {
        match self {
            Self::Binary => "application/x-nacl",
            Self::Assembly | Self::IntermediateRepresentation => "text/plain; charset=utf-8",
            Self::Report => "text/html; charset=utf-8",
            Self::Manifest => "application/json",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// All artifacts of one completed build for one target
///
/// Bundles are assembled by the build coordinator and become immutable once
/// published to the cache, where they are shared behind an `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactBundle {
    signature: Signature,
    target: Target,
    artifacts: BTreeMap<ArtifactKind, Bytes>,
}

impl ArtifactBundle {
    /// Create an empty bundle for a signature and target
    #[must_use]
    pub fn new(signature: Signature, target: Target) -> Self {
        Self {
            signature,
            target,
            artifacts: BTreeMap::new(),
        }
    }

    /// Add or replace one artifact
    pub fn insert(&mut self, kind: ArtifactKind, data: impl Into<Bytes>) {
        self.artifacts.insert(kind, data.into());
    }

    /// Signature of the build
    #[must_use]
    pub const fn signature(&self) -> &Signature {
        &self.signature
    }

    /// Target the build was produced for
    #[must_use]
    pub const fn target(&self) -> &Target {
        &self.target
    }

    /// Content of one artifact, if present
    #[must_use]
    pub fn get(&self, kind: ArtifactKind) -> Option<&Bytes> {
        self.artifacts.get(&kind)
    }

    /// Kinds present in this bundle
    pub fn kinds(&self) -> impl Iterator<Item = ArtifactKind> + '_ {
        self.artifacts.keys().copied()
    }

    /// Iterate over all artifacts
    pub fn iter(&self) -> impl Iterator<Item = (ArtifactKind, &Bytes)> {
        self.artifacts.iter().map(|(k, v)| (*k, v))
    }

    /// Number of artifacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    /// True if the bundle holds no artifacts
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }

    /// Sum of all artifact sizes in bytes
    #[must_use]
    pub fn total_bytes(&self) -> usize {
        self.artifacts.values().map(Bytes::len).sum()
    }
}
