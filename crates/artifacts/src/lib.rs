//! Build artifacts and the in-memory artifact cache for safelight
//!
//! This crate holds the data model shared by the build coordinator and the
//! HTTP boundary:
//! - Deterministic build signatures derived from a build's identifying inputs
//! - Validated target identifiers and their CPU labels
//! - Immutable artifact bundles (binary, assembly, IR, report, manifest)
//! - A fixed-capacity, thread-safe LRU cache of bundles
//! - Load manifests pointing clients at the right binary per CPU
//!
//! # Cache Keys
//!
//! A bundle is keyed by its signature *and* its target, since one signature
//! may be built for several targets.

mod error;
pub mod bundle;
pub mod cache;
pub mod manifest;
pub mod signature;
pub mod target;

// Re-export error types at crate root
pub use error::{Error, Result};

// Re-export main types
pub use bundle::{ArtifactBundle, ArtifactKind};
pub use cache::{ArtifactCache, CacheKey};
pub use manifest::{Manifest, PREBUILT_CPUS, ProgramEntry, artifact_url};
pub use signature::{Signature, SignatureInputs, SignaturePolicy};
pub use target::{Cpu, Target};
