//! Finding the files a generator run produced
//!
//! The coordinator only sees the [`ArtifactLocator`] trait. Two adapters are
//! provided: [`StdoutScanner`] recovers paths from the lines the generator
//! prints, and [`OutputLayout`] relies on a fixed output directory instead.

use regex::Regex;
use safelight_artifacts::ArtifactKind;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Paths reported for each artifact kind of one build
pub type LocatedArtifacts = BTreeMap<ArtifactKind, PathBuf>;

/// Maps a finished generator run to the files it wrote
pub trait ArtifactLocator: Send + Sync + fmt::Debug {
    /// Locate artifacts for `build_name` (e.g. `safelight_demo`)
    ///
    /// `output` is the generator's captured standard output. Kinds that are
    /// not found are simply absent from the result.
    fn locate(&self, build_name: &str, output: &str) -> LocatedArtifacts;
}

/// Scans generator output for lines ending in `.../<build_name>.<ext>`
///
/// Matching is line based and tolerant of extraneous output. Each kind is
/// matched independently; when a kind is printed more than once the last
/// line wins.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutScanner;

impl StdoutScanner {
    fn pattern(build_name: &str, kind: ArtifactKind) -> Option<Regex> {
        // The path is the last whitespace-free token on the line
        let pattern = format!(
            r"(?:^|\s)((?:\S*/)?{}\.{})\s*$",
            regex::escape(build_name),
            regex::escape(kind.extension())
        );
        match Regex::new(&pattern) {
            Ok(re) => Some(re),
            Err(e) => {
                tracing::warn!(%build_name, %kind, error = %e, "Unusable artifact pattern");
                None
            }
        }
    }
}

impl ArtifactLocator for StdoutScanner {
    fn locate(&self, build_name: &str, output: &str) -> LocatedArtifacts {
        let mut found = LocatedArtifacts::new();
        for kind in ArtifactKind::FILE_KINDS {
            let Some(re) = Self::pattern(build_name, kind) else {
                continue;
            };
            let last = output
                .lines()
                .filter_map(|line| re.captures(line))
                .filter_map(|caps| caps.get(1))
                .last();
            if let Some(m) = last {
                tracing::debug!(%kind, path = m.as_str(), "Located artifact in generator output");
                found.insert(kind, PathBuf::from(m.as_str()));
            }
        }
        found
    }
}

/// Fixed output convention: `<dir>/<build_name>.<ext>` for every kind
///
/// The generator's output text is ignored; whether each file exists is
/// checked when the coordinator loads it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLayout {
    dir: PathBuf,
}

impl OutputLayout {
    /// Layout rooted at `dir`
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Directory the generator writes into
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ArtifactLocator for OutputLayout {
    fn locate(&self, build_name: &str, _output: &str) -> LocatedArtifacts {
        ArtifactKind::FILE_KINDS
            .into_iter()
            .map(|kind| {
                let path = self.dir.join(format!("{build_name}.{}", kind.extension()));
                (kind, path)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const OUTPUT: &str = "\
Compiling generators/demo_generator.cpp
wrote out/safelight_demo.nexe
out/safelight_demo.s
  Lowered statement: /tmp/build/out/safelight_demo.stmt
report at out/safelight_demo.html
some noise mentioning safelight_demo.nexe.bak
";

    #[test]
    fn test_scanner_finds_every_kind() {
        let found = StdoutScanner.locate("safelight_demo", OUTPUT);
        assert_eq!(found.len(), 4);
        assert_eq!(
            found[&ArtifactKind::Binary],
            PathBuf::from("out/safelight_demo.nexe")
        );
        assert_eq!(
            found[&ArtifactKind::Assembly],
            PathBuf::from("out/safelight_demo.s")
        );
        assert_eq!(
            found[&ArtifactKind::IntermediateRepresentation],
            PathBuf::from("/tmp/build/out/safelight_demo.stmt")
        );
        assert_eq!(
            found[&ArtifactKind::Report],
            PathBuf::from("out/safelight_demo.html")
        );
    }

    #[test]
    fn test_scanner_last_match_wins() {
        let output = "a/safelight_demo.s\nb/safelight_demo.s\n";
        let found = StdoutScanner.locate("safelight_demo", output);
        assert_eq!(found[&ArtifactKind::Assembly], PathBuf::from("b/safelight_demo.s"));
    }

    #[test]
    fn test_scanner_ignores_other_builds() {
        let output = "out/safelight_other.nexe\nout/safelight_demo2.s\nout/xsafelight_demo.html\n";
        assert!(StdoutScanner.locate("safelight_demo", output).is_empty());
    }

    #[test]
    fn test_scanner_escapes_build_name() {
        // A dot in the name must not act as a wildcard
        let output = "out/safelight_aXb.nexe\n";
        assert!(StdoutScanner.locate("safelight_a.b", output).is_empty());
    }

    #[test]
    fn test_scanner_handles_crlf_output() {
        let output = "out/safelight_demo.nexe\r\n";
        let found = StdoutScanner.locate("safelight_demo", output);
        assert_eq!(
            found[&ArtifactKind::Binary],
            PathBuf::from("out/safelight_demo.nexe")
        );
    }

    #[test]
    fn test_output_layout_ignores_output() {
        let layout = OutputLayout::new("/srv/safelight/out");
        let found = layout.locate("safelight_demo", "");
        assert_eq!(found.len(), 4);
        assert_eq!(
            found[&ArtifactKind::Report],
            PathBuf::from("/srv/safelight/out/safelight_demo.html")
        );
        assert!(!found.contains_key(&ArtifactKind::Manifest));
    }
}
