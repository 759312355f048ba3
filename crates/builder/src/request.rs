//! Build requests and the generator invocation they turn into

use crate::{Error, Result};
use safelight_artifacts::{SignatureInputs, Target};
use safelight_process::CommandSpec;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Prefix of every internal build name and artifact file name
pub const BUILD_NAME_PREFIX: &str = "safelight_";

/// One request to build a filter for a target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRequest {
    /// Filter function name, e.g. `demo`
    pub function_name: String,
    /// Generator source location, e.g. `generators/demo_generator.cpp`
    pub generator_source: String,
    /// Target identifier, e.g. `x86-64-nacl-sse41`
    pub target: String,
    /// Extra `key=value` arguments forwarded to the generator
    pub generator_args: Vec<String>,
}

impl BuildRequest {
    /// Create a request without extra generator arguments
    #[must_use]
    pub fn new(
        function_name: impl Into<String>,
        generator_source: impl Into<String>,
        target: impl Into<String>,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            generator_source: generator_source.into(),
            target: target.into(),
            generator_args: Vec::new(),
        }
    }

    /// Add extra generator arguments
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.generator_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Internal build name handed to the generator, e.g. `safelight_demo`
    #[must_use]
    pub fn build_name(&self) -> String {
        format!("{BUILD_NAME_PREFIX}{}", self.function_name)
    }

    /// Inputs the signature is computed from
    #[must_use]
    pub fn signature_inputs(&self) -> SignatureInputs<'_> {
        SignatureInputs {
            function_name: &self.function_name,
            generator_source: &self.generator_source,
            generator_args: &self.generator_args,
        }
    }

    /// Validate every field and parse the target
    ///
    /// Nothing derived from a request reaches a command line before this
    /// succeeds.
    pub fn validate(&self) -> Result<Target> {
        let target = Target::parse(&self.target)?;

        let name = &self.function_name;
        let name_ok = name
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
            && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !name_ok {
            return Err(Error::invalid_request(format!(
                "function name {name:?} must be an identifier"
            )));
        }

        let source = &self.generator_source;
        if source.trim().is_empty() {
            return Err(Error::invalid_request("generator source path is empty"));
        }
        if source.starts_with('-') || source.contains(['\0', '\n', '\r']) {
            return Err(Error::invalid_request(format!(
                "generator source path {source:?} is not a plain path"
            )));
        }

        for arg in &self.generator_args {
            let (key, _) = arg.split_once('=').ok_or_else(|| {
                Error::invalid_request(format!("generator argument {arg:?} is not key=value"))
            })?;
            if key.is_empty() || key.starts_with('-') || arg.contains(['\0', '\n', '\r']) {
                return Err(Error::invalid_request(format!(
                    "generator argument {arg:?} is malformed"
                )));
            }
            if key == "target" {
                return Err(Error::invalid_request(
                    "the target is set by the request, not a generator argument",
                ));
            }
        }

        Ok(target)
    }
}

/// How to launch the external generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorConfig {
    /// Generator executable, e.g. `$SAFELIGHT_DIR/buildSafelightGen.sh`
    pub program: PathBuf,
    /// Working directory for generator runs; relative artifact paths resolve here
    pub work_dir: Option<PathBuf>,
    /// Extra environment for generator runs
    pub env: BTreeMap<String, String>,
}

impl GeneratorConfig {
    /// Generator at `program`, run in the server's working directory
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            work_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// Run the generator in `dir`
    #[must_use]
    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for generator runs
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Command for one validated request
    ///
    /// `<program> safelight_<name> <source> target=<target> [args...]`
    #[must_use]
    pub fn command(&self, request: &BuildRequest, target: &Target) -> CommandSpec {
        let mut spec = CommandSpec::new(&self.program)
            .arg(request.build_name())
            .arg(request.generator_source.as_str())
            .arg(format!("target={target}"))
            .args(request.generator_args.iter().cloned());
        if let Some(dir) = &self.work_dir {
            spec = spec.current_dir(dir);
        }
        for (key, value) in &self.env {
            spec = spec.env(key.as_str(), value.as_str());
        }
        spec
    }

    /// Resolve an artifact path printed by the generator
    #[must_use]
    pub fn resolve(&self, path: &Path) -> PathBuf {
        match &self.work_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BuildRequest {
        BuildRequest::new("demo", "generators/demo_generator.cpp", "x86-64-nacl-sse41")
    }

    #[test]
    fn test_valid_request() {
        let target = request().validate().unwrap();
        assert_eq!(target.as_str(), "x86-64-nacl-sse41");
        assert_eq!(request().build_name(), "safelight_demo");
    }

    #[test]
    fn test_malformed_target_rejected() {
        let mut req = request();
        req.target = "foo-bar".to_string();
        assert!(req.validate().unwrap_err().is_malformed_target());
    }

    #[test]
    fn test_function_name_must_be_identifier() {
        for bad in ["", "1demo", "de mo", "demo;rm", "../demo"] {
            let mut req = request();
            req.function_name = bad.to_string();
            assert!(
                matches!(req.validate(), Err(Error::InvalidRequest { .. })),
                "{bad:?} accepted"
            );
        }
    }

    #[test]
    fn test_generator_source_must_be_plain_path() {
        for bad in ["", "  ", "--help", "a\nb"] {
            let mut req = request();
            req.generator_source = bad.to_string();
            assert!(req.validate().is_err(), "{bad:?} accepted");
        }
    }

    #[test]
    fn test_generator_args_must_be_key_value() {
        assert!(request().with_args(["vectorize=true"]).validate().is_ok());
        assert!(request().with_args(["vectorize"]).validate().is_err());
        assert!(request().with_args(["=1"]).validate().is_err());
        assert!(request().with_args(["--x=1"]).validate().is_err());
        assert!(request().with_args(["target=arm-32-nacl"]).validate().is_err());
    }

    #[test]
    fn test_generator_command_layout() {
        let req = request().with_args(["vectorize=true"]);
        let target = req.validate().unwrap();
        let config = GeneratorConfig::new("/opt/safelight/buildSafelightGen.sh")
            .with_work_dir("/tmp/safelight")
            .with_env("HALIDE_DIR", "/opt/halide");
        let spec = config.command(&req, &target);

        assert_eq!(
            spec.get_args(),
            [
                "safelight_demo",
                "generators/demo_generator.cpp",
                "target=x86-64-nacl-sse41",
                "vectorize=true"
            ]
        );
        assert_eq!(spec.get_current_dir(), Some(Path::new("/tmp/safelight")));
        assert!(spec.validate().is_ok());
    }

    #[test]
    fn test_resolve_relative_paths_against_work_dir() {
        let config = GeneratorConfig::new("gen").with_work_dir("/work");
        assert_eq!(
            config.resolve(Path::new("out/safelight_demo.s")),
            PathBuf::from("/work/out/safelight_demo.s")
        );
        assert_eq!(
            config.resolve(Path::new("/abs/safelight_demo.s")),
            PathBuf::from("/abs/safelight_demo.s")
        );
        let no_dir = GeneratorConfig::new("gen");
        assert_eq!(
            no_dir.resolve(Path::new("out/x.s")),
            PathBuf::from("out/x.s")
        );
    }
}
