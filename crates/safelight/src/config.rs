//! Server configuration
//!
//! Values are layered: built-in defaults, then an optional TOML file, then
//! command line flags and `SAFELIGHT_*` environment variables.

use crate::{Error, Result};
use safelight_artifacts::SignaturePolicy;
use safelight_builder::{BuildCoordinator, GeneratorConfig, OutputLayout, StdoutScanner};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 6502;

/// Name of the generator script inside `$SAFELIGHT_DIR`
pub const GENERATOR_SCRIPT: &str = "buildSafelightGen.sh";

/// How the coordinator finds the files a generator wrote
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum LocatorKind {
    /// Scan the generator's output for printed artifact paths
    #[default]
    Scan,
    /// Read `<output_dir>/safelight_<name>.<ext>` without scanning
    Layout,
}

/// Complete server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// Address to listen on
    pub bind: IpAddr,
    /// Port to listen on
    pub port: u16,
    /// Number of artifact bundles kept in memory
    pub cache_size: usize,
    /// Deadline for one generator run, in seconds
    pub timeout_secs: u64,
    /// Working directory for generator runs
    pub temp_dir: PathBuf,
    /// Directory holding prebuilt per-CPU binaries
    pub prebuilt_nexe_dir: PathBuf,
    /// Generator executable
    pub generator: PathBuf,
    /// Extra environment for generator runs
    pub generator_env: BTreeMap<String, String>,
    /// Artifact locator strategy
    pub locator: LocatorKind,
    /// Directory read by the `layout` locator; defaults to `temp_dir`
    pub output_dir: Option<PathBuf>,
    /// Which request fields identify a build
    pub signature_policy: SignaturePolicy,
    /// URL prefix of artifact links in build manifests
    pub manifest_url_prefix: String,
    /// Number of recent build logs kept for `/buildlog/{id}`
    pub log_history: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let temp_dir = std::env::temp_dir();
        let safelight_dir = std::env::var_os("SAFELIGHT_DIR")
            .map_or_else(|| PathBuf::from("."), PathBuf::from);
        Self {
            bind: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: DEFAULT_PORT,
            cache_size: safelight_builder::DEFAULT_CACHE_CAPACITY,
            timeout_secs: safelight_builder::DEFAULT_BUILD_TIMEOUT.as_secs(),
            prebuilt_nexe_dir: temp_dir.join("safelightPrebuiltNexeDir"),
            temp_dir,
            generator: safelight_dir.join(GENERATOR_SCRIPT),
            generator_env: BTreeMap::new(),
            locator: LocatorKind::default(),
            output_dir: None,
            signature_policy: SignaturePolicy::default(),
            manifest_url_prefix: "/".to_string(),
            log_history: 16,
        }
    }
}

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default, clap::Args)]
pub struct ConfigOverrides {
    /// Address to listen on
    #[arg(long, env = "SAFELIGHT_BIND")]
    pub bind: Option<IpAddr>,

    /// Port to listen on
    #[arg(short, long, env = "SAFELIGHT_PORT")]
    pub port: Option<u16>,

    /// Number of artifact bundles kept in memory
    #[arg(long, env = "SAFELIGHT_CACHE_SIZE")]
    pub cache_size: Option<usize>,

    /// Deadline for one generator run, in seconds
    #[arg(long = "timeout", env = "SAFELIGHT_TIMEOUT")]
    pub timeout_secs: Option<u64>,

    /// Working directory for generator runs
    #[arg(long, env = "SAFELIGHT_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Directory holding prebuilt per-CPU binaries
    #[arg(long, env = "SAFELIGHT_PREBUILT_NEXE_DIR")]
    pub prebuilt_nexe_dir: Option<PathBuf>,

    /// Generator executable
    #[arg(long, env = "SAFELIGHT_GENERATOR")]
    pub generator: Option<PathBuf>,

    /// Artifact locator strategy
    #[arg(long, value_enum, env = "SAFELIGHT_LOCATOR")]
    pub locator: Option<LocatorKind>,

    /// Directory read by the `layout` locator
    #[arg(long, env = "SAFELIGHT_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Signature composition: `name-and-source` or `name-source-and-args`
    #[arg(long, env = "SAFELIGHT_SIGNATURE_POLICY")]
    pub signature_policy: Option<SignaturePolicy>,
}

impl ServerConfig {
    /// Parse a TOML document; missing keys keep their defaults
    ///
    /// # Errors
    ///
    /// Returns a configuration error for malformed TOML or unknown keys
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| {
            Error::config_with_help(
                format!("Invalid configuration file: {}", e.message()),
                "See the ServerConfig fields for accepted keys",
            )
        })
    }

    /// Defaults, overlaid with the TOML file at `path` when given
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let text =
            std::fs::read_to_string(path).map_err(|e| Error::io("read config", path, e))?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "Loaded configuration file");
        Ok(config)
    }

    /// Apply command line and environment overrides
    pub fn apply(&mut self, o: ConfigOverrides) {
        if let Some(v) = o.bind {
            self.bind = v;
        }
        if let Some(v) = o.port {
            self.port = v;
        }
        if let Some(v) = o.cache_size {
            self.cache_size = v;
        }
        if let Some(v) = o.timeout_secs {
            self.timeout_secs = v;
        }
        if let Some(v) = o.temp_dir {
            self.temp_dir = v;
        }
        if let Some(v) = o.prebuilt_nexe_dir {
            self.prebuilt_nexe_dir = v;
        }
        if let Some(v) = o.generator {
            self.generator = v;
        }
        if let Some(v) = o.locator {
            self.locator = v;
        }
        if o.output_dir.is_some() {
            self.output_dir = o.output_dir;
        }
        if let Some(v) = o.signature_policy {
            self.signature_policy = v;
        }
    }

    /// Reject values the server cannot run with
    ///
    /// # Errors
    ///
    /// Returns a configuration error naming the offending key
    pub fn validate(&self) -> Result<()> {
        if self.cache_size == 0 {
            return Err(Error::config("cache_size must be greater than zero"));
        }
        if self.timeout_secs == 0 {
            return Err(Error::config("timeout_secs must be greater than zero"));
        }
        if self.log_history == 0 {
            return Err(Error::config("log_history must be greater than zero"));
        }
        if self.generator.as_os_str().is_empty() {
            return Err(Error::config_with_help(
                "generator path is empty",
                "Set SAFELIGHT_DIR or pass --generator",
            ));
        }
        Ok(())
    }

    /// Generator deadline
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Address the HTTP server binds
    #[must_use]
    pub const fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }

    /// Directory the `layout` locator reads
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        self.output_dir.as_deref().unwrap_or(&self.temp_dir)
    }

    /// Generator invocation settings
    #[must_use]
    pub fn generator_config(&self) -> GeneratorConfig {
        self.generator_env.iter().fold(
            GeneratorConfig::new(&self.generator).with_work_dir(&self.temp_dir),
            |config, (key, value)| config.with_env(key.as_str(), value.as_str()),
        )
    }

    /// Coordinator configured from these settings
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid
    pub fn coordinator(&self) -> Result<BuildCoordinator> {
        self.validate()?;
        let builder = BuildCoordinator::builder(self.generator_config())
            .cache_capacity(self.cache_size)
            .timeout(self.timeout())
            .signature_policy(self.signature_policy)
            .manifest_url_prefix(self.manifest_url_prefix.as_str());
        let builder = match self.locator {
            LocatorKind::Scan => builder.locator(StdoutScanner),
            LocatorKind::Layout => builder.locator(OutputLayout::new(self.output_dir())),
        };
        Ok(builder.build()?)
    }
}
