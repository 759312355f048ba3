//! Command line definition

use crate::config::ConfigOverrides;
use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use safelight_artifacts::SignaturePolicy;
use std::path::PathBuf;

/// Main CLI entry point for safelight.
///
/// Builds image filters on demand through an external generator and serves
/// the cached artifacts over HTTP.
#[derive(Parser, Debug)]
#[command(name = "safelight")]
#[command(about = "On-demand filter build server with an in-memory artifact cache")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Logging verbosity level.
    #[arg(
        short = 'L',
        long,
        global = true,
        default_value = "info",
        value_enum,
        env = "SAFELIGHT_LOG_LEVEL"
    )]
    pub log_level: LogLevel,

    /// Log output format.
    #[arg(
        long,
        global = true,
        default_value = "compact",
        value_enum,
        env = "SAFELIGHT_LOG_FORMAT"
    )]
    pub log_format: TracingFormat,

    /// TOML configuration file; flags and environment override its values.
    #[arg(short, long, global = true, env = "SAFELIGHT_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Inputs identifying one build
#[derive(Debug, Clone, clap::Args)]
pub struct BuildTarget {
    /// Filter function name, e.g. `demo`
    pub function_name: String,

    /// Generator source, e.g. `generators/demo_generator.cpp`
    pub path_to_gen: String,

    /// Target identifier, e.g. `x86-64-nacl-sse41`
    pub target: String,

    /// Extra `key=value` generator argument (repeatable)
    #[arg(long = "gen-arg", value_name = "KEY=VALUE")]
    pub generator_args: Vec<String>,
}

/// Available CLI subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the HTTP build server.
    Serve {
        /// Settings overriding the configuration file
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Build one filter and write its artifacts to a directory.
    Build {
        /// What to build
        #[command(flatten)]
        build: BuildTarget,

        /// Directory receiving `safelight_<sig>_<target>.<ext>` files
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Settings overriding the configuration file
        #[command(flatten)]
        overrides: ConfigOverrides,
    },

    /// Print the signature a build would be cached under.
    Signature {
        /// What to sign
        #[command(flatten)]
        build: BuildTarget,

        /// Signature composition (defaults to the configured policy)
        #[arg(long)]
        policy: Option<SignaturePolicy>,
    },
}

/// Parse the process arguments
#[must_use]
pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_serve_with_overrides() {
        let cli = Cli::try_parse_from([
            "safelight",
            "--log-format",
            "json",
            "serve",
            "--port",
            "8080",
            "--cache-size",
            "4",
        ])
        .unwrap();
        assert_eq!(cli.log_format, TracingFormat::Json);
        let Commands::Serve { overrides } = cli.command else {
            panic!("expected serve");
        };
        assert_eq!(overrides.port, Some(8080));
        assert_eq!(overrides.cache_size, Some(4));
    }

    #[test]
    fn test_parse_build() {
        let cli = Cli::try_parse_from([
            "safelight",
            "build",
            "demo",
            "generators/demo_generator.cpp",
            "arm-32-nacl",
            "--gen-arg",
            "vectorize=true",
            "--out",
            "/tmp/out",
        ])
        .unwrap();
        let Commands::Build { build, out, .. } = cli.command else {
            panic!("expected build");
        };
        assert_eq!(build.function_name, "demo");
        assert_eq!(build.target, "arm-32-nacl");
        assert_eq!(build.generator_args, ["vectorize=true"]);
        assert_eq!(out, PathBuf::from("/tmp/out"));
    }

    #[test]
    fn test_parse_signature_policy() {
        let cli = Cli::try_parse_from([
            "safelight",
            "signature",
            "demo",
            "gen.cpp",
            "arm-32-nacl",
            "--policy",
            "name-source-and-args",
        ])
        .unwrap();
        let Commands::Signature { policy, .. } = cli.command else {
            panic!("expected signature");
        };
        assert_eq!(policy, Some(SignaturePolicy::NameSourceAndArgs));
    }
}
