//! Subcommand implementations

use crate::cli::{BuildTarget, Cli, Commands};
use crate::config::{ConfigOverrides, ServerConfig};
use crate::server::{self, ensure_buildable_target};
use crate::{Error, Result};
use safelight_artifacts::{ArtifactBundle, SignaturePolicy, artifact_url};
use safelight_builder::{BuildLog, BuildRequest};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

/// Run the parsed command line to completion
///
/// # Errors
///
/// Returns the configuration, build or server error that stopped the command
pub async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config;
    match cli.command {
        Commands::Serve { overrides } => {
            let config = resolve_config(config_path.as_deref(), overrides)?;
            let shutdown = CancellationToken::new();
            tokio::spawn(shutdown_on_ctrl_c(shutdown.clone()));
            server::serve(&config, shutdown).await
        }
        Commands::Build {
            build,
            out,
            overrides,
        } => {
            let config = resolve_config(config_path.as_deref(), overrides)?;
            let written = build_once(&config, build, &out).await?;
            for path in written {
                tracing::info!(path = %path.display(), "Wrote artifact");
            }
            Ok(())
        }
        Commands::Signature { build, policy } => {
            let policy = match policy {
                Some(policy) => policy,
                None => ServerConfig::load(config_path.as_deref())?.signature_policy,
            };
            let signature = signature_of(policy, build);
            #[allow(clippy::print_stdout)]
            {
                println!("{signature}");
            }
            Ok(())
        }
    }
}

fn resolve_config(path: Option<&Path>, overrides: ConfigOverrides) -> Result<ServerConfig> {
    let mut config = ServerConfig::load(path)?;
    config.apply(overrides);
    config.validate()?;
    Ok(config)
}

fn request_for(build: BuildTarget) -> BuildRequest {
    BuildRequest::new(build.function_name, build.path_to_gen, build.target)
        .with_args(build.generator_args)
}

/// Signature a build would be cached under
#[must_use]
pub fn signature_of(policy: SignaturePolicy, build: BuildTarget) -> String {
    policy
        .compute(&request_for(build).signature_inputs())
        .to_string()
}

/// Build once through a fresh coordinator and write every artifact to `out`
///
/// The signature is printed on stdout; the generator's output is logged.
///
/// # Errors
///
/// Returns the build error, or an I/O error if an artifact cannot be written
pub async fn build_once(
    config: &ServerConfig,
    build: BuildTarget,
    out: &Path,
) -> Result<Vec<PathBuf>> {
    let coordinator = config.coordinator()?;
    let request = request_for(build);
    ensure_buildable_target(&request.target)?;

    let log = BuildLog::new();
    let bundle = coordinator.build_or_reuse(&request, Some(&log)).await?;
    let written = write_bundle(&bundle, out).await?;

    #[allow(clippy::print_stdout)]
    {
        println!("{}", bundle.signature());
    }
    Ok(written)
}

async fn write_bundle(bundle: &ArtifactBundle, out: &Path) -> Result<Vec<PathBuf>> {
    tokio::fs::create_dir_all(out)
        .await
        .map_err(|e| Error::io("create output directory", out, e))?;

    let mut written = Vec::with_capacity(bundle.len());
    for (kind, data) in bundle.iter() {
        // Same file names the server uses in its artifact URLs
        let url = artifact_url("", bundle.signature(), bundle.target(), kind);
        let path = out.join(url.trim_start_matches('/'));
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| Error::io("write artifact", &path, e))?;
        written.push(path);
    }
    Ok(written)
}

async fn shutdown_on_ctrl_c(shutdown: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl-C, shutting down"),
        Err(e) => tracing::warn!(error = %e, "Failed to listen for Ctrl-C"),
    }
    shutdown.cancel();
}
