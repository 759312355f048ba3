//! Build-or-reuse coordination
//!
//! [`BuildCoordinator`] ties the pieces together: it computes the signature
//! of a request, answers from the [`ArtifactCache`] when it can, and
//! otherwise runs the generator, loads what it produced and publishes the
//! resulting bundle.
//!
//! At most one build per (signature, target) is in flight. The first request
//! for a key becomes the leader and registers a `watch` channel; requests
//! arriving while it runs wait on that channel instead of starting a second
//! generator. The build itself runs on its own task, so a leader whose
//! request is dropped does not take the shared build down with it. If that
//! task ends without publishing, a waiting request takes over.

use crate::locator::{ArtifactLocator, StdoutScanner};
use crate::request::{BuildRequest, GeneratorConfig};
use crate::{Error, Result};
use bytes::Bytes;
use parking_lot::Mutex;
use safelight_artifacts::{
    ArtifactBundle, ArtifactCache, ArtifactKind, CacheKey, Manifest, Signature, SignaturePolicy,
    Target,
};
use safelight_process::{LogSink, ProcessRunner};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

/// Default number of bundles kept in memory
pub const DEFAULT_CACHE_CAPACITY: usize = 32;

/// Default deadline for one generator run
pub const DEFAULT_BUILD_TIMEOUT: Duration = Duration::from_secs(300);

type Outcome = Result<Arc<ArtifactBundle>>;

/// Configuration builder for [`BuildCoordinator`]
#[derive(Debug)]
pub struct BuildCoordinatorBuilder {
    generator: GeneratorConfig,
    cache: Option<Arc<ArtifactCache>>,
    cache_capacity: usize,
    timeout: Duration,
    locator: Arc<dyn ArtifactLocator>,
    policy: SignaturePolicy,
    manifest_url_prefix: String,
}

impl BuildCoordinatorBuilder {
    /// Builder with default settings for the given generator
    #[must_use]
    pub fn new(generator: GeneratorConfig) -> Self {
        Self {
            generator,
            cache: None,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            timeout: DEFAULT_BUILD_TIMEOUT,
            locator: Arc::new(StdoutScanner),
            policy: SignaturePolicy::default(),
            manifest_url_prefix: "/".to_string(),
        }
    }

    /// Number of bundles to keep (ignored when a shared cache is supplied)
    #[must_use]
    pub const fn cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Use an existing cache
    #[must_use]
    pub fn cache(mut self, cache: Arc<ArtifactCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Deadline for each generator run
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// How generator outputs are found
    #[must_use]
    pub fn locator(mut self, locator: impl ArtifactLocator + 'static) -> Self {
        self.locator = Arc::new(locator);
        self
    }

    /// Which request fields make up the signature
    #[must_use]
    pub const fn signature_policy(mut self, policy: SignaturePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// URL prefix used for the binary in synthesized manifests
    #[must_use]
    pub fn manifest_url_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.manifest_url_prefix = prefix.into();
        self
    }

    /// Build the coordinator
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the cache capacity or the timeout
    /// is zero
    pub fn build(self) -> Result<BuildCoordinator> {
        if self.timeout.is_zero() {
            return Err(safelight_artifacts::Error::configuration(
                "Build timeout must be greater than zero",
            )
            .into());
        }
        let cache = match self.cache {
            Some(cache) => cache,
            None => Arc::new(ArtifactCache::new(self.cache_capacity)?),
        };

        Ok(BuildCoordinator {
            shared: Arc::new(Shared {
                cache,
                runner: ProcessRunner::new(self.timeout),
                generator: self.generator,
                locator: self.locator,
                policy: self.policy,
                manifest_url_prefix: self.manifest_url_prefix,
                in_flight: Mutex::new(HashMap::new()),
                generator_runs: AtomicU64::new(0),
            }),
        })
    }
}

/// Turns build requests into cached artifact bundles
#[derive(Debug)]
pub struct BuildCoordinator {
    shared: Arc<Shared>,
}

/// State reachable from spawned build tasks
#[derive(Debug)]
struct Shared {
    cache: Arc<ArtifactCache>,
    runner: ProcessRunner,
    generator: GeneratorConfig,
    locator: Arc<dyn ArtifactLocator>,
    policy: SignaturePolicy,
    manifest_url_prefix: String,
    in_flight: Mutex<HashMap<CacheKey, watch::Receiver<Option<Outcome>>>>,
    generator_runs: AtomicU64,
}

enum Claim {
    Leader(Flight),
    Follower(watch::Receiver<Option<Outcome>>),
}

/// Leadership of one in-flight build; dropping it clears the table entry
struct Flight {
    shared: Arc<Shared>,
    key: CacheKey,
    tx: watch::Sender<Option<Outcome>>,
}

impl Flight {
    fn publish(self, outcome: Outcome) {
        self.tx.send_replace(Some(outcome));
    }
}

impl Drop for Flight {
    fn drop(&mut self) {
        self.shared.in_flight.lock().remove(&self.key);
    }
}

/// Carries log lines from a build task back to the request that started it
///
/// Sends never block; once the request is gone the lines are dropped.
struct ForwardingSink(mpsc::UnboundedSender<String>);

impl LogSink for ForwardingSink {
    fn append(&self, line: &str) {
        let _ = self.0.send(line.to_string());
    }
}

impl BuildCoordinator {
    /// Create a builder for the given generator
    #[must_use]
    pub fn builder(generator: GeneratorConfig) -> BuildCoordinatorBuilder {
        BuildCoordinatorBuilder::new(generator)
    }

    /// The artifact cache this coordinator publishes into
    #[must_use]
    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.shared.cache
    }

    /// Signature composition in use
    #[must_use]
    pub fn signature_policy(&self) -> SignaturePolicy {
        self.shared.policy
    }

    /// Deadline for each generator run
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.shared.runner.timeout()
    }

    /// Number of times the generator has been started
    #[must_use]
    pub fn generator_runs(&self) -> u64 {
        self.shared.generator_runs.load(Ordering::Relaxed)
    }

    /// Signature of a request under the configured policy
    #[must_use]
    pub fn signature(&self, request: &BuildRequest) -> Signature {
        self.shared.policy.compute(&request.signature_inputs())
    }

    /// Return the bundle for `request`, building it if it is not cached
    ///
    /// Generator output is forwarded line by line to `log`. A malformed
    /// request is rejected before anything is spawned. Failed builds are
    /// never cached; the next identical request builds again.
    ///
    /// Dropping the returned future does not cancel a build that was
    /// started for it: the build finishes on its own task and its result
    /// is cached for the next request.
    ///
    /// # Errors
    ///
    /// Returns the validation, process or artifact error that stopped the
    /// build. Requests that waited on a failed build receive the same error.
    #[tracing::instrument(
        name = "build_or_reuse",
        skip_all,
        fields(function = %request.function_name, target = %request.target)
    )]
    pub async fn build_or_reuse(
        &self,
        request: &BuildRequest,
        log: Option<&dyn LogSink>,
    ) -> Result<Arc<ArtifactBundle>> {
        let target = request.validate()?;
        let signature = self.signature(request);
        let key = CacheKey::new(signature.clone(), target.clone());

        loop {
            if let Some(bundle) = self.shared.cache.get(&signature, &target) {
                tracing::debug!(signature = signature.short(), "Cache hit");
                if let Some(log) = log {
                    log.append(&format!("Reusing cached build {key}"));
                }
                return Ok(bundle);
            }

            match Shared::claim(&self.shared, &key) {
                Claim::Leader(flight) => return self.lead(flight, request, log).await,
                Claim::Follower(mut rx) => {
                    tracing::debug!(signature = signature.short(), "Waiting for in-flight build");
                    if let Some(log) = log {
                        log.append(&format!("Waiting for in-flight build {key}"));
                    }
                    let outcome = rx
                        .wait_for(Option::is_some)
                        .await
                        .ok()
                        .and_then(|published| (*published).clone());
                    match outcome {
                        Some(outcome) => return outcome,
                        None => {
                            tracing::debug!(
                                signature = signature.short(),
                                "In-flight build was abandoned, retrying"
                            );
                        }
                    }
                }
            }
        }
    }

    /// Bytes of one cached artifact, without ever triggering a build
    #[must_use]
    pub fn fetch(
        &self,
        signature: &Signature,
        target: &Target,
        kind: ArtifactKind,
    ) -> Option<Bytes> {
        self.shared.cache.get(signature, target)?.get(kind).cloned()
    }

    /// Run the build on its own task and relay its log lines to `log`
    async fn lead(
        &self,
        flight: Flight,
        request: &BuildRequest,
        log: Option<&dyn LogSink>,
    ) -> Outcome {
        let (lines_tx, mut lines) = mpsc::unbounded_channel();
        let shared = Arc::clone(&self.shared);
        let request = request.clone();
        let task = tokio::spawn(
            async move {
                let sink = ForwardingSink(lines_tx);
                shared.lead(flight, &request, &sink).await
            }
            .instrument(tracing::Span::current()),
        );

        // The channel closes when the task drops its sink
        while let Some(line) = lines.recv().await {
            if let Some(log) = log {
                log.append(&line);
            }
        }

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Build task failed");
                Err(Error::BuildAborted {
                    message: e.to_string(),
                })
            }
        }
    }
}

impl Shared {
    fn claim(this: &Arc<Self>, key: &CacheKey) -> Claim {
        let mut in_flight = this.in_flight.lock();
        if let Some(rx) = in_flight.get(key) {
            return Claim::Follower(rx.clone());
        }
        let (tx, rx) = watch::channel(None);
        in_flight.insert(key.clone(), rx);
        Claim::Leader(Flight {
            shared: Arc::clone(this),
            key: key.clone(),
            tx,
        })
    }

    async fn lead(&self, flight: Flight, request: &BuildRequest, log: &dyn LogSink) -> Outcome {
        let CacheKey { signature, target } = flight.key.clone();
        // Another leader may have published between our cache miss and the claim
        let outcome = match self.cache.get(&signature, &target) {
            Some(bundle) => Ok(bundle),
            None => self
                .build(request, &signature, &target, log)
                .await
                .map(|bundle| self.cache.add(bundle)),
        };
        if let Err(e) = &outcome {
            tracing::warn!(signature = signature.short(), error = %e, "Build failed");
        }
        flight.publish(outcome.clone());
        outcome
    }

    async fn build(
        &self,
        request: &BuildRequest,
        signature: &Signature,
        target: &Target,
        log: &dyn LogSink,
    ) -> Result<ArtifactBundle> {
        let spec = self.generator.command(request, target);
        let command = spec.display();
        tracing::info!(
            signature = signature.short(),
            command = %command,
            "Running generator"
        );
        log.append(&format!("$ {command}"));

        self.generator_runs.fetch_add(1, Ordering::Relaxed);
        let output = self.runner.run_stdout(&spec, Some(log)).await?;

        let build_name = request.build_name();
        let located = self.locator.locate(&build_name, &output);
        if located.is_empty() {
            return Err(Error::NoArtifacts {
                build_name,
                command,
                output,
            });
        }

        let mut bundle = ArtifactBundle::new(signature.clone(), target.clone());
        let mut unreported: Option<ArtifactKind> = None;
        let mut absent: Option<(ArtifactKind, PathBuf)> = None;
        for kind in ArtifactKind::FILE_KINDS {
            let Some(reported) = located.get(&kind) else {
                unreported.get_or_insert(kind);
                continue;
            };
            let path = self.generator.resolve(reported);
            match tokio::fs::read(&path).await {
                Ok(data) => {
                    tracing::debug!(%kind, path = %path.display(), bytes = data.len(), "Loaded artifact");
                    bundle.insert(kind, data);
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    absent.get_or_insert((kind, path));
                }
                Err(e) => return Err(Error::artifact_read(kind, path, command, e)),
            }
        }

        // A reported path that does not exist says more than an unreported kind
        let missing = match (absent, unreported) {
            (Some((kind, path)), _) => Some((kind, Some(path))),
            (None, Some(kind)) if !bundle.is_empty() => Some((kind, None)),
            (None, Some(_)) => {
                return Err(Error::NoArtifacts {
                    build_name,
                    command,
                    output,
                });
            }
            (None, None) => None,
        };
        if let Some((kind, path)) = missing {
            return Err(Error::ArtifactMissing {
                kind,
                path: path.map(PathBuf::into_boxed_path),
                command,
                output,
            });
        }

        let manifest = Manifest::for_build(signature, target, &self.manifest_url_prefix);
        bundle.insert(ArtifactKind::Manifest, manifest.to_bytes()?);

        tracing::info!(
            signature = signature.short(),
            %target,
            artifacts = bundle.len(),
            bytes = bundle.total_bytes(),
            "Build complete"
        );
        log.append(&format!("Built {} artifacts for {target}", bundle.len()));
        Ok(bundle)
    }
}
