//! Build coordination for safelight
//!
//! Given a request (function name, generator source, target) this crate
//! decides whether a cached artifact bundle can be reused, and otherwise
//! runs the external generator, collects the files it wrote and publishes a
//! complete bundle to the cache.
//!
//! # Example
//!
//! ```no_run
//! use safelight_builder::{BuildCoordinator, BuildLog, BuildRequest, GeneratorConfig};
//!
//! # async fn example() -> safelight_builder::Result<()> {
//! let coordinator = BuildCoordinator::builder(GeneratorConfig::new("./buildSafelightGen.sh"))
//!     .cache_capacity(32)
//!     .build()?;
//!
//! let log = BuildLog::new();
//! let request = BuildRequest::new("demo", "generators/demo_generator.cpp", "x86-64-nacl-sse41");
//! let bundle = coordinator.build_or_reuse(&request, Some(&log)).await?;
//! println!("{} artifacts, signature {}", bundle.len(), bundle.signature());
//! # Ok(())
//! # }
//! ```

mod coordinator;
mod error;
mod locator;
mod log;
mod request;

pub use coordinator::{
    BuildCoordinator, BuildCoordinatorBuilder, DEFAULT_BUILD_TIMEOUT, DEFAULT_CACHE_CAPACITY,
};
pub use error::{Error, Result};
pub use locator::{ArtifactLocator, LocatedArtifacts, OutputLayout, StdoutScanner};
pub use log::BuildLog;
pub use request::{BUILD_NAME_PREFIX, BuildRequest, GeneratorConfig};
