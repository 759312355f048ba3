//! Safelight build server
//!
//! Library half of the `safelight` binary: configuration layering, tracing
//! setup, the command line and the axum HTTP boundary in front of the
//! [`safelight_builder::BuildCoordinator`].

pub mod cli;
pub mod commands;
pub mod config;
mod error;
pub mod server;
pub mod tracing;

pub use config::{ConfigOverrides, LocatorKind, ServerConfig};
pub use error::{EXIT_BUILD, EXIT_CONFIG, EXIT_OK, Error, Result};
