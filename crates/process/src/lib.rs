//! Subprocess execution for safelight
//!
//! This crate runs external tools (the filter generator) on behalf of the
//! build coordinator:
//! - Typed, validated command descriptions
//! - Line-by-line output capture with a real-time log sink
//! - A hard deadline per invocation, with forced termination on overrun
//!
//! # Guarantees
//!
//! [`ProcessRunner`] never returns before the child has been reaped, so a
//! timed-out build leaves neither zombies nor orphaned helper processes
//! behind. Output captured before a failure is kept in the error for
//! diagnostics.

mod command;
mod error;
mod runner;
mod sink;

pub use command::CommandSpec;
pub use error::{Error, Result};
pub use runner::{OutputStream, ProcessRun, ProcessRunner, Termination};
pub use sink::LogSink;
