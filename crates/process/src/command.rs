//! Typed command descriptions
//!
//! A [`CommandSpec`] is a plain value: program, arguments, working directory
//! and extra environment. It is validated before anything is spawned and can
//! be rendered as a shell line so a failing command can be rerun by hand.

use crate::{Error, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// An external command to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    env: BTreeMap<String, String>,
}

impl CommandSpec {
    /// Start describing a command that runs `program`
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            current_dir: None,
            env: BTreeMap::new(),
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Run the command in `dir`
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Set an environment variable for the command
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Program to execute
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments, in order
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Working directory override
    #[must_use]
    pub fn get_current_dir(&self) -> Option<&Path> {
        self.current_dir.as_deref()
    }

    /// Check the command can be passed to the OS unchanged
    pub fn validate(&self) -> Result<()> {
        let program = self.program.to_string_lossy();
        if program.trim().is_empty() {
            return Err(Error::invalid_command("program is empty"));
        }
        if program.contains('\0') {
            return Err(Error::invalid_command("program contains a NUL byte"));
        }
        if let Some(arg) = self.args.iter().find(|a| a.contains('\0')) {
            return Err(Error::invalid_command(format!(
                "argument {arg:?} contains a NUL byte"
            )));
        }
        for (key, value) in &self.env {
            if key.is_empty() || key.contains('=') || key.contains('\0') {
                return Err(Error::invalid_command(format!(
                    "invalid environment variable name {key:?}"
                )));
            }
            if value.contains('\0') {
                return Err(Error::invalid_command(format!(
                    "environment variable {key} contains a NUL byte"
                )));
            }
        }
        Ok(())
    }

    /// Render as a single shell line, quoting where needed
    #[must_use]
    pub fn display(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(shell_quote(&self.program.to_string_lossy()));
        parts.extend(self.args.iter().map(|a| shell_quote(a)));
        parts.join(" ")
    }

    pub(crate) fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }
        cmd.envs(&self.env);
        cmd
    }
}

fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s.bytes().all(|b| {
            b.is_ascii_alphanumeric() || matches!(b, b'_' | b'-' | b'.' | b'/' | b'=' | b':' | b',' | b'+' | b'@' | b'%')
        });
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}
