//! Host command execution.
//!
//! All mounting is delegated to the host's `mount`/`umount` utilities. Commands
//! are built as argument vectors and never pass through a shell.

use std::fmt;
use std::path::Path;
use std::process::Command;

use netvol_common::{NetvolError, NetvolResult};

const MASK: &str = "****";

/// A command line with secrets that must never be logged.
#[derive(Clone, Default)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
    secrets: Vec<String>,
}

impl CommandLine {
    /// Start a command line for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Append an argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append a path argument.
    #[must_use]
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    /// Register a value to be masked in every rendering of this command.
    #[must_use]
    pub fn secret(mut self, secret: impl Into<String>) -> Self {
        let secret = secret.into();
        if !secret.is_empty() {
            self.secrets.push(secret);
        }
        self
    }

    /// Program name.
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Raw, unredacted arguments.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Replace every registered secret in `text`.
    pub fn redact(&self, text: &str) -> String {
        self.secrets
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), MASK))
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        f.write_str(&self.redact(&line))
    }
}

impl fmt::Debug for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CommandLine").field(&self.to_string()).finish()
    }
}

/// Runs host commands.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion, returning its combined output.
    ///
    /// A non-zero exit status is an error carrying the redacted output.
    fn run(&self, command: &CommandLine) -> NetvolResult<String>;
}

/// [`CommandRunner`] backed by [`std::process::Command`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, command: &CommandLine) -> NetvolResult<String> {
        tracing::debug!(command = %command, "Executing");

        let output = Command::new(command.program())
            .args(command.args())
            .output()
            .map_err(|source| NetvolError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            let captured = command.redact(combined.trim());
            tracing::warn!(command = %command, output = %captured, "Command failed");
            return Err(NetvolError::CommandFailed {
                command: command.to_string(),
                status: output.status.to_string(),
                output: captured,
            });
        }

        Ok(combined)
    }
}

/// Check whether `source` is mounted on `hostdir` according to `mount -t <fs_type>`.
///
/// A failure to list mounts counts as "not mounted".
pub fn is_mounted(runner: &dyn CommandRunner, fs_type: &str, source: &str, hostdir: &Path) -> bool {
    let listing = CommandLine::new("mount").arg("-t").arg(fs_type);
    match runner.run(&listing) {
        Ok(out) => mount_listed(&out, source, hostdir),
        Err(err) => {
            tracing::warn!(fs_type, error = %err, "Unable to list mounts");
            false
        }
    }
}

/// Scan `mount` output for a `<source> on <hostdir> ` line.
pub fn mount_listed(listing: &str, source: &str, hostdir: &Path) -> bool {
    let prefix = format!("{source} on {} ", hostdir.display());
    listing.lines().any(|line| line.starts_with(&prefix))
}
