//! Common error types for netvol.

use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// Result type alias using [`NetvolError`].
pub type NetvolResult<T> = Result<T, NetvolError>;

/// Errors raised by the volume driver and its backends.
#[derive(Error, Diagnostic, Debug)]
pub enum NetvolError {
    /// Volume still has active connections.
    #[error("Volume is currently in use: {name}")]
    #[diagnostic(
        code(netvol::volume::in_use),
        help("Unmount the volume from every container before removing it")
    )]
    VolumeInUse {
        /// The volume name.
        name: String,
    },

    /// Volume name has no usable path component.
    #[error("Invalid volume name: '{name}'")]
    #[diagnostic(
        code(netvol::volume::invalid_name),
        help("Volume names are relative paths such as `host/share`")
    )]
    InvalidName {
        /// The rejected name.
        name: String,
    },

    /// Host directory could not be created.
    #[error("Failed to create directory {}: {source}", .path.display())]
    #[diagnostic(code(netvol::dir::create))]
    CreateDir {
        /// The directory that could not be created.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Host directory could not be removed.
    #[error("Failed to remove directory {}: {source}", .path.display())]
    #[diagnostic(code(netvol::dir::remove))]
    RemoveDir {
        /// The directory that could not be removed.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Mount target exists but is not a directory.
    #[error("{} already exists and is not a directory", .path.display())]
    #[diagnostic(code(netvol::dir::not_a_directory))]
    NotADirectory {
        /// The offending path.
        path: PathBuf,
    },

    /// External command could not be started.
    #[error("Failed to execute {command}: {source}")]
    #[diagnostic(code(netvol::command::spawn))]
    Spawn {
        /// Redacted command line.
        command: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// External command exited unsuccessfully.
    #[error("Command `{command}` failed ({status}): {output}")]
    #[diagnostic(code(netvol::command::failed))]
    CommandFailed {
        /// Redacted command line.
        command: String,
        /// Exit status description.
        status: String,
        /// Redacted combined stdout/stderr.
        output: String,
    },

    /// Instance metadata could not be fetched.
    #[error("Error resolving instance metadata: {message}")]
    #[diagnostic(
        code(netvol::metadata),
        help("Pass an explicit availability zone or run on an instance with metadata access")
    )]
    Metadata {
        /// The error message.
        message: String,
    },

    /// Hostname lookup failed.
    #[error("Failed to resolve {host}: {message}")]
    #[diagnostic(code(netvol::resolve))]
    Resolve {
        /// The hostname being resolved.
        host: String,
        /// The error message.
        message: String,
    },

    /// Snapshot file could not be written.
    #[error("Error writing mounts file {}: {source}", .path.display())]
    #[diagnostic(
        code(netvol::persist),
        help("Make sure the file's parent directory exists and is writable")
    )]
    Persist {
        /// The snapshot path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    #[diagnostic(code(netvol::io))]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    #[diagnostic(code(netvol::serialization))]
    Serialization(String),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    #[diagnostic(code(netvol::config))]
    Config {
        /// The error message.
        message: String,
    },
}

impl NetvolError {
    /// Whether the process should terminate after this error.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Persist { .. } | Self::Metadata { .. })
    }
}

impl From<serde_json::Error> for NetvolError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
