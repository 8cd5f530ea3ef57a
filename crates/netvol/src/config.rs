//! Driver and backend configuration.

use std::path::PathBuf;
use std::time::Duration;

use netvol_common::NetvolPaths;

use crate::backend::Credentials;

/// What to do when the registry snapshot cannot be written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PersistFailurePolicy {
    /// Log and terminate the process with status 1.
    #[default]
    Exit,
    /// Return [`netvol_common::NetvolError::Persist`] to the caller.
    Propagate,
}

/// Driver configuration options.
#[derive(Debug, Clone)]
pub struct DriverConfig {
    /// Root mount directory and snapshot location.
    pub paths: NetvolPaths,
    /// Snapshot write failure handling.
    pub persist_failure: PersistFailurePolicy,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            paths: NetvolPaths::new(),
            persist_failure: PersistFailurePolicy::default(),
        }
    }
}

impl DriverConfig {
    /// Set the root mount directory.
    #[must_use]
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.paths.root = root.into();
        self
    }

    /// Set the snapshot file.
    #[must_use]
    pub fn with_snapshot(mut self, snapshot: impl Into<PathBuf>) -> Self {
        self.paths.snapshot = snapshot.into();
        self
    }

    /// Set the snapshot write failure policy.
    #[must_use]
    pub const fn with_persist_failure(mut self, policy: PersistFailurePolicy) -> Self {
        self.persist_failure = policy;
        self
    }
}

/// CIFS backend configuration.
#[derive(Debug, Clone, Default)]
pub struct CifsConfig {
    /// Driver-wide default credentials.
    pub defaults: Credentials,
    /// Directory holding the `.netrc` machine credentials file ($HOME if unset).
    pub netrc_dir: Option<PathBuf>,
}

impl CifsConfig {
    /// Directory searched for `.netrc`.
    #[must_use]
    pub fn netrc_dir(&self) -> PathBuf {
        self.netrc_dir
            .clone()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("/root"))
    }
}

/// EFS/NFS backend configuration.
#[derive(Debug, Clone)]
pub struct EfsConfig {
    /// Availability zone override; taken from instance metadata when unset.
    pub availability_zone: Option<String>,
    /// Resolve export hostnames to addresses before mounting.
    pub resolve: bool,
    /// Nameserver (`ip` or `ip:port`) used when resolving.
    pub nameserver: Option<String>,
    /// Lifetime of resolved addresses; `None` caches for the process lifetime.
    pub dns_cache_ttl: Option<Duration>,
}

impl Default for EfsConfig {
    fn default() -> Self {
        Self {
            availability_zone: None,
            resolve: true,
            nameserver: None,
            dns_cache_ttl: None,
        }
    }
}
