//! Protocol backends.
//!
//! A backend knows how to name the remote source of a volume and how to run
//! the host mount command for its protocol. Reference counting, locking and
//! persistence live in [`crate::driver`].

pub mod cifs;
pub mod credentials;
pub mod efs;
pub mod metadata;
pub mod resolver;

use std::path::Path;

use netvol_common::NetvolResult;

use crate::exec::{CommandLine, CommandRunner};
use crate::registry::{Options, SHARE_OPT};

pub use cifs::CifsBackend;
pub use credentials::{CredentialResolver, Credentials, Netrc};
pub use efs::EfsBackend;
pub use metadata::{Ec2Metadata, Placement, PlacementSource, StaticPlacement};
pub use resolver::{DnsLookup, NameLookup, NameResolver};

/// Everything a backend needs to perform one physical mount.
#[derive(Debug, Clone, Copy)]
pub struct MountRequest<'a> {
    /// Volume name.
    pub name: &'a str,
    /// Remote source as returned by [`Backend::resolve_source`].
    pub source: &'a str,
    /// Local mount target.
    pub hostdir: &'a Path,
    /// Effective volume options.
    pub options: &'a Options,
    /// Credentials, for protocols that use them.
    pub credentials: Option<&'a Credentials>,
}

/// Protocol-specific mount behaviour.
pub trait Backend: Send {
    /// Short protocol name for logs.
    fn kind(&self) -> &'static str;

    /// Filesystem type passed to `mount -t`.
    fn fs_type(&self) -> &'static str;

    /// Remote source for a volume.
    fn resolve_source(&mut self, name: &str, options: &Options) -> String;

    /// Credentials for a volume, if the protocol uses any.
    fn resolve_credentials(&self, _name: &str, _options: &Options) -> Option<Credentials> {
        None
    }

    /// Mount `request.source` onto `request.hostdir`.
    fn mount(&mut self, runner: &dyn CommandRunner, request: &MountRequest<'_>) -> NetvolResult<()>;

    /// Unmount `hostdir`.
    fn unmount(&self, runner: &dyn CommandRunner, hostdir: &Path) -> NetvolResult<()> {
        runner
            .run(&CommandLine::new("umount").path_arg(hostdir))
            .map(drop)
    }
}

/// Remote path of a volume: the `share` option if set, else the name.
pub fn share_path<'a>(name: &'a str, options: &'a Options) -> &'a str {
    options
        .get(SHARE_OPT)
        .map_or(name, String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_option_overrides_name() {
        let mut options = Options::new();
        assert_eq!(share_path("shareA", &options), "shareA");
        options.insert(SHARE_OPT.to_string(), "srv/projects".to_string());
        assert_eq!(share_path("shareA", &options), "srv/projects");
    }
}
