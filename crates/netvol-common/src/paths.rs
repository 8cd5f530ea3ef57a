//! Standard filesystem paths for netvol.

use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;

use crate::error::{NetvolError, NetvolResult};

/// Default root directory under which shares are mounted.
pub static NETVOL_ROOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("NETVOL_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/docker-volumes/netshare"))
});

/// Default location of the mount registry snapshot.
pub static NETVOL_SNAPSHOT: Lazy<PathBuf> = Lazy::new(|| {
    std::env::var("NETVOL_SNAPSHOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("/var/lib/netvol/mounts.json"))
});

/// Standard paths used by the volume driver.
#[derive(Debug, Clone)]
pub struct NetvolPaths {
    /// Root mount directory (default: /var/lib/docker-volumes/netshare).
    pub root: PathBuf,
    /// Registry snapshot file (default: /var/lib/netvol/mounts.json).
    pub snapshot: PathBuf,
}

impl NetvolPaths {
    /// Create paths with default locations.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for NetvolPaths {
    fn default() -> Self {
        Self {
            root: NETVOL_ROOT.clone(),
            snapshot: NETVOL_SNAPSHOT.clone(),
        }
    }
}

/// Canonical form of a volume name.
///
/// The canonical name joined to the mount root is the volume's host
/// directory, so `host/share` lives at `root/host/share` and no name can
/// escape the root. Only normal path components are kept and joined with `/`, so `srv//data`,
/// `/srv/./data` and `srv/data/` all name the same volume. A name with no
/// normal component (`""`, `.`, `..`) is rejected.
pub fn volume_name(name: &str) -> NetvolResult<String> {
    let parts: Vec<_> = Path::new(name)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return Err(NetvolError::InvalidName {
            name: name.to_string(),
        });
    }
    Ok(parts.join("/"))
}
