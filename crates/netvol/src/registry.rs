//! In-memory table of named mounts and their reference counts.
//!
//! The registry performs no I/O. The driver owns the only instance and
//! mutates it while holding its lock.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use netvol_common::{NetvolError, NetvolResult};
use serde::Serialize;

/// Per-volume options supplied by the user.
pub type Options = BTreeMap<String, String>;

/// Option key overriding the remote share/export path.
pub const SHARE_OPT: &str = "share";

/// A registered volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountEntry {
    /// Volume name.
    pub name: String,
    /// Local directory the share is mounted onto.
    pub hostdir: PathBuf,
    /// Number of active users.
    pub connections: u32,
    /// User-supplied options.
    pub options: Options,
    /// Registered through Create rather than an implicit Mount.
    pub managed: bool,
}

/// Name and mountpoint of a volume, as reported by Get and List.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VolumeInfo {
    /// Volume name.
    pub name: String,
    /// Host directory.
    pub mountpoint: PathBuf,
}

/// Reference-counted mount table keyed by volume name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MountRegistry {
    mounts: BTreeMap<String, MountEntry>,
}

impl MountRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a registry from already validated entries.
    pub fn from_entries(entries: impl IntoIterator<Item = MountEntry>) -> Self {
        Self {
            mounts: entries
                .into_iter()
                .map(|entry| (entry.name.clone(), entry))
                .collect(),
        }
    }

    /// All entries, ordered by name.
    pub fn entries(&self) -> impl Iterator<Item = &MountEntry> {
        self.mounts.values()
    }

    /// Look up an entry.
    pub fn get(&self, name: &str) -> Option<&MountEntry> {
        self.mounts.get(name)
    }

    /// Number of registered volumes.
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// Whether the registry is empty.
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }

    /// Whether a volume is registered.
    pub fn has_mount(&self, name: &str) -> bool {
        self.mounts.contains_key(name)
    }

    /// Whether a volume is registered and in use.
    pub fn is_active(&self, name: &str) -> bool {
        self.count(name) > 0
    }

    /// Active connections, 0 if absent.
    pub fn count(&self, name: &str) -> u32 {
        self.mounts.get(name).map_or(0, |m| m.connections)
    }

    /// Record the first connection of a freshly mounted volume.
    ///
    /// Creates an unmanaged entry holding `options` if absent, otherwise
    /// increments the existing entry and leaves its options untouched.
    pub fn add(&mut self, name: &str, hostdir: &Path, options: Options) {
        if let Some(entry) = self.mounts.get_mut(name) {
            entry.connections += 1;
            return;
        }
        self.mounts.insert(
            name.to_string(),
            MountEntry {
                name: name.to_string(),
                hostdir: hostdir.to_path_buf(),
                connections: 1,
                options,
                managed: false,
            },
        );
    }

    /// Register a managed volume.
    ///
    /// An idle entry is replaced with the new options. An active entry keeps
    /// its options and is only marked as managed.
    pub fn create(&mut self, name: &str, hostdir: &Path, options: Options) {
        if let Some(entry) = self.mounts.get_mut(name) {
            if entry.connections > 0 {
                tracing::debug!(name, "Volume in use, keeping existing options");
                entry.managed = true;
                return;
            }
        }
        self.mounts.insert(
            name.to_string(),
            MountEntry {
                name: name.to_string(),
                hostdir: hostdir.to_path_buf(),
                connections: 0,
                options,
                managed: true,
            },
        );
    }

    /// Remove an idle volume. Absent volumes are a no-op.
    pub fn delete(&mut self, name: &str) -> NetvolResult<()> {
        if self.is_active(name) {
            return Err(NetvolError::VolumeInUse {
                name: name.to_string(),
            });
        }
        self.mounts.remove(name);
        Ok(())
    }

    /// Remove the entry if it is idle and was never explicitly created.
    ///
    /// Returns whether an entry was removed.
    pub fn delete_if_not_managed(&mut self, name: &str) -> bool {
        let removable = self
            .mounts
            .get(name)
            .is_some_and(|m| m.connections == 0 && !m.managed);
        if removable {
            tracing::info!(name, "Removing un-managed volume");
            self.mounts.remove(name);
        }
        removable
    }

    /// Add a connection, returning the new count (0 if absent).
    pub fn increment(&mut self, name: &str) -> u32 {
        self.mounts.get_mut(name).map_or(0, |m| {
            m.connections += 1;
            m.connections
        })
    }

    /// Drop a connection, returning the new count.
    ///
    /// The count never goes below zero; an unmatched decrement is logged.
    pub fn decrement(&mut self, name: &str) -> u32 {
        self.mounts.get_mut(name).map_or(0, |m| {
            if m.connections == 0 {
                tracing::warn!(name, "Connection count already zero, ignoring decrement");
            } else {
                m.connections -= 1;
            }
            m.connections
        })
    }

    /// Force the count to zero.
    pub fn reset_count(&mut self, name: &str) {
        if let Some(m) = self.mounts.get_mut(name) {
            m.connections = 0;
        }
    }

    /// Name and host directory under `root` of every volume.
    ///
    /// Names are canonical (see [`netvol_common::volume_name`]), so joining
    /// them to `root` gives the same directory Get and Mount use.
    pub fn volumes(&self, root: &Path) -> Vec<VolumeInfo> {
        self.mounts
            .keys()
            .map(|name| VolumeInfo {
                name: name.clone(),
                mountpoint: root.join(name),
            })
            .collect()
    }

    /// Value of option `key`, `None` when the volume or the option is absent.
    pub fn option(&self, name: &str, key: &str) -> Option<&str> {
        self.mounts
            .get(name)
            .and_then(|m| m.options.get(key))
            .map(String::as_str)
    }

    /// Options of a volume; empty if absent.
    pub fn options(&self, name: &str) -> Options {
        self.mounts
            .get(name)
            .map(|m| m.options.clone())
            .unwrap_or_default()
    }
}
