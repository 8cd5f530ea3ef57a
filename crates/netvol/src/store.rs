//! Registry snapshot persistence.
//!
//! The snapshot keeps the historical JSON layout so existing mounts files are
//! still readable:
//!
//! ```json
//! {"Mounts": {"shareA": {"Name": "shareA", "Hostdir": "/mnt/shareA",
//!   "Connections": 1, "Opts": {"vers": "3.0"}, "Managed": false}}}
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use netvol_common::{NetvolError, NetvolResult, volume_name};
use serde::{Deserialize, Serialize};

use crate::registry::{MountEntry, MountRegistry, Options};

/// On-disk form of the whole registry.
#[derive(Debug, Default, Serialize, Deserialize)]
struct SnapshotDoc {
    #[serde(rename = "Mounts", default)]
    mounts: Option<BTreeMap<String, MountRecord>>,
}

/// On-disk form of one entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct MountRecord {
    #[serde(default)]
    name: String,
    #[serde(default)]
    hostdir: PathBuf,
    #[serde(default)]
    connections: i64,
    #[serde(default)]
    opts: Option<Options>,
    #[serde(default)]
    managed: bool,
}

impl From<&MountEntry> for MountRecord {
    fn from(entry: &MountEntry) -> Self {
        Self {
            name: entry.name.clone(),
            hostdir: entry.hostdir.clone(),
            connections: i64::from(entry.connections),
            opts: Some(entry.options.clone()),
            managed: entry.managed,
        }
    }
}

impl MountRecord {
    fn into_entry(self, name: String) -> MountEntry {
        let connections = u32::try_from(self.connections).unwrap_or_else(|_| {
            tracing::warn!(
                name = %name,
                connections = self.connections,
                "Invalid connection count in mounts file, resetting to 0"
            );
            0
        });
        MountEntry {
            name,
            hostdir: self.hostdir,
            connections,
            options: self.opts.unwrap_or_default(),
            managed: self.managed,
        }
    }
}

/// Reads and writes the registry snapshot file.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Create a store for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Snapshot file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the registry.
    ///
    /// A missing or unreadable snapshot yields an empty registry.
    pub fn load(&self) -> MountRegistry {
        match self.try_load() {
            Ok(registry) => {
                tracing::debug!(
                    path = %self.path.display(),
                    count = registry.len(),
                    "Loaded mounts file"
                );
                registry
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "Cannot read mounts file, will try to create a new one"
                );
                MountRegistry::new()
            }
        }
    }

    fn try_load(&self) -> NetvolResult<MountRegistry> {
        let content = fs::read_to_string(&self.path)?;
        let doc: SnapshotDoc = serde_json::from_str(&content)?;

        // Older files may key one volume under several spellings.
        let mut entries: BTreeMap<String, MountEntry> = BTreeMap::new();
        for (key, record) in doc.mounts.unwrap_or_default() {
            let name = match volume_name(&key) {
                Ok(name) => name,
                Err(err) => {
                    tracing::warn!(name = %key, error = %err, "Dropping mounts file entry");
                    continue;
                }
            };
            if entries.contains_key(&name) {
                tracing::warn!(name = %name, alias = %key, "Duplicate volume in mounts file, keeping the first");
                continue;
            }
            entries.insert(name.clone(), record.into_entry(name));
        }
        Ok(MountRegistry::from_entries(entries.into_values()))
    }

    /// Write the registry, atomically replacing the previous snapshot.
    pub fn save(&self, registry: &MountRegistry) -> NetvolResult<()> {
        let doc = SnapshotDoc {
            mounts: Some(
                registry
                    .entries()
                    .map(|entry| (entry.name.clone(), MountRecord::from(entry)))
                    .collect(),
            ),
        };
        let json = serde_json::to_vec(&doc)?;

        let persist_err = |source: std::io::Error| NetvolError::Persist {
            path: self.path.clone(),
            source,
        };

        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        // NamedTempFile is created with mode 0600.
        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(persist_err)?;
        tmp.write_all(&json).map_err(persist_err)?;
        tmp.as_file().sync_all().map_err(persist_err)?;
        tmp.persist(&self.path).map_err(|e| persist_err(e.error))?;

        tracing::debug!(
            path = %self.path.display(),
            count = registry.len(),
            "Saved mounts file"
        );
        Ok(())
    }
}
