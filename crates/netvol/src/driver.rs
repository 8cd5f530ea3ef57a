//! Volume driver: the Create/Remove/Mount/Unmount/Path/Get/List state machine.
//!
//! One lock per driver serializes every operation, including the host mount
//! command and the snapshot write that follows it. A volume is physically
//! mounted at most once no matter how many containers use it.

use std::fs::{self, DirBuilder};
use std::io::ErrorKind;
use std::os::unix::fs::DirBuilderExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use netvol_common::{NetvolError, NetvolResult, volume_name};
use parking_lot::Mutex;

use crate::backend::{Backend, MountRequest};
use crate::config::{DriverConfig, PersistFailurePolicy};
use crate::exec::CommandRunner;
use crate::reconcile::reconcile;
use crate::registry::{MountEntry, MountRegistry, Options, SHARE_OPT, VolumeInfo};
use crate::store::SnapshotStore;

/// State guarded by the driver lock.
struct DriverState {
    registry: MountRegistry,
    backend: Box<dyn Backend>,
}

/// Reference-counted volume driver over one backend.
pub struct VolumeDriver {
    root: PathBuf,
    store: SnapshotStore,
    persist_failure: PersistFailurePolicy,
    runner: Arc<dyn CommandRunner>,
    state: Mutex<DriverState>,
}

impl VolumeDriver {
    /// Load the snapshot, write it back, and reconcile it against the host.
    pub fn new(
        config: DriverConfig,
        backend: Box<dyn Backend>,
        runner: Arc<dyn CommandRunner>,
    ) -> NetvolResult<Self> {
        let store = SnapshotStore::new(&config.paths.snapshot);
        let registry = store.load();
        let driver = Self {
            root: config.paths.root,
            store,
            persist_failure: config.persist_failure,
            runner,
            state: Mutex::new(DriverState { registry, backend }),
        };

        driver.critical(true, |state| {
            let reset = reconcile(
                &mut state.registry,
                state.backend.as_mut(),
                driver.runner.as_ref(),
                &driver.root,
            );
            tracing::debug!(
                backend = state.backend.kind(),
                snapshot = %driver.store.path().display(),
                volumes = state.registry.len(),
                reset = reset.len(),
                "Driver ready"
            );
            Ok(())
        })?;
        Ok(driver)
    }

    /// Root mount directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Run `body` under the driver lock, optionally flushing the registry after.
    fn critical<T>(
        &self,
        persist: bool,
        body: impl FnOnce(&mut DriverState) -> NetvolResult<T>,
    ) -> NetvolResult<T> {
        let mut state = self.state.lock();
        let result = body(&mut state);
        if persist {
            self.flush(&state.registry)?;
        }
        result
    }

    fn flush(&self, registry: &MountRegistry) -> NetvolResult<()> {
        let Err(err) = self.store.save(registry) else {
            return Ok(());
        };
        match self.persist_failure {
            PersistFailurePolicy::Propagate => Err(err),
            PersistFailurePolicy::Exit => {
                tracing::error!(error = %err, "Cannot persist mounts, exiting");
                std::process::exit(1)
            }
        }
    }

    /// Register a managed volume and create its host directory.
    pub fn create(&self, name: &str, options: &Options) -> NetvolResult<()> {
        let name = volume_name(name)?;
        let name = name.as_str();
        tracing::debug!(name, keys = ?options.keys().collect::<Vec<_>>(), "Create");
        let hostdir = self.root.join(name);
        self.critical(true, |state| {
            create_dest(&hostdir)?;
            state.registry.create(name, &hostdir, options.clone());
            Ok(())
        })
    }

    /// Forget an idle volume.
    pub fn remove(&self, name: &str) -> NetvolResult<()> {
        let name = volume_name(name)?;
        let name = name.as_str();
        tracing::debug!(name, "Remove");
        self.critical(true, |state| state.registry.delete(name))
    }

    /// Add a user to a volume, mounting it if it has none.
    ///
    /// `options` only apply to volumes that were never created.
    pub fn mount(&self, name: &str, options: &Options) -> NetvolResult<PathBuf> {
        let name = volume_name(name)?;
        let name = name.as_str();
        tracing::debug!(name, keys = ?options.keys().collect::<Vec<_>>(), "Mount");
        let hostdir = self.root.join(name);
        self.critical(true, |state| {
            if state.registry.is_active(name) {
                let connections = state.registry.increment(name);
                tracing::info!(
                    name,
                    hostdir = %hostdir.display(),
                    connections,
                    "Using existing volume mount"
                );
                return Ok(hostdir);
            }

            create_dest(&hostdir)?;

            let effective = if state.registry.has_mount(name) {
                if let Some(share) = state.registry.option(name, SHARE_OPT) {
                    tracing::debug!(name, share, "Remote path set by volume options");
                }
                state.registry.options(name)
            } else {
                options.clone()
            };
            let source = state.backend.resolve_source(name, &effective);
            let credentials = state.backend.resolve_credentials(name, &effective);
            state.backend.mount(
                self.runner.as_ref(),
                &MountRequest {
                    name,
                    source: &source,
                    hostdir: &hostdir,
                    options: &effective,
                    credentials: credentials.as_ref(),
                },
            )?;

            state.registry.add(name, &hostdir, effective);
            Ok(hostdir)
        })
    }

    /// Drop a user from a volume, unmounting it when the last one leaves.
    pub fn unmount(&self, name: &str) -> NetvolResult<()> {
        let name = volume_name(name)?;
        let name = name.as_str();
        tracing::debug!(name, "Unmount");
        let hostdir = self.root.join(name);
        self.critical(true, |state| {
            if !state.registry.has_mount(name) {
                return Ok(());
            }
            match state.registry.count(name) {
                0 => {
                    tracing::info!(name, "Skipping unmount - not mounted");
                    state.registry.delete_if_not_managed(name);
                    return Ok(());
                }
                1 => {}
                _ => {
                    let connections = state.registry.decrement(name);
                    tracing::info!(
                        name,
                        connections,
                        "Skipping unmount - in use by other containers"
                    );
                    return Ok(());
                }
            }

            state.registry.decrement(name);
            tracing::info!(
                name,
                backend = state.backend.kind(),
                hostdir = %hostdir.display(),
                "Unmounting volume"
            );
            if let Err(err) = state.backend.unmount(self.runner.as_ref(), &hostdir) {
                // Still mounted; keep the last user so a retry unmounts again.
                state.registry.increment(name);
                return Err(err);
            }
            remove_dest(&hostdir)?;
            state.registry.delete_if_not_managed(name);
            Ok(())
        })
    }

    /// Host directory of a volume.
    pub fn path(&self, name: &str) -> NetvolResult<PathBuf> {
        let _state = self.state.lock();
        let hostdir = self.root.join(volume_name(name)?);
        tracing::debug!(name, hostdir = %hostdir.display(), "Path");
        Ok(hostdir)
    }

    /// Name and mountpoint of a registered volume.
    pub fn get(&self, name: &str) -> Option<VolumeInfo> {
        let name = volume_name(name).ok()?;
        let state = self.state.lock();
        state.registry.has_mount(&name).then(|| VolumeInfo {
            mountpoint: self.root.join(&name),
            name,
        })
    }

    /// Every registered volume.
    pub fn list(&self) -> Vec<VolumeInfo> {
        self.state.lock().registry.volumes(&self.root)
    }

    /// Snapshot of a single registry entry.
    pub fn entry(&self, name: &str) -> Option<MountEntry> {
        let name = volume_name(name).ok()?;
        self.state.lock().registry.get(&name).cloned()
    }
}

fn create_dest(dest: &Path) -> NetvolResult<()> {
    match fs::symlink_metadata(dest) {
        Ok(meta) if meta.is_dir() => Ok(()),
        Ok(_) => Err(NetvolError::NotADirectory {
            path: dest.to_path_buf(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => DirBuilder::new()
            .recursive(true)
            .mode(0o755)
            .create(dest)
            .map_err(|source| NetvolError::CreateDir {
                path: dest.to_path_buf(),
                source,
            }),
        Err(source) => Err(NetvolError::CreateDir {
            path: dest.to_path_buf(),
            source,
        }),
    }
}

/// Remove an unmounted host directory.
///
/// Fails on a non-empty directory, which means something is still mounted
/// or stored there.
fn remove_dest(dest: &Path) -> NetvolResult<()> {
    match fs::remove_dir(dest) {
        Err(err) if err.kind() != ErrorKind::NotFound => Err(NetvolError::RemoveDir {
            path: dest.to_path_buf(),
            source: err,
        }),
        _ => Ok(()),
    }
}
