//! Startup reconciliation of the registry against the host mount table.

use std::path::Path;

use crate::backend::Backend;
use crate::exec::{CommandRunner, is_mounted};
use crate::registry::MountRegistry;

/// Reset the count of every volume that claims connections but is not mounted.
///
/// Returns the names that were reset. The caller persists the registry.
pub fn reconcile(
    registry: &mut MountRegistry,
    backend: &mut dyn Backend,
    runner: &dyn CommandRunner,
    root: &Path,
) -> Vec<String> {
    let active: Vec<_> = registry
        .entries()
        .filter(|entry| entry.connections > 0)
        .map(|entry| (entry.name.clone(), entry.connections, entry.options.clone()))
        .collect();

    let mut reset = Vec::new();
    for (name, connections, options) in active {
        let hostdir = root.join(&name);
        let source = backend.resolve_source(&name, &options);
        if is_mounted(runner, backend.fs_type(), &source, &hostdir) {
            continue;
        }
        tracing::info!(
            name = %name,
            hostdir = %hostdir.display(),
            connections,
            "Mount point is not mounted but reported to have connections, resetting connection count to 0"
        );
        registry.reset_count(&name);
        reset.push(name);
    }
    reset
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{CifsBackend, EfsBackend};
    use crate::registry::{MountEntry, Options, SHARE_OPT};
    use crate::testing::RecordingRunner;

    fn entry(name: &str, connections: u32) -> MountEntry {
        MountEntry {
            name: name.to_string(),
            hostdir: Path::new("/mnt").join(name),
            connections,
            options: Options::new(),
            managed: false,
        }
    }

    #[test]
    fn resets_only_missing_mounts() {
        let mut registry =
            MountRegistry::from_entries([entry("alive", 2), entry("gone", 3), entry("idle", 0)]);
        let runner = RecordingRunner::default();
        runner.list_mount("//alive", Path::new("/mnt/alive"), "cifs");

        let reset = reconcile(
            &mut registry,
            &mut CifsBackend::default(),
            &runner,
            Path::new("/mnt"),
        );

        assert_eq!(reset, ["gone"]);
        assert_eq!(registry.count("alive"), 2);
        assert_eq!(registry.count("gone"), 0);
        assert!(registry.has_mount("gone"));
        assert_eq!(runner.listings().len(), 2);
    }

    #[test]
    fn listing_failure_counts_as_unmounted() {
        let mut registry = MountRegistry::from_entries([entry("shareA", 1)]);
        let runner = RecordingRunner::default();
        runner.fail("mount");

        let reset = reconcile(
            &mut registry,
            &mut CifsBackend::default(),
            &runner,
            Path::new("/mnt"),
        );
        assert_eq!(reset, ["shareA"]);
    }

    #[test]
    fn efs_entries_use_the_nfs4_table() {
        let export = |share: &str, connections| MountEntry {
            options: [(SHARE_OPT.to_string(), share.to_string())].into(),
            ..entry(share, connections)
        };
        let mut registry =
            MountRegistry::from_entries([export("fs-0123abcd", 2), export("fs-4567ef01", 1)]);
        let runner = RecordingRunner::default();
        runner.list_mount("fs-0123abcd:/", Path::new("/mnt/fs-0123abcd"), "nfs4");

        let mut efs = EfsBackend::with_parts("us-east-1a".to_string(), "us-east-1".to_string(), None);
        let reset = reconcile(&mut registry, &mut efs, &runner, Path::new("/mnt"));

        assert_eq!(reset, ["fs-4567ef01"]);
        assert_eq!(registry.count("fs-0123abcd"), 2);
        assert_eq!(registry.count("fs-4567ef01"), 0);
        assert!(runner.listings().iter().all(|argv| argv[2] == "nfs4"));
    }
}
