//! AWS EFS backend, mounted over NFSv4.

use std::net::IpAddr;

use netvol_common::NetvolResult;

use super::metadata::PlacementSource;
use super::resolver::{DnsLookup, NameResolver};
use super::{Backend, MountRequest, share_path};
use crate::config::EfsConfig;
use crate::exec::{CommandLine, CommandRunner};
use crate::registry::Options;

/// Mounts `<export>:/<path>` with `mount -t nfs4`.
pub struct EfsBackend {
    availability_zone: String,
    region: String,
    resolver: Option<NameResolver>,
}

impl EfsBackend {
    /// Create the backend, fetching the placement once.
    ///
    /// Fails if the placement is unavailable.
    pub fn new(config: &EfsConfig, metadata: &dyn PlacementSource) -> NetvolResult<Self> {
        let placement = metadata.placement()?;
        let resolver = if config.resolve {
            let lookup = DnsLookup::new(config.nameserver.as_deref())?;
            Some(NameResolver::new(Box::new(lookup), config.dns_cache_ttl))
        } else {
            None
        };
        let availability_zone = config
            .availability_zone
            .clone()
            .filter(|az| !az.is_empty())
            .unwrap_or(placement.availability_zone);
        Ok(Self::with_parts(availability_zone, placement.region, resolver))
    }

    /// Create the backend from known parts. `resolver: None` disables DNS.
    pub const fn with_parts(
        availability_zone: String,
        region: String,
        resolver: Option<NameResolver>,
    ) -> Self {
        Self {
            availability_zone,
            region,
            resolver,
        }
    }

    /// Zonal DNS name of an export.
    pub fn export_hostname(&self, export_id: &str) -> String {
        format!(
            "{}.{export_id}.efs.{}.amazonaws.com",
            self.availability_zone, self.region
        )
    }
}

/// Split `fs-id/sub/path` into the export id and the path below it.
fn split_export(path: &str) -> (&str, &str) {
    path.split_once('/').unwrap_or((path, ""))
}

fn host_literal(addr: IpAddr) -> String {
    match addr {
        IpAddr::V4(v4) => v4.to_string(),
        IpAddr::V6(v6) => format!("[{v6}]"),
    }
}

impl Backend for EfsBackend {
    fn kind(&self) -> &'static str {
        "efs"
    }

    fn fs_type(&self) -> &'static str {
        "nfs4"
    }

    fn resolve_source(&mut self, name: &str, options: &Options) -> String {
        let (export, rest) = split_export(share_path(name, options));

        if self.resolver.is_none() {
            // Always `<export>:/<rest>`, so a bare export mounts its root as `<export>:/`.
            return format!("{export}:/{rest}");
        }

        let hostname = self.export_hostname(export);
        let target = match self.resolver.as_mut().map(|r| r.resolve(&hostname)) {
            Some(Ok(addr)) => host_literal(addr),
            Some(Err(err)) => {
                tracing::warn!(host = %hostname, error = %err, "Error during resolve, using hostname");
                hostname
            }
            None => hostname,
        };
        format!("{target}:/{rest}")
    }

    fn mount(&mut self, runner: &dyn CommandRunner, request: &MountRequest<'_>) -> NetvolResult<()> {
        let command = CommandLine::new("mount")
            .arg("-t")
            .arg(self.fs_type())
            .arg(request.source)
            .path_arg(request.hostdir);

        tracing::info!(
            name = request.name,
            source = request.source,
            hostdir = %request.hostdir.display(),
            "Mounting EFS volume"
        );
        let result = runner.run(&command).map(drop);

        // A stale cached address must not outlive a failed mount.
        if result.is_err() && self.resolver.is_some() {
            let (export, _) = split_export(share_path(request.name, request.options));
            let hostname = self.export_hostname(export);
            if let Some(resolver) = self.resolver.as_mut() {
                tracing::debug!(host = %hostname, "Dropping cached address after failed mount");
                resolver.forget(&hostname);
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use std::net::{Ipv4Addr, Ipv6Addr};
    use std::path::Path;

    use netvol_common::NetvolError;

    use super::*;
    use crate::backend::metadata::{Placement, StaticPlacement};
    use crate::backend::resolver::NameLookup;
    use crate::registry::SHARE_OPT;
    use crate::testing::RecordingRunner;

    struct FixedLookup(Option<IpAddr>);

    impl NameLookup for FixedLookup {
        fn lookup(&self, host: &str) -> NetvolResult<IpAddr> {
            self.0.ok_or_else(|| NetvolError::Resolve {
                host: host.to_string(),
                message: "NXDOMAIN".to_string(),
            })
        }
    }

    fn backend(addr: Option<IpAddr>) -> EfsBackend {
        let resolver = NameResolver::new(Box::new(FixedLookup(addr)), None);
        EfsBackend::with_parts("us-east-1a".to_string(), "us-east-1".to_string(), Some(resolver))
    }

    #[test]
    fn hostname_template() {
        assert_eq!(
            backend(None).export_hostname("fs-12345678"),
            "us-east-1a.fs-12345678.efs.us-east-1.amazonaws.com"
        );
    }

    #[test]
    fn resolved_address_is_used() {
        let mut efs = backend(Some(IpAddr::V4(Ipv4Addr::new(10, 1, 2, 3))));
        assert_eq!(efs.resolve_source("fs-12345678", &Options::new()), "10.1.2.3:/");
        assert_eq!(
            efs.resolve_source("fs-12345678/exports/data", &Options::new()),
            "10.1.2.3:/exports/data"
        );
    }

    #[test]
    fn ipv6_is_bracketed() {
        let mut efs = backend(Some(IpAddr::V6(Ipv6Addr::LOCALHOST)));
        assert_eq!(efs.resolve_source("fs-1", &Options::new()), "[::1]:/");
    }

    #[test]
    fn resolution_failure_falls_back_to_hostname() {
        let mut efs = backend(None);
        assert_eq!(
            efs.resolve_source("fs-12345678", &Options::new()),
            "us-east-1a.fs-12345678.efs.us-east-1.amazonaws.com:/"
        );
    }

    #[test]
    fn without_resolution_uses_export_id() {
        let mut efs = EfsBackend::with_parts("az".to_string(), "region".to_string(), None);
        let mut options = Options::new();
        options.insert(SHARE_OPT.to_string(), "fs-abc/home".to_string());
        assert_eq!(efs.resolve_source("vol", &options), "fs-abc:/home");
        assert_eq!(efs.resolve_source("fs-abc", &Options::new()), "fs-abc:/");
    }

    #[test]
    fn configured_zone_overrides_metadata() {
        let placement = StaticPlacement(Placement {
            availability_zone: "eu-west-1b".to_string(),
            region: "eu-west-1".to_string(),
        });
        let config = EfsConfig {
            availability_zone: Some("eu-west-1c".to_string()),
            resolve: false,
            ..EfsConfig::default()
        };
        let efs = EfsBackend::new(&config, &placement).unwrap();
        assert_eq!(
            efs.export_hostname("fs-1"),
            "eu-west-1c.fs-1.efs.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn mount_uses_nfs4() {
        let runner = RecordingRunner::default();
        let mut efs = backend(None);
        efs.mount(
            &runner,
            &MountRequest {
                name: "fs-1",
                source: "10.0.0.1:/",
                hostdir: Path::new("/mnt/fs-1"),
                options: &Options::new(),
                credentials: None,
            },
        )
        .unwrap();
        assert_eq!(
            runner.mounts(),
            vec![vec!["mount", "-t", "nfs4", "10.0.0.1:/", "/mnt/fs-1"]
                .into_iter()
                .map(String::from)
                .collect::<Vec<_>>()]
        );
    }

    #[test]
    fn failed_mount_drops_cached_address() {
        use std::sync::Arc;
        use std::sync::atomic::{AtomicUsize, Ordering};

        struct Counting(Arc<AtomicUsize>);

        impl NameLookup for Counting {
            fn lookup(&self, _host: &str) -> NetvolResult<IpAddr> {
                self.0.fetch_add(1, Ordering::SeqCst);
                Ok(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9)))
            }
        }

        let calls = Arc::new(AtomicUsize::new(0));
        let resolver = NameResolver::new(Box::new(Counting(Arc::clone(&calls))), None);
        let mut efs =
            EfsBackend::with_parts("us-east-1a".to_string(), "us-east-1".to_string(), Some(resolver));
        let runner = RecordingRunner::default();
        runner.fail("mount");

        let source = efs.resolve_source("fs-1/data", &Options::new());
        assert_eq!(efs.resolve_source("fs-1/data", &Options::new()), source);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let request = MountRequest {
            name: "fs-1/data",
            source: &source,
            hostdir: Path::new("/mnt/fs-1/data"),
            options: &Options::new(),
            credentials: None,
        };
        assert!(efs.mount(&runner, &request).is_err());

        efs.resolve_source("fs-1/data", &Options::new());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
