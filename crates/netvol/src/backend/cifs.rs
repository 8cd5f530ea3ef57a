//! CIFS/SMB backend.

use netvol_common::NetvolResult;

use super::credentials::{CredentialResolver, Credentials};
use super::{Backend, MountRequest, share_path};
use crate::config::CifsConfig;
use crate::exec::{CommandLine, CommandRunner};
use crate::registry::Options;

/// Option key for the owning uid.
pub const UID_OPT: &str = "uid";
/// Option key for the owning gid.
pub const GID_OPT: &str = "gid";
/// Option key for the SMB protocol version.
pub const VERS_OPT: &str = "vers";

/// Mounts `//<host>/<share>` with `mount -t cifs`.
#[derive(Debug, Clone, Default)]
pub struct CifsBackend {
    credentials: CredentialResolver,
}

impl CifsBackend {
    /// Create the backend, loading machine credentials from the configured directory.
    pub fn new(config: &CifsConfig) -> Self {
        Self::with_resolver(CredentialResolver::load(
            config.defaults.clone(),
            &config.netrc_dir(),
        ))
    }

    /// Create the backend with an explicit credential resolver.
    pub const fn with_resolver(credentials: CredentialResolver) -> Self {
        Self { credentials }
    }

    /// Server part of the remote path, used to look up machine credentials.
    pub fn host<'a>(name: &'a str, options: &'a Options) -> &'a str {
        let path = share_path(name, options);
        path.split('/').next().unwrap_or(path)
    }
}

/// Build the `-o` value for `mount -t cifs`.
pub fn mount_options(credentials: &Credentials, options: &Options) -> String {
    let mut opts = Vec::new();

    if let Some(user) = &credentials.username {
        opts.push(format!("username={user}"));
        if let Some(pass) = &credentials.password {
            opts.push(format!("password={pass}"));
        }
    } else {
        opts.push("guest".to_string());
    }
    if let Some(domain) = &credentials.domain {
        opts.push(format!("domain={domain}"));
    }
    if let Some(security) = &credentials.security {
        opts.push(format!("sec={security}"));
    }
    for (key, flag) in [(UID_OPT, "uid"), (GID_OPT, "gid"), (VERS_OPT, "vers")] {
        if let Some(value) = options.get(key).filter(|v| !v.is_empty()) {
            opts.push(format!("{flag}={value}"));
        }
    }
    opts.push("rw".to_string());
    opts.join(",")
}

impl Backend for CifsBackend {
    fn kind(&self) -> &'static str {
        "cifs"
    }

    fn fs_type(&self) -> &'static str {
        "cifs"
    }

    fn resolve_source(&mut self, name: &str, options: &Options) -> String {
        format!("//{}", share_path(name, options))
    }

    fn resolve_credentials(&self, name: &str, options: &Options) -> Option<Credentials> {
        Some(self.credentials.resolve(Self::host(name, options), options))
    }

    fn mount(&mut self, runner: &dyn CommandRunner, request: &MountRequest<'_>) -> NetvolResult<()> {
        let credentials = request.credentials.cloned().unwrap_or_default();
        let mut command = CommandLine::new("mount")
            .arg("-t")
            .arg(self.fs_type())
            .arg("-o")
            .arg(mount_options(&credentials, request.options))
            .arg(request.source)
            .path_arg(request.hostdir);
        if let Some(pass) = &credentials.password {
            command = command.secret(pass.clone());
        }

        tracing::info!(
            name = request.name,
            source = request.source,
            hostdir = %request.hostdir.display(),
            "Mounting CIFS volume"
        );
        runner.run(&command).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::backend::credentials::{Netrc, PASSWORD_OPT, USERNAME_OPT};
    use crate::registry::SHARE_OPT;
    use crate::testing::RecordingRunner;

    fn s(v: &str) -> Option<String> {
        Some(v.to_string())
    }

    fn opts(pairs: &[(&str, &str)]) -> Options {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn source_defaults_to_name() {
        let mut backend = CifsBackend::default();
        assert_eq!(backend.resolve_source("srv/shareA", &Options::new()), "//srv/shareA");
        assert_eq!(
            backend.resolve_source("shareA", &opts(&[(SHARE_OPT, "fileserver/projects")])),
            "//fileserver/projects"
        );
    }

    #[test]
    fn host_is_first_path_segment() {
        assert_eq!(CifsBackend::host("fileserver/projects", &Options::new()), "fileserver");
        assert_eq!(CifsBackend::host("nas", &Options::new()), "nas");
    }

    #[test]
    fn guest_when_no_username() {
        let opts = mount_options(&Credentials::default(), &opts(&[(VERS_OPT, "3.0")]));
        assert_eq!(opts, "guest,vers=3.0,rw");
    }

    #[test]
    fn full_option_string() {
        let creds = Credentials::new(s("alice"), s("pw"), s("CORP"), s("ntlmssp"));
        let opts = mount_options(
            &creds,
            &opts(&[(UID_OPT, "1000"), (GID_OPT, "100"), (VERS_OPT, "2.1")]),
        );
        assert_eq!(
            opts,
            "username=alice,password=pw,domain=CORP,sec=ntlmssp,uid=1000,gid=100,vers=2.1,rw"
        );
    }

    #[test]
    fn password_never_reaches_errors() {
        let runner = RecordingRunner::default();
        runner.fail("mount");
        let mut backend = CifsBackend::default();
        let options = opts(&[(USERNAME_OPT, "alice"), (PASSWORD_OPT, "hunter2")]);
        let creds = backend.resolve_credentials("srv/a", &options).unwrap();

        let err = backend
            .mount(
                &runner,
                &MountRequest {
                    name: "srv/a",
                    source: "//srv/a",
                    hostdir: Path::new("/mnt/srv/a"),
                    options: &options,
                    credentials: Some(&creds),
                },
            )
            .unwrap_err();
        let text = err.to_string();
        assert!(!text.contains("hunter2"));
        assert!(text.contains("password=****"));
        assert!(runner.mounts()[0].iter().any(|a| a.contains("password=hunter2")));
    }

    #[test]
    fn volume_username_beats_machine_and_defaults() {
        let netrc = Netrc::parse("machine srv login machine-user password machine-pw").unwrap();
        let resolver = CredentialResolver::new(
            Credentials::new(s("default-user"), s("default-pw"), None, None),
            Some(netrc),
        );
        let mut backend = CifsBackend::with_resolver(resolver);
        let creds = backend
            .resolve_credentials("srv/a", &opts(&[(USERNAME_OPT, "volume-user")]))
            .unwrap();
        assert_eq!(creds.username, s("volume-user"));
        assert_eq!(creds.password, s("machine-pw"));
    }
}
