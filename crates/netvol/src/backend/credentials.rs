//! CIFS credential resolution.
//!
//! Credentials are merged field by field with the precedence
//! per-volume option > machine credentials file > driver defaults.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use netvol_common::{NetvolError, NetvolResult};

use crate::registry::Options;

/// Option key for the CIFS username.
pub const USERNAME_OPT: &str = "username";
/// Option key for the CIFS password.
pub const PASSWORD_OPT: &str = "password";
/// Option key for the CIFS domain.
pub const DOMAIN_OPT: &str = "domain";
/// Option key for the CIFS security mode.
pub const SECURITY_OPT: &str = "security";

/// CIFS login credentials. Empty fields are treated as unset.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Username.
    pub username: Option<String>,
    /// Password.
    pub password: Option<String>,
    /// Domain.
    pub domain: Option<String>,
    /// Security mode (`sec=`).
    pub security: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .field("domain", &self.domain)
            .field("security", &self.security)
            .finish()
    }
}

impl Credentials {
    /// Build credentials, dropping empty values.
    pub fn new(
        username: Option<String>,
        password: Option<String>,
        domain: Option<String>,
        security: Option<String>,
    ) -> Self {
        Self {
            username: non_empty(username),
            password: non_empty(password),
            domain: non_empty(domain),
            security: non_empty(security),
        }
    }

    /// Credentials carried in per-volume options.
    pub fn from_options(options: &Options) -> Self {
        let get = |key: &str| options.get(key).cloned();
        Self::new(
            get(USERNAME_OPT),
            get(PASSWORD_OPT),
            get(DOMAIN_OPT),
            get(SECURITY_OPT),
        )
    }

    /// Fill every unset field from `fallback`.
    #[must_use]
    pub fn or(self, fallback: &Self) -> Self {
        Self {
            username: self.username.or_else(|| fallback.username.clone()),
            password: self.password.or_else(|| fallback.password.clone()),
            domain: self.domain.or_else(|| fallback.domain.clone()),
            security: self.security.or_else(|| fallback.security.clone()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Parsed machine credentials file in netrc format.
#[derive(Debug, Default, Clone)]
pub struct Netrc {
    machines: HashMap<String, Credentials>,
    default: Option<Credentials>,
}

impl Netrc {
    /// Parse netrc text.
    ///
    /// Recognised keys: `login`/`username`, `password`, `domain`, `security`.
    /// `account` is accepted and ignored, `macdef` bodies are skipped.
    pub fn parse(text: &str) -> NetvolResult<Self> {
        let mut netrc = Self::default();
        let mut current: Option<(Option<String>, Credentials)> = None;
        let mut lines = text.lines();

        while let Some(line) = lines.next() {
            let mut tokens = line.split_whitespace();
            while let Some(token) = tokens.next() {
                if token.starts_with('#') {
                    break;
                }
                match token {
                    "machine" => {
                        netrc.finish(current.take());
                        let host = tokens.next().ok_or_else(|| parse_error("machine without a name"))?;
                        current = Some((Some(host.to_string()), Credentials::default()));
                    }
                    "default" => {
                        netrc.finish(current.take());
                        current = Some((None, Credentials::default()));
                    }
                    "macdef" => {
                        netrc.finish(current.take());
                        for body in lines.by_ref() {
                            if body.trim().is_empty() {
                                break;
                            }
                        }
                        break;
                    }
                    key => {
                        let value = tokens
                            .next()
                            .ok_or_else(|| parse_error(&format!("missing value for {key}")))?;
                        let (_, creds) = current
                            .as_mut()
                            .ok_or_else(|| parse_error(&format!("{key} outside a machine block")))?;
                        let value = Some(value.to_string());
                        match key {
                            "login" | "username" => creds.username = value,
                            "password" => creds.password = value,
                            "domain" => creds.domain = value,
                            "security" => creds.security = value,
                            "account" => {}
                            other => return Err(parse_error(&format!("unknown token {other}"))),
                        }
                    }
                }
            }
        }
        netrc.finish(current);
        Ok(netrc)
    }

    fn finish(&mut self, block: Option<(Option<String>, Credentials)>) {
        match block {
            Some((Some(host), creds)) => {
                self.machines.entry(host).or_insert(creds);
            }
            Some((None, creds)) => self.default = Some(creds),
            None => {}
        }
    }

    /// Credentials for `host`, falling back to the `default` block.
    pub fn machine(&self, host: &str) -> Option<&Credentials> {
        self.machines.get(host).or(self.default.as_ref())
    }
}

fn parse_error(message: &str) -> NetvolError {
    NetvolError::Config {
        message: format!("invalid netrc: {message}"),
    }
}

/// Merges per-volume, machine and default credentials.
#[derive(Debug, Default, Clone)]
pub struct CredentialResolver {
    defaults: Credentials,
    netrc: Option<Netrc>,
}

impl CredentialResolver {
    /// Create a resolver from driver defaults and an optional machine file.
    pub const fn new(defaults: Credentials, netrc: Option<Netrc>) -> Self {
        Self { defaults, netrc }
    }

    /// Load `<dir>/.netrc`, degrading to "no machine credentials" on failure.
    pub fn load(defaults: Credentials, dir: &Path) -> Self {
        let path: PathBuf = dir.join(".netrc");
        let netrc = match fs::read_to_string(&path) {
            Ok(text) => match Netrc::parse(&text) {
                Ok(netrc) => Some(netrc),
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "Ignoring credentials file");
                    None
                }
            },
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "No credentials file");
                None
            }
        };
        Self::new(defaults, netrc)
    }

    /// Credentials for `host` before per-volume overrides.
    pub fn for_host(&self, host: &str) -> Credentials {
        self.netrc
            .as_ref()
            .and_then(|n| n.machine(host))
            .cloned()
            .unwrap_or_default()
            .or(&self.defaults)
    }

    /// Fully merged credentials for a volume.
    pub fn resolve(&self, host: &str, options: &Options) -> Credentials {
        let merged = Credentials::from_options(options).or(&self.for_host(host));
        tracing::debug!(host, credentials = ?merged, "Resolved credentials");
        merged
    }
}
