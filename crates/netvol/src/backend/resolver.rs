//! Hostname resolution for EFS exports.

use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use std::time::{Duration, Instant};

use hickory_resolver::Resolver;
use hickory_resolver::config::{NameServerConfigGroup, ResolverConfig, ResolverOpts};
use netvol_common::{NetvolError, NetvolResult};

const DNS_PORT: u16 = 53;

/// Resolves a hostname to a single address.
pub trait NameLookup: Send {
    /// Return the first address for `host`.
    fn lookup(&self, host: &str) -> NetvolResult<IpAddr>;
}

/// [`NameLookup`] against a DNS server.
pub struct DnsLookup {
    resolver: Resolver,
}

impl DnsLookup {
    /// Query `nameserver` (`ip` or `ip:port`), or the system resolvers if `None`.
    pub fn new(nameserver: Option<&str>) -> NetvolResult<Self> {
        let resolver = match nameserver {
            Some(ns) => {
                let addr = parse_nameserver(ns)?;
                let group = NameServerConfigGroup::from_ips_clear(&[addr.ip()], addr.port(), true);
                Resolver::new(
                    ResolverConfig::from_parts(None, vec![], group),
                    ResolverOpts::default(),
                )
            }
            None => Resolver::from_system_conf(),
        }
        .map_err(|e| NetvolError::Config {
            message: format!("cannot create DNS resolver: {e}"),
        })?;
        Ok(Self { resolver })
    }
}

impl NameLookup for DnsLookup {
    fn lookup(&self, host: &str) -> NetvolResult<IpAddr> {
        let resolve_err = |message: String| NetvolError::Resolve {
            host: host.to_string(),
            message,
        };
        let response = self
            .resolver
            .lookup_ip(host)
            .map_err(|e| resolve_err(e.to_string()))?;
        response
            .iter()
            .next()
            .ok_or_else(|| resolve_err("no addresses returned".to_string()))
    }
}

fn parse_nameserver(ns: &str) -> NetvolResult<SocketAddr> {
    ns.parse::<SocketAddr>()
        .or_else(|_| ns.parse::<IpAddr>().map(|ip| SocketAddr::new(ip, DNS_PORT)))
        .map_err(|_| NetvolError::Config {
            message: format!("invalid nameserver address: {ns}"),
        })
}

/// Caching front for a [`NameLookup`].
///
/// Successful lookups are kept for `ttl`, or for the process lifetime when no
/// TTL is configured. Failures are never cached.
pub struct NameResolver {
    lookup: Box<dyn NameLookup>,
    ttl: Option<Duration>,
    cache: HashMap<String, (IpAddr, Instant)>,
}

impl NameResolver {
    /// Wrap `lookup` with a cache.
    pub fn new(lookup: Box<dyn NameLookup>, ttl: Option<Duration>) -> Self {
        Self {
            lookup,
            ttl,
            cache: HashMap::new(),
        }
    }

    /// Resolve `host`, consulting the cache first.
    pub fn resolve(&mut self, host: &str) -> NetvolResult<IpAddr> {
        if let Some(&(addr, at)) = self.cache.get(host) {
            if self.ttl.is_none_or(|ttl| at.elapsed() < ttl) {
                return Ok(addr);
            }
            tracing::debug!(host, "Cached address expired");
        }

        tracing::debug!(host, "Attempting to resolve");
        let addr = self.lookup.lookup(host)?;
        tracing::debug!(host, %addr, "Resolved address");
        self.cache.insert(host.to_string(), (addr, Instant::now()));
        Ok(addr)
    }

    /// Drop the cached address for `host`.
    pub fn forget(&mut self, host: &str) {
        self.cache.remove(host);
    }
}
