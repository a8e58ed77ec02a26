//! Derived trusted-host set and referrer validation.
//!
//! The trusted set is never independently authoritative: it is always
//! recomputable as the loopback hostnames unioned with the hostnames of every
//! registered backend, and it is rebuilt after every registry mutation so it
//! cannot drift from the registry.
use std::{collections::BTreeSet, sync::Arc};

use arc_swap::ArcSwap;

/// Hostnames that are always trusted regardless of registry contents.
const LOOPBACK_HOSTS: [&str; 3] = ["localhost", "127.0.0.1", "::1"];

/// Current trusted-host set plus the statically configured referrer domain
/// allowlist.
pub struct TrustedHosts {
    hosts: ArcSwap<BTreeSet<String>>,
    allowed_domains: Vec<String>,
}

impl TrustedHosts {
    /// Create the set with only loopback hosts trusted, plus a static domain
    /// allowlist for referrer suffix matching.
    pub fn new(allowed_domains: Vec<String>) -> Self {
        Self {
            hosts: ArcSwap::from_pointee(Self::base_set()),
            allowed_domains,
        }
    }

    fn base_set() -> BTreeSet<String> {
        LOOPBACK_HOSTS.iter().map(|h| h.to_string()).collect()
    }

    /// Recompute the set from the hostnames of all registered backends.
    pub fn rebuild<'a>(&self, backend_hosts: impl IntoIterator<Item = &'a str>) {
        let mut hosts = Self::base_set();
        hosts.extend(backend_hosts.into_iter().map(|h| h.to_string()));
        self.hosts.store(Arc::new(hosts));
    }

    /// Whether a bare hostname is currently trusted.
    pub fn is_trusted_host(&self, host: &str) -> bool {
        self.hosts.load().contains(host)
    }

    /// Validate a request's referrer.
    ///
    /// A missing referrer is allowed. A present referrer must parse as a URL
    /// whose host is either in the trusted set or equal to / a subdomain of a
    /// domain on the static allowlist.
    pub fn referrer_allowed(&self, referrer: Option<&str>) -> bool {
        let Some(referrer) = referrer else {
            return true;
        };

        let Some(host) = url::Url::parse(referrer)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.to_string()))
        else {
            // Unparseable referrer header: treat like an untrusted origin.
            return false;
        };

        if self.is_trusted_host(&host) {
            return true;
        }

        self.allowed_domains
            .iter()
            .any(|domain| host == *domain || host.ends_with(&format!(".{domain}")))
    }

    /// Sorted snapshot of the trusted hosts (diagnostics only).
    pub fn snapshot(&self) -> Vec<String> {
        self.hosts.load().iter().cloned().collect()
    }
}
