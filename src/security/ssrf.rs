//! SSRF protection.
//!
//! Two independent checks:
//! - [`AllowedHostSet`]: every outbound proxy target must point at an
//!   authority taken from the configured backend URLs. This catches drift
//!   and path tricks that would change the authority of a built target; it
//!   does not protect against a configuration that is itself hostile.
//! - [`check_url`]: client-supplied `url` fields must be http(s) and must
//!   not name loopback, private or link-local hosts.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use thiserror::Error;
use url::{Host, Url};

/// Why a client-supplied URL was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UrlRejection {
    #[error("value is not a string")]
    NotAString,

    #[error("malformed URL")]
    Malformed,

    #[error("scheme `{0}` is not http or https")]
    Scheme(String),

    #[error("host `{0}` is blocked")]
    BlockedHost(String),

    #[error("address {0} is in a private or loopback range")]
    PrivateAddress(IpAddr),
}

/// Authorities (`host[:port]`) of every configured backend.
///
/// The port is kept only when it differs from the scheme default, which is
/// what `Url::port` reports.
#[derive(Debug, Clone, Default)]
pub struct AllowedHostSet {
    hosts: HashSet<String>,
}

impl AllowedHostSet {
    /// Build from backend base URLs. Unparseable URLs contribute nothing.
    pub fn from_urls<'a, I>(urls: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let hosts = urls
            .into_iter()
            .filter_map(|raw| Url::parse(raw).ok())
            .filter_map(|url| authority(&url))
            .collect();
        Self { hosts }
    }

    /// True if the target's authority belongs to a registered backend.
    pub fn is_allowed_target(&self, target: &Url) -> bool {
        authority(target)
            .map(|a| self.hosts.contains(&a))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }
}

/// `host[:port]` of a URL, or `None` when it has no host.
pub fn authority(url: &Url) -> Option<String> {
    let host = url.host_str().filter(|h| !h.is_empty())?;
    Some(match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    })
}

/// Validate a client-supplied URL.
pub fn check_url(candidate: &str) -> Result<Url, UrlRejection> {
    let url = Url::parse(candidate).map_err(|_| UrlRejection::Malformed)?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(UrlRejection::Scheme(url.scheme().to_string()));
    }

    match url.host() {
        None => return Err(UrlRejection::Malformed),
        Some(Host::Domain(domain)) => {
            if domain.trim_end_matches('.').eq_ignore_ascii_case("localhost") {
                return Err(UrlRejection::BlockedHost(domain.to_string()));
            }
        }
        Some(Host::Ipv4(addr)) => {
            if is_blocked_ipv4(addr) {
                return Err(UrlRejection::PrivateAddress(IpAddr::V4(addr)));
            }
        }
        Some(Host::Ipv6(addr)) => {
            if is_blocked_ipv6(addr) {
                return Err(UrlRejection::PrivateAddress(IpAddr::V6(addr)));
            }
        }
    }

    Ok(url)
}

/// Convenience wrapper over [`check_url`].
pub fn is_safe_url(candidate: &str) -> bool {
    check_url(candidate).is_ok()
}

fn is_blocked_ipv4(addr: Ipv4Addr) -> bool {
    addr.is_loopback()          // 127.0.0.0/8
        || addr.is_private()    // 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16
        || addr.is_link_local() // 169.254.0.0/16
        || addr.is_unspecified()
}

fn is_blocked_ipv6(addr: Ipv6Addr) -> bool {
    if addr.is_loopback() || addr.is_unspecified() {
        return true;
    }
    // ::ffff:a.b.c.d
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_blocked_ipv4(v4);
    }
    let first = addr.segments()[0];
    // fc00::/7 unique local, fe80::/10 link-local
    (first & 0xfe00) == 0xfc00 || (first & 0xffc0) == 0xfe80
}
