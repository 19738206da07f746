//! Hosts exempt from the authentication gate.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::RwLock;

/// Decides whether a host bypasses the session gate.
pub trait Allowlist: Send + Sync {
    /// Returns `true` if requests for `host` are proxied without a session.
    fn is_allowed(&self, host: &str) -> bool;
}

/// A replaceable set of allowlisted hosts.
///
/// Entries are exact hostnames (`status.example.com`) or domain suffixes
/// starting with a dot (`.public.example.com`). A port on the request host is
/// ignored.
#[derive(Debug, Default)]
pub struct HostAllowlist {
    hosts: RwLock<Arc<HashSet<String>>>,
}

impl HostAllowlist {
    /// Create an allowlist from the given entries.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: RwLock::new(Arc::new(hosts.into_iter().map(Into::into).collect())),
        }
    }

    /// Parse a comma-separated list of entries, skipping blanks.
    #[must_use]
    pub fn parse_csv(csv: &str) -> Self {
        Self::new(
            csv.split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty()),
        )
    }

    /// Replace all entries at once.
    pub fn replace<I, S>(&self, hosts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let next: HashSet<String> = hosts.into_iter().map(Into::into).collect();
        tracing::debug!(count = next.len(), "Replaced allowlist");
        *self.hosts.write() = Arc::new(next);
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hosts.read().len()
    }

    /// Returns `true` if there are no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.hosts.read().is_empty()
    }
}

impl Allowlist for HostAllowlist {
    fn is_allowed(&self, host: &str) -> bool {
        let hosts = Arc::clone(&self.hosts.read());
        let name = strip_port(host);

        hosts.contains(name)
            || hosts
                .iter()
                .any(|entry| entry.starts_with('.') && name.ends_with(entry.as_str()))
    }
}

/// Strip a trailing `:port` from a host header value.
#[must_use]
pub fn strip_port(host: &str) -> &str {
    if let Some(rest) = host.strip_prefix('[') {
        // [v6]:port
        return rest.split_once(']').map_or(host, |(addr, _)| addr);
    }
    match host.rsplit_once(':') {
        Some((name, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => name,
        _ => host,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_and_suffix_entries() {
        let allowlist = HostAllowlist::parse_csv("httpbin.org, .public.example.com,");
        assert_eq!(allowlist.len(), 2);

        assert!(allowlist.is_allowed("httpbin.org"));
        assert!(allowlist.is_allowed("httpbin.org:443"));
        assert!(allowlist.is_allowed("docs.public.example.com"));
        assert!(!allowlist.is_allowed("public.example.com"));
        assert!(!allowlist.is_allowed("github.com"));
        assert!(!allowlist.is_allowed("evilhttpbin.org"));
    }

    #[test]
    fn replace_swaps_entries() {
        let allowlist = HostAllowlist::new(["a.example.com"]);
        assert!(allowlist.is_allowed("a.example.com"));

        allowlist.replace(["b.example.com"]);
        assert!(!allowlist.is_allowed("a.example.com"));
        assert!(allowlist.is_allowed("b.example.com"));
    }

    #[test]
    fn empty_allows_nothing() {
        let allowlist = HostAllowlist::default();
        assert!(allowlist.is_empty());
        assert!(!allowlist.is_allowed("example.com"));
    }

    #[test]
    fn port_stripping() {
        assert_eq!(strip_port("example.com:8080"), "example.com");
        assert_eq!(strip_port("example.com"), "example.com");
        assert_eq!(strip_port("[::1]:443"), "::1");
        assert_eq!(strip_port("example.com:"), "example.com:");
    }
}
