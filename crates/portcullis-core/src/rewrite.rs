//! Host rewriting.
//!
//! A rewrite table maps hostname suffixes to backend targets. A target is
//! either a bare hostname (`old.example.com=new.example.com`) or a full URL
//! (`legacy.corp=https://modern.corp.example.com:8443`) that additionally
//! carries a scheme and port.
//!
//! Only the matched suffix is substituted, so subdomains survive the rewrite:
//! with `api.legacy.com=https://api.modern.com`, the host
//! `svc.api.legacy.com` resolves to `svc.api.modern.com`.
//!
//! Rules are kept sorted by suffix length (longest first, ties broken
//! lexicographically) so overlapping suffixes always resolve the same way.
//! Matching is case-sensitive and aligned on label boundaries: the suffix
//! `example.com` matches `example.com` and `www.example.com` but not
//! `badexample.com`.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::RwLock;
use url::Url;

use crate::allowlist::strip_port;
use crate::error::{CoreError, Result};
use crate::source::DocumentSource;

/// The resolved backend descriptor for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RewriteResult {
    /// Backend hostname. Carries the inbound port unless a URL rule matched.
    pub host: String,
    /// `http`, `https`, or empty to keep the scheme of the request.
    pub scheme: String,
    /// Port number, or empty.
    pub port: String,
    /// The full target URL of the matching rule, or empty when no URL rule
    /// matched.
    pub full_url: String,
}

impl RewriteResult {
    /// A result that leaves the host untouched.
    #[must_use]
    pub fn unchanged(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Self::default()
        }
    }

    /// Returns `true` if a URL rule supplied scheme and port.
    #[must_use]
    pub fn has_url(&self) -> bool {
        !self.full_url.is_empty()
    }

    /// The backend base URL (`scheme://host[:port]`) when the scheme is known.
    #[must_use]
    pub fn base_url(&self) -> Option<String> {
        if self.scheme.is_empty() {
            return None;
        }
        let mut base = format!("{}://{}", self.scheme, self.host);
        if !self.port.is_empty() {
            base.push(':');
            base.push_str(&self.port);
        }
        Some(base)
    }
}

/// A single suffix rewrite rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RewriteRule {
    /// The hostname suffix this rule applies to.
    pub suffix: String,
    /// A bare hostname or a full URL.
    pub target: String,
}

impl RewriteRule {
    /// Create a rule.
    #[must_use]
    pub fn new(suffix: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            suffix: suffix.into(),
            target: target.into(),
        }
    }

    /// Returns `true` if `host` ends with this rule's suffix on a label
    /// boundary.
    #[must_use]
    pub fn matches(&self, host: &str) -> bool {
        if self.suffix.is_empty() {
            return false;
        }
        match host.strip_suffix(self.suffix.as_str()) {
            Some("") => true,
            Some(rest) => self.suffix.starts_with('.') || rest.ends_with('.'),
            None => false,
        }
    }

    /// Rewrite `host`, which must match this rule.
    fn apply(&self, host: &str) -> RewriteResult {
        let prefix = &host[..host.len() - self.suffix.len()];

        if self.target.contains("://") {
            if let Ok(url) = Url::parse(&self.target) {
                if let Some(target_host) = url.host_str() {
                    return RewriteResult {
                        host: format!("{prefix}{target_host}"),
                        scheme: url.scheme().to_string(),
                        port: url.port().map(|p| p.to_string()).unwrap_or_default(),
                        full_url: self.target.clone(),
                    };
                }
            }
        }

        RewriteResult::unchanged(&format!("{prefix}{}", self.target))
    }
}

/// An immutable, ordered set of rewrite rules.
#[derive(Debug, Clone, Default)]
pub struct RewriteTable {
    entries: BTreeMap<String, String>,
    rules: Vec<RewriteRule>,
}

impl RewriteTable {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from `suffix -> target` pairs.
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::compile(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    /// Parse `from1=to1,from2=to2` assignments.
    ///
    /// An empty string yields an empty table.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::MissingAssignment` for an element without `=`.
    pub fn parse_csv(csv: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();
        if csv.is_empty() {
            return Ok(Self::new());
        }
        for element in csv.split(',') {
            let (from, to) = element
                .split_once('=')
                .ok_or_else(|| CoreError::MissingAssignment(element.to_string()))?;
            entries.insert(from.to_string(), to.to_string());
        }
        Ok(Self::compile(entries))
    }

    /// Return a new table with `entries` merged over this one.
    #[must_use]
    pub fn merged<I>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut merged = self.entries.clone();
        merged.extend(entries);
        Self::compile(merged)
    }

    fn compile(entries: BTreeMap<String, String>) -> Self {
        let mut rules: Vec<RewriteRule> = entries
            .iter()
            .map(|(suffix, target)| RewriteRule::new(suffix.as_str(), target.as_str()))
            .collect();
        rules.sort_by(|a, b| {
            b.suffix
                .len()
                .cmp(&a.suffix.len())
                .then_with(|| a.suffix.cmp(&b.suffix))
        });
        Self { entries, rules }
    }

    /// Resolve `host` against the first (longest) matching rule.
    #[must_use]
    pub fn resolve(&self, host: &str) -> RewriteResult {
        self.rules
            .iter()
            .find(|rule| rule.matches(host))
            .map_or_else(|| RewriteResult::unchanged(host), |rule| rule.apply(host))
    }

    /// Returns `true` if any rule matches `host`.
    #[must_use]
    pub fn matches_any(&self, host: &str) -> bool {
        self.rules.iter().any(|rule| rule.matches(host))
    }

    /// The rules in match order.
    #[must_use]
    pub fn rules(&self) -> &[RewriteRule] {
        &self.rules
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Returns `true` if there are no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// The live rewrite table with strict-mode and refresh support.
///
/// Readers take a cheap `Arc` snapshot; refreshes build a new table and swap
/// it in, so a slow fetch never blocks request handling.
#[derive(Debug)]
pub struct RewriteEngine {
    table: RwLock<Arc<RewriteTable>>,
    strict: bool,
    source: Option<DocumentSource>,
}

impl RewriteEngine {
    /// Create an engine over `table`.
    ///
    /// With `strict` set, only hosts matching some rule are allowed.
    #[must_use]
    pub fn new(table: RewriteTable, strict: bool) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
            strict,
            source: None,
        }
    }

    /// Attach a remote rule source used by [`RewriteEngine::refresh`].
    #[must_use]
    pub fn with_source(mut self, source: DocumentSource) -> Self {
        self.source = Some(source);
        self
    }

    /// The current table.
    #[must_use]
    pub fn table(&self) -> Arc<RewriteTable> {
        Arc::clone(&self.table.read())
    }

    /// Resolve `host` against the current table.
    #[must_use]
    pub fn resolve(&self, host: &str) -> RewriteResult {
        self.table().resolve(host)
    }

    /// Resolve a `host[:port]` authority.
    ///
    /// Rules match on the hostname alone. When no URL rule matched, the
    /// inbound port is carried over to the resolved host.
    #[must_use]
    pub fn resolve_authority(&self, authority: &str) -> RewriteResult {
        let name = strip_port(authority);
        let mut result = self.resolve(name);
        if !result.has_url() && name.len() < authority.len() {
            result.host.push_str(&authority[name.len()..]);
        }
        result
    }

    /// Returns whether requests for `host` may be served at all.
    #[must_use]
    pub fn allowed(&self, host: &str) -> bool {
        !self.strict || self.table().matches_any(host)
    }

    /// Whether strict mode is on.
    #[must_use]
    pub const fn is_strict(&self) -> bool {
        self.strict
    }

    /// Merge `entries` into the live table.
    ///
    /// The write lock is held from read to swap so concurrent merges never
    /// drop each other's rules.
    pub fn merge<I>(&self, entries: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut table = self.table.write();
        let next = Arc::new(table.merged(entries));
        *table = next;
    }

    /// Fetch the remote rule document and merge it into the live table.
    ///
    /// Without a configured source this does nothing. Returns the number of
    /// rules in the table afterwards.
    ///
    /// # Errors
    ///
    /// Returns the fetch or decode error; the table is left untouched.
    pub async fn refresh(&self) -> Result<usize> {
        let Some(source) = &self.source else {
            return Ok(self.table().len());
        };

        let entries: BTreeMap<String, String> = source.fetch().await?;
        let fetched = entries.len();
        self.merge(entries);

        let total = self.table().len();
        tracing::debug!(url = %source.url(), fetched, total, "Refreshed host rules");
        Ok(total)
    }
}

impl Default for RewriteEngine {
    fn default() -> Self {
        Self::new(RewriteTable::new(), false)
    }
}
