//! Source allow-list for the datagram ingest channel.

use std::net::SocketAddr;

/// Patterns trusted by default: the local host.
pub const DEFAULT_APPROVED_SOURCES: [&str; 2] = ["localhost", "127.0.0.1"];

/// Fixed set of approved source address patterns.
///
/// A source is approved when its textual `ip:port` form contains any
/// pattern as a substring. The set is immutable after construction and is
/// shared between tasks without synchronization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceAllowList {
    patterns: Vec<String>,
}

impl SourceAllowList {
    /// Build an allow-list from patterns. Empty patterns are ignored since
    /// they would match every address.
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(Into::into)
                .filter(|p: &String| !p.is_empty())
                .collect(),
        }
    }

    /// Check whether datagrams from `source` may be dispatched.
    pub fn is_approved(&self, source: &SocketAddr) -> bool {
        self.is_approved_str(&source.to_string())
    }

    /// Same check against an address already rendered as text.
    pub fn is_approved_str(&self, source: &str) -> bool {
        self.patterns.iter().any(|p| source.contains(p.as_str()))
    }

    /// Configured patterns.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }
}

impl Default for SourceAllowList {
    fn default() -> Self {
        Self::new(DEFAULT_APPROVED_SOURCES)
    }
}
