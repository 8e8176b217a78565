//! Dot-notation member paths.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A path of member names, written in dot notation (e.g. `customer.orders`).
///
/// The empty path denotes the root object itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberPath(Vec<String>);

impl MemberPath {
    /// The empty (root) path.
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Parse a dot-separated path. Empty segments are ignored.
    pub fn parse(path: &str) -> Self {
        Self(
            path.split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    /// Build from segments.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Path segments.
    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check if the path has no segments.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment.
    pub fn last(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// First segment.
    pub fn first(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// Parent path (all segments except the last).
    pub fn parent(&self) -> Option<MemberPath> {
        if self.0.is_empty() {
            None
        } else {
            Some(Self(self.0[..self.0.len() - 1].to_vec()))
        }
    }

    /// Path with one more segment.
    pub fn child(&self, segment: impl Into<String>) -> MemberPath {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// Concatenate two paths.
    pub fn join(&self, other: &MemberPath) -> MemberPath {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// Check whether `prefix` is a prefix of this path.
    pub fn starts_with(&self, prefix: &MemberPath) -> bool {
        self.0.len() >= prefix.0.len() && self.0[..prefix.0.len()] == prefix.0[..]
    }

    /// Strip a prefix, returning the remainder.
    pub fn strip_prefix(&self, prefix: &MemberPath) -> Option<MemberPath> {
        if self.starts_with(prefix) {
            Some(Self(self.0[prefix.0.len()..].to_vec()))
        } else {
            None
        }
    }

    /// First `len` segments.
    pub fn prefix(&self, len: usize) -> MemberPath {
        Self(self.0[..len.min(self.0.len())].to_vec())
    }
}

impl fmt::Display for MemberPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join("."))
    }
}

impl From<&str> for MemberPath {
    fn from(path: &str) -> Self {
        MemberPath::parse(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_display() {
        let path = MemberPath::parse("customer.orders");
        assert_eq!(path.len(), 2);
        assert_eq!(path.first(), Some("customer"));
        assert_eq!(path.last(), Some("orders"));
        assert_eq!(path.to_string(), "customer.orders");
        assert!(MemberPath::parse("").is_root());
    }

    #[test]
    fn test_prefix_helpers() {
        let path = MemberPath::parse("a.b.c");
        assert!(path.starts_with(&MemberPath::parse("a.b")));
        assert!(!path.starts_with(&MemberPath::parse("b")));
        assert_eq!(
            path.strip_prefix(&MemberPath::parse("a")),
            Some(MemberPath::parse("b.c"))
        );
        assert_eq!(path.parent(), Some(MemberPath::parse("a.b")));
        assert_eq!(MemberPath::root().parent(), None);
        assert_eq!(path.prefix(1), MemberPath::parse("a"));
        assert_eq!(
            MemberPath::parse("a").join(&MemberPath::parse("b")),
            MemberPath::parse("a.b")
        );
    }
}
