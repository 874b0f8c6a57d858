//! Path addressing for settings tree nodes

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered sequence of local ids from the root to a node.
///
/// The root path is empty. Paths are the stable system-wide identifier used
/// for lookup and persistence scoping; the UI layer encodes them as dotted
/// strings for callback payloads, the core only works with the segment form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct NodePath(Vec<String>);

impl NodePath {
    /// The root path (no segments).
    pub fn root() -> Self {
        NodePath(Vec::new())
    }

    /// Build a path from any iterable of segment ids.
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        NodePath(segments.into_iter().map(Into::into).collect())
    }

    /// Parse a dotted path string. An empty string is the root.
    pub fn parse_dotted(text: &str) -> Self {
        if text.is_empty() {
            return Self::root();
        }
        NodePath(text.split('.').map(str::to_string).collect())
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Final segment, if any.
    pub fn leaf(&self) -> Option<&str> {
        self.0.last().map(String::as_str)
    }

    /// Child path extended by one segment.
    pub fn join(&self, segment: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.to_string());
        NodePath(segments)
    }

    pub fn push(&mut self, segment: String) {
        self.0.push(segment);
    }

    /// Dotted rendering used by persistence and callback encoding.
    pub fn dotted(&self) -> String {
        self.0.join(".")
    }

    /// Segments of `self` relative to `base`, when `base` is a prefix.
    pub fn strip_prefix(&self, base: &NodePath) -> Option<&[String]> {
        if self.0.len() < base.0.len() {
            return None;
        }
        if self.0[..base.0.len()] != base.0[..] {
            return None;
        }
        Some(&self.0[base.0.len()..])
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "<root>")
        } else {
            write!(f, "{}", self.dotted())
        }
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for NodePath {
    fn from(segments: [S; N]) -> Self {
        NodePath::from_segments(segments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dotted_round_trip() {
        let path = NodePath::from(["telegram", "bot_token"]);
        assert_eq!(path.dotted(), "telegram.bot_token");
        assert_eq!(NodePath::parse_dotted("telegram.bot_token"), path);
        assert_eq!(NodePath::parse_dotted(""), NodePath::root());
    }

    #[test]
    fn join_and_strip_prefix() {
        let base = NodePath::from(["plugins", "chat_sync"]);
        let leaf = base.join("interval");
        assert_eq!(leaf.leaf(), Some("interval"));
        assert_eq!(leaf.strip_prefix(&base).unwrap(), ["interval".to_string()]);
        assert!(base.strip_prefix(&leaf).is_none());
    }
}
