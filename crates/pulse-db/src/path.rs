use std::fmt;

use crate::store::StoreError;

/// Characters that may never appear inside a path segment.
const FORBIDDEN: &[char] = &['.', '#', '$', '[', ']', '/'];

/// A validated location in the tree, e.g. `chatRooms/a_b/messages`.
/// The root is the empty path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StorePath(String);

pub fn check_segment(segment: &str) -> Result<(), StoreError> {
    if segment.is_empty() || segment.contains(FORBIDDEN) || segment.chars().any(char::is_control) {
        return Err(StoreError::InvalidPath(segment.to_string()));
    }
    Ok(())
}

impl StorePath {
    pub fn root() -> Self {
        Self(String::new())
    }

    /// Top-level collection named by a compile-time constant.
    pub fn collection(name: &'static str) -> Self {
        debug_assert!(check_segment(name).is_ok(), "invalid collection name {name}");
        Self(name.to_string())
    }

    /// Parse a slash-separated path. Leading and trailing slashes are ignored.
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        Self::root().join(raw)
    }

    /// Append exactly one segment.
    pub fn child(&self, segment: &str) -> Result<Self, StoreError> {
        check_segment(segment)?;
        if self.is_root() {
            Ok(Self(segment.to_string()))
        } else {
            Ok(Self(format!("{}/{}", self.0, segment)))
        }
    }

    /// Append a relative, possibly multi-segment path.
    pub fn join(&self, relative: &str) -> Result<Self, StoreError> {
        let trimmed = relative.trim_matches('/');
        if trimmed.is_empty() {
            return Ok(self.clone());
        }
        let mut path = self.clone();
        for segment in trimmed.split('/') {
            path = path.child(segment)?;
        }
        Ok(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// True when `descendant` lies strictly below this path.
    pub fn is_ancestor_of(&self, descendant: &StorePath) -> bool {
        if self.is_root() {
            return !descendant.is_root();
        }
        descendant.0.len() > self.0.len()
            && descendant.0.starts_with(&self.0)
            && descendant.0.as_bytes()[self.0.len()] == b'/'
    }

    /// A write at one path is visible to a reader of the other.
    pub fn overlaps(&self, other: &StorePath) -> bool {
        self == other || self.is_ancestor_of(other) || other.is_ancestor_of(self)
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}
