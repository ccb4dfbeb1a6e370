//! Common types used throughout duosync.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Identifier of a synchronization session.
///
/// Both endpoints of a session share the identifier; together with the
/// alpha/beta flag it names per-endpoint storage such as caches and staging
/// roots.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(String);

impl SessionId {
    /// Create a SessionId from a string.
    ///
    /// # Errors
    /// - Returns error if id is empty or contains a path separator
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "SessionId cannot be empty".to_string(),
            ));
        }
        if id.contains('/') || id.contains('\\') {
            return Err(crate::Error::InvalidInput(
                "SessionId cannot contain separators".to_string(),
            ));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random session identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A location inside an entry tree, relative to the tree root.
///
/// The textual form joins components with `/` and has no leading or trailing
/// separator. The empty string denotes the root.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SyncPath {
    components: Vec<String>,
}

impl SyncPath {
    /// Create a root path.
    pub fn root() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Create a path from string components.
    ///
    /// # Errors
    /// - Returns error if any component is empty or contains a separator
    pub fn from_components(components: Vec<String>) -> crate::Result<Self> {
        for comp in &components {
            validate_component(comp)?;
        }
        Ok(Self { components })
    }

    /// Parse a `/`-joined path string.
    ///
    /// The empty string is the root. Leading, trailing and doubled separators
    /// are rejected since they would produce empty components.
    pub fn parse(path: &str) -> crate::Result<Self> {
        if path.is_empty() {
            return Ok(Self::root());
        }

        let components: Vec<String> = path.split('/').map(String::from).collect();
        Self::from_components(components)
            .map_err(|_| crate::Error::InvalidPath(format!("'{}'", path)))
    }

    /// Check if this is the root path.
    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Get the parent path, if any.
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            None
        } else {
            let mut components = self.components.clone();
            components.pop();
            Some(Self { components })
        }
    }

    /// Get the last component.
    pub fn leaf(&self) -> Option<&str> {
        self.components.last().map(|s| s.as_str())
    }

    /// Join this path with a child component.
    pub fn join(&self, child: &str) -> crate::Result<Self> {
        validate_component(child)?;
        let mut components = self.components.clone();
        components.push(child.to_string());
        Ok(Self { components })
    }

    /// Get the path components.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    /// Number of components; zero for the root.
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// Check whether `self` equals `other` or lies beneath it.
    pub fn starts_with(&self, other: &SyncPath) -> bool {
        self.components.starts_with(&other.components)
    }
}

/// Join a textual tree path with a child name.
///
/// Used by tree walkers that build paths incrementally without validating
/// names already known to be valid.
pub fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

fn validate_component(comp: &str) -> crate::Result<()> {
    if comp.is_empty() {
        return Err(crate::Error::InvalidPath(
            "Path component cannot be empty".to_string(),
        ));
    }
    if comp.contains('/') || comp.contains('\\') {
        return Err(crate::Error::InvalidPath(
            "Path component cannot contain separators".to_string(),
        ));
    }
    if comp == "." || comp == ".." {
        return Err(crate::Error::InvalidPath(format!(
            "Path component cannot be '{}'",
            comp
        )));
    }
    Ok(())
}

impl fmt::Display for SyncPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.components.join("/"))
    }
}

impl TryFrom<String> for SyncPath {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<SyncPath> for String {
    fn from(path: SyncPath) -> Self {
        path.to_string()
    }
}
