//! Common types used throughout the dead-drop client.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

/// Pattern a key name must match before it is sent to the remote.
pub const KEY_NAME_PATTERN: &str = r"^[A-Za-z0-9][A-Za-z0-9_.\-]{0,63}$";

static KEY_NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(KEY_NAME_PATTERN).expect("key name pattern is valid"));

/// Name under which a public key is registered on the remote.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct KeyName(String);

impl KeyName {
    /// Create a new KeyName from a string.
    ///
    /// # Errors
    /// - Returns error if the name contains control, path or other
    ///   characters outside [`KEY_NAME_PATTERN`]
    pub fn new(name: impl Into<String>) -> crate::Result<Self> {
        let name = name.into();
        if !KEY_NAME_REGEX.is_match(&name) {
            return Err(crate::Error::InvalidInput(format!(
                "Invalid key name '{}'",
                name.escape_default()
            )));
        }
        Ok(Self(name))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for KeyName {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::new(value)
    }
}

impl From<KeyName> for String {
    fn from(value: KeyName) -> Self {
        value.0
    }
}

impl fmt::Display for KeyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier the remote store assigns to an uploaded object.
///
/// Opaque to the client, but it is placed in a URL path and in the
/// `<id>:<checksum>` reference form, so separators, whitespace and control
/// characters are refused.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectId(String);

impl ObjectId {
    /// Create a new ObjectId.
    ///
    /// # Errors
    /// - Returns error if id is empty or contains `:`, `/`, whitespace or
    ///   control characters
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(crate::Error::InvalidInput(
                "ObjectId cannot be empty".to_string(),
            ));
        }
        if id
            .chars()
            .any(|c| c == ':' || c == '/' || c.is_whitespace() || c.is_control())
        {
            return Err(crate::Error::InvalidInput(format!(
                "Invalid object id '{}'",
                id.escape_default()
            )));
        }
        Ok(Self(id))
    }

    /// Get the inner string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
