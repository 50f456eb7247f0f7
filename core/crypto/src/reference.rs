//! Content-addressed object references.
//!
//! A reference pairs the id the remote assigned to an object with the
//! SHA-256 checksum of the exact ciphertext that was uploaded. Pulling an
//! object re-hashes the downloaded bytes and refuses to go further on a
//! mismatch, so corrupted or substituted ciphertext is never decrypted.
//!
//! Text form: `<object id>:<checksum>`. Checksums are padded base64url, so
//! the `:` delimiter cannot occur in them, and object ids refuse it.

use std::fmt;
use std::str::FromStr;

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use deaddrop_common::{Error, ObjectId, Result};

/// Separator between object id and checksum in the text form.
pub const REFERENCE_DELIMITER: char = ':';

/// Length of a padded base64url SHA-256 digest.
pub const CHECKSUM_LENGTH: usize = 44;

const DIGEST_LENGTH: usize = 32;

/// Padded base64url SHA-256 digest.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Checksum(String);

impl Checksum {
    /// Parse and validate a checksum string.
    ///
    /// # Errors
    /// - `Format` unless the input is the canonical padded base64url
    ///   encoding of a 32-byte digest
    pub fn parse(s: &str) -> Result<Self> {
        if s.len() != CHECKSUM_LENGTH {
            return Err(Error::Format(format!(
                "Checksum must be {} characters, got {}",
                CHECKSUM_LENGTH,
                s.len()
            )));
        }

        let digest = URL_SAFE
            .decode(s)
            .map_err(|e| Error::Format(format!("Invalid checksum encoding: {}", e)))?;
        if digest.len() != DIGEST_LENGTH || URL_SAFE.encode(&digest) != s {
            return Err(Error::Format("Checksum is not a SHA-256 digest".to_string()));
        }

        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Constant-time comparison against the checksum of `bytes`.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        let actual = compute_checksum(bytes);
        self.0.as_bytes().ct_eq(actual.0.as_bytes()).into()
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// SHA-256 over `bytes`, padded base64url encoded.
pub fn compute_checksum(bytes: &[u8]) -> Checksum {
    let digest = Sha256::digest(bytes);
    Checksum(URL_SAFE.encode(digest))
}

/// Handle binding a remote object id to the checksum of its ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ObjectReference {
    object_id: ObjectId,
    checksum: Checksum,
}

impl ObjectReference {
    /// Create a reference for bytes as they were transmitted.
    ///
    /// # Preconditions
    /// - `transmitted` is the ciphertext envelope exactly as uploaded,
    ///   never the plaintext
    pub fn new(object_id: ObjectId, transmitted: &[u8]) -> Self {
        Self {
            object_id,
            checksum: compute_checksum(transmitted),
        }
    }

    pub fn object_id(&self) -> &ObjectId {
        &self.object_id
    }

    pub fn checksum(&self) -> &Checksum {
        &self.checksum
    }

    /// Check downloaded bytes against the recorded checksum.
    ///
    /// A `false` result means the bytes must be discarded; it is never
    /// safe to continue with them.
    pub fn verify(&self, bytes: &[u8]) -> bool {
        self.checksum.matches(bytes)
    }

    /// Parse the `<object id>:<checksum>` text form.
    ///
    /// Surrounding whitespace is ignored so references can be pasted.
    ///
    /// # Errors
    /// - `Format` on empty input, a missing delimiter, an invalid object id
    ///   or a checksum outside the base64url alphabet
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(Error::Format("Object reference is empty".to_string()));
        }

        let (object_id, checksum) = s.split_once(REFERENCE_DELIMITER).ok_or_else(|| {
            Error::Format(format!(
                "Object reference must look like <object>{}<checksum>",
                REFERENCE_DELIMITER
            ))
        })?;

        let object_id = ObjectId::new(object_id)
            .map_err(|e| Error::Format(format!("Invalid object id: {}", e)))?;
        let checksum = Checksum::parse(checksum)?;

        Ok(Self {
            object_id,
            checksum,
        })
    }
}

impl fmt::Display for ObjectReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.object_id, REFERENCE_DELIMITER, self.checksum)
    }
}

impl FromStr for ObjectReference {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ObjectReference {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ObjectReference> for String {
    fn from(value: ObjectReference) -> Self {
        value.to_string()
    }
}
