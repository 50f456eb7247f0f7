//! RSA key pairs used to authenticate against the remote.
//!
//! Keys are stored as PKCS#1 PEM: `RSA PRIVATE KEY` and `RSA PUBLIC KEY`.
//! Private keys are read through a [`SecretBuffer`] and are expected to be
//! dropped as soon as the token they were loaded for is decrypted.

use std::fmt;
use std::path::Path;

use rand::rngs::OsRng;
use rsa::pkcs1::{
    DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding,
};
use rsa::{RsaPrivateKey, RsaPublicKey};

use deaddrop_common::{Error, Result};

use crate::secure::SecretBuffer;

/// Modulus size for generated authentication keys.
pub const RSA_KEY_BITS: usize = 4096;

/// RSA private key and its public half.
pub struct KeyPair {
    private_key: RsaPrivateKey,
    public_key: RsaPublicKey,
}

impl KeyPair {
    /// Generate a new key pair.
    ///
    /// # Errors
    /// - `Crypto` if generation fails (e.g. an unsupported modulus size)
    pub fn generate(bits: usize) -> Result<Self> {
        let private_key = RsaPrivateKey::new(&mut OsRng, bits)
            .map_err(|e| Error::Crypto(format!("Failed generating private key: {}", e)))?;
        Ok(Self::from_private_key(private_key))
    }

    /// Wrap an existing private key.
    pub fn from_private_key(private_key: RsaPrivateKey) -> Self {
        let public_key = RsaPublicKey::from(&private_key);
        Self {
            private_key,
            public_key,
        }
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    pub fn public_key(&self) -> &RsaPublicKey {
        &self.public_key
    }

    /// Encode the private key as `RSA PRIVATE KEY` PEM.
    pub fn private_key_pem(&self) -> Result<SecretBuffer> {
        let pem = self
            .private_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("Failed to encode private key: {}", e)))?;
        Ok(SecretBuffer::from_slice(pem.as_bytes()))
    }

    /// Encode the public key as `RSA PUBLIC KEY` PEM.
    pub fn public_key_pem(&self) -> Result<String> {
        self.public_key
            .to_pkcs1_pem(LineEnding::LF)
            .map_err(|e| Error::Crypto(format!("Failed to encode public key: {}", e)))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair([REDACTED])")
    }
}

/// Load a PKCS#1 PEM private key from disk.
///
/// # Errors
/// - `KeyAccess` if the file cannot be located or read
/// - `Crypto` if the contents are not an `RSA PRIVATE KEY` PEM block
pub fn load_private_key(path: impl AsRef<Path>) -> Result<RsaPrivateKey> {
    let pem = SecretBuffer::load(path.as_ref())?;
    let text = std::str::from_utf8(pem.as_bytes())
        .map_err(|_| Error::Crypto("Failed to decode pem bytes".to_string()))?;

    RsaPrivateKey::from_pkcs1_pem(text)
        .map_err(|e| Error::Crypto(format!("Failed to parse private key: {}", e)))
}

/// Parse a PKCS#1 PEM public key.
///
/// # Errors
/// - `Crypto` if the bytes are not an `RSA PUBLIC KEY` PEM block
pub fn parse_public_key(pem: &[u8]) -> Result<RsaPublicKey> {
    let text = std::str::from_utf8(pem)
        .map_err(|_| Error::Crypto("Failed to decode pem bytes".to_string()))?;

    RsaPublicKey::from_pkcs1_pem(text)
        .map_err(|e| Error::Crypto(format!("Failed to parse public key: {}", e)))
}
