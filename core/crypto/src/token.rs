//! Bearer tokens and their RSA-OAEP transport encoding.
//!
//! The remote encrypts each token to the registered public key with
//! RSA-OAEP (SHA-512, fixed label); only the holder of the private key can
//! recover it.

use std::fmt;

use rand::rngs::OsRng;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha512;
use zeroize::Zeroizing;

use deaddrop_common::{Error, Result};

/// OAEP label shared with the remote's token endpoint.
pub const TOKEN_CIPHER_LABEL: &str = "dead-drop-token";

fn padding() -> Oaep {
    Oaep::new_with_label::<Sha512, _>(TOKEN_CIPHER_LABEL)
}

/// Short-lived credential for a single authenticated request attempt.
///
/// Never persisted and never logged.
pub struct BearerToken(Zeroizing<String>);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BearerToken([REDACTED])")
    }
}

/// Recover a bearer token from the token endpoint's response body.
///
/// # Errors
/// - `TokenDecrypt` if OAEP decryption fails (wrong key, corrupted
///   response, or the remote rotated the token secret) or the token is not
///   a valid header value
pub fn decrypt_token(private_key: &RsaPrivateKey, ciphertext: &[u8]) -> Result<BearerToken> {
    let plain = Zeroizing::new(
        private_key
            .decrypt_blinded(&mut OsRng, padding(), ciphertext)
            .map_err(|e| Error::TokenDecrypt(e.to_string()))?,
    );

    let token = std::str::from_utf8(&plain)
        .map_err(|_| Error::TokenDecrypt("Token is not valid UTF-8".to_string()))?;
    if token.is_empty() || token.chars().any(|c| c.is_control()) {
        return Err(Error::TokenDecrypt(
            "Token is not a valid header value".to_string(),
        ));
    }

    Ok(BearerToken(Zeroizing::new(token.to_string())))
}

/// Encrypt a token to a public key the way the remote's token endpoint does.
pub fn encrypt_token(public_key: &RsaPublicKey, token: &[u8]) -> Result<Vec<u8>> {
    public_key
        .encrypt(&mut OsRng, padding(), token)
        .map_err(|e| Error::Crypto(format!("Token encryption failed: {}", e)))
}
