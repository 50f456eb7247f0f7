//! Encrypt-then-MAC object encryption.
//!
//! Objects are encrypted with AES-256-CTR and authenticated with
//! HMAC-SHA-256 over `iv || payload`. Both sub-keys are derived from the
//! user's key file with HKDF-SHA-256, so the key file may be any non-empty
//! length and the cipher and MAC never share key bytes.
//!
//! Envelope layout: `iv (16) || encrypted payload || tag (32)`.

use aes::Aes256;
use ctr::cipher::{KeyIvInit, StreamCipher};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use deaddrop_common::{Error, Result};

use crate::secure::SecretBuffer;

type Aes256Ctr = ctr::Ctr128BE<Aes256>;
type HmacSha256 = Hmac<Sha256>;

/// IV size for AES-CTR (one block).
pub const IV_SIZE: usize = 16;

/// HMAC-SHA-256 tag size.
pub const TAG_SIZE: usize = 32;

/// Length of each derived sub-key.
const SUBKEY_LENGTH: usize = 32;

const ENCRYPTION_INFO: &[u8] = b"dead-drop/v1/aes-256-ctr";
const MAC_INFO: &[u8] = b"dead-drop/v1/hmac-sha-256";

/// Cipher and MAC keys for a single operation. Zeroized on drop.
struct SubKeys {
    encryption: Zeroizing<[u8; SUBKEY_LENGTH]>,
    mac: Zeroizing<[u8; SUBKEY_LENGTH]>,
}

impl SubKeys {
    /// Derive both sub-keys, consuming the master key.
    fn derive(key: SecretBuffer) -> Result<Self> {
        if key.is_empty() {
            return Err(Error::Crypto("Encryption key is empty".to_string()));
        }

        let hkdf = Hkdf::<Sha256>::new(None, key.as_bytes());
        let mut encryption = Zeroizing::new([0u8; SUBKEY_LENGTH]);
        let mut mac = Zeroizing::new([0u8; SUBKEY_LENGTH]);

        hkdf.expand(ENCRYPTION_INFO, &mut encryption[..])
            .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;
        hkdf.expand(MAC_INFO, &mut mac[..])
            .map_err(|e| Error::Crypto(format!("Key derivation failed: {}", e)))?;

        key.destroy();

        Ok(Self { encryption, mac })
    }

    fn apply_keystream(&self, iv: &[u8], data: &mut [u8]) -> Result<()> {
        let mut cipher = Aes256Ctr::new_from_slices(&self.encryption[..], iv)
            .map_err(|e| Error::Crypto(format!("Invalid cipher parameters: {}", e)))?;
        cipher.apply_keystream(data);
        Ok(())
    }

    fn tag(&self, iv: &[u8], payload: &[u8]) -> Result<[u8; TAG_SIZE]> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(&self.mac[..])
            .map_err(|e| Error::Crypto(format!("Invalid MAC key: {}", e)))?;
        mac.update(iv);
        mac.update(payload);

        let mut tag = [0u8; TAG_SIZE];
        tag.copy_from_slice(&mac.finalize().into_bytes());
        Ok(tag)
    }
}

/// Encrypt an object payload.
///
/// # Preconditions
/// - `key` must be non-empty; it is consumed and wiped before return
///
/// # Postconditions
/// - Returns `iv || ciphertext || tag`
/// - The IV is freshly generated from the OS RNG
/// - Envelope length is `IV_SIZE + plaintext.len() + TAG_SIZE`
///
/// # Errors
/// - `Crypto` if the key is empty or a primitive rejects its parameters
pub fn encrypt(key: SecretBuffer, plaintext: &[u8]) -> Result<Vec<u8>> {
    let keys = SubKeys::derive(key)?;

    let mut iv = [0u8; IV_SIZE];
    OsRng.fill_bytes(&mut iv);

    let mut envelope = Vec::with_capacity(IV_SIZE + plaintext.len() + TAG_SIZE);
    envelope.extend_from_slice(&iv);
    envelope.extend_from_slice(plaintext);
    keys.apply_keystream(&iv, &mut envelope[IV_SIZE..])?;

    let tag = keys.tag(&iv, &envelope[IV_SIZE..])?;
    envelope.extend_from_slice(&tag);

    Ok(envelope)
}

/// Authenticate and decrypt an envelope.
///
/// The tag is checked in constant time before any byte is decrypted; a
/// mismatch returns without touching the payload.
///
/// # Postconditions
/// - Returns the plaintext in a [`SecretBuffer`]
///
/// # Errors
/// - `Integrity` if the envelope is truncated below `IV_SIZE + TAG_SIZE`
///   or its tag does not verify
/// - `Crypto` if the key is empty
pub fn decrypt(key: SecretBuffer, envelope: &[u8]) -> Result<SecretBuffer> {
    if envelope.len() < IV_SIZE + TAG_SIZE {
        return Err(Error::Integrity("Envelope too short".to_string()));
    }

    let keys = SubKeys::derive(key)?;

    let (body, received_tag) = envelope.split_at(envelope.len() - TAG_SIZE);
    let (iv, payload) = body.split_at(IV_SIZE);

    let expected_tag = keys.tag(iv, payload)?;
    if !bool::from(expected_tag[..].ct_eq(received_tag)) {
        return Err(Error::Integrity(
            "Authentication tag mismatch, envelope was modified".to_string(),
        ));
    }

    let mut plaintext = SecretBuffer::from_slice(payload);
    keys.apply_keystream(iv, plaintext.as_mut_bytes())?;

    Ok(plaintext)
}
