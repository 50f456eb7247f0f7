//! Cryptographic primitives for the dead-drop client.
//!
//! This module provides:
//! - Scoped secret buffers for key material, locked against swapping and
//!   zeroized on release
//! - Encrypt-then-MAC object encryption (AES-256-CTR + HMAC-SHA-256)
//! - Content-addressed object references over the transmitted ciphertext
//! - RSA key pairs and OAEP decryption of bearer tokens
//!
//! # Security Guarantees
//! - Key material and decrypted plaintext live in [`SecretBuffer`]s
//! - No plaintext, token or key material is ever logged
//! - Tags and checksums are compared in constant time
//! - Envelopes are authenticated before any byte is decrypted

pub mod aead;
pub mod keys;
pub mod reference;
pub mod secure;
pub mod token;

pub use aead::{decrypt, encrypt};
pub use keys::{load_private_key, parse_public_key, KeyPair, RSA_KEY_BITS};
pub use reference::{compute_checksum, Checksum, ObjectReference};
pub use secure::SecretBuffer;
pub use token::{decrypt_token, encrypt_token, BearerToken, TOKEN_CIPHER_LABEL};
