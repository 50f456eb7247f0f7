//! Shared fixtures for the client tests.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use deaddrop_crypto::KeyPair;

pub const TEST_KEY_NAME: &str = "test-key";

/// A key pair generated once per test binary.
pub fn test_key_pair() -> &'static KeyPair {
    static PAIR: OnceLock<KeyPair> = OnceLock::new();
    PAIR.get_or_init(|| KeyPair::generate(2048).unwrap())
}

/// Write the private half of `pair` as `id_rsa` in `dir`.
pub fn write_private_key(dir: &Path, pair: &KeyPair) -> PathBuf {
    let path = dir.join("id_rsa");
    std::fs::write(&path, pair.private_key_pem().unwrap().as_bytes()).unwrap();
    path
}
