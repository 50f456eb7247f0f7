//! Authentication key pair generation.

use std::path::Path;

use tracing::info;

use deaddrop_common::{expand_home, Error, Result, PRIVATE_KEY_PERMS, PUBLIC_KEY_PERMS};
use deaddrop_crypto::KeyPair;

use crate::files::write_new_file;

/// Generate an RSA key pair and write it as PKCS#1 PEM files.
///
/// The private key is written with [`PRIVATE_KEY_PERMS`], the public key
/// with [`PUBLIC_KEY_PERMS`]. Existing files are never overwritten.
///
/// # Errors
/// - `Io` if either path already exists or cannot be written
/// - `Crypto` if generation fails
pub async fn gen_key(private_path: &Path, public_path: &Path, bits: usize) -> Result<()> {
    let private_path = expand_home(private_path)?;
    let public_path = expand_home(public_path)?;

    for path in [&private_path, &public_path] {
        if path.exists() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                format!("Refusing to overwrite '{}'", path.display()),
            )));
        }
    }

    info!(bits, "Generating RSA key pair");
    let pair = tokio::task::spawn_blocking(move || KeyPair::generate(bits))
        .await
        .map_err(|e| Error::Crypto(format!("Key generation task failed: {}", e)))??;

    let private_pem = pair.private_key_pem()?;
    write_new_file(&private_path, private_pem.as_bytes(), PRIVATE_KEY_PERMS)?;
    private_pem.destroy();
    info!("Wrote private key to {}", private_path.display());

    let written = pair
        .public_key_pem()
        .and_then(|pem| write_new_file(&public_path, pem.as_bytes(), PUBLIC_KEY_PERMS));
    if let Err(e) = written {
        let _ = std::fs::remove_file(&private_path);
        return Err(e);
    }
    info!("Wrote public key to {}", public_path.display());

    Ok(())
}
