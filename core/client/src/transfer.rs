//! Transfer orchestration: drop, pull and key registration.
//!
//! Each operation checks the settings it needs before any key is read or
//! request is sent, then runs its steps in order and aborts on the first
//! failure. Key material is loaded per operation and released as soon as the
//! cryptographic step that needs it is done.

use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use base64::Engine;
use serde::{Serialize, Serializer};
use tracing::{debug, info};
use zeroize::Zeroizing;

use deaddrop_common::{expand_home, Error, KeyName, ObjectId, Result, OBJECT_PERMS};
use deaddrop_crypto::{decrypt, encrypt, parse_public_key, ObjectReference, SecretBuffer};

use crate::auth::Authenticator;
use crate::config::ClientConfig;
use crate::files::write_atomically;
use crate::transport::{
    object_path, HttpTransport, RemoteRequest, Transport, ADD_KEY_PATH, OBJECTS_PATH,
    OCTET_STREAM,
};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AddKeyRequest<'a> {
    #[serde(serialize_with = "as_base64")]
    key: &'a [u8],
    key_name: &'a str,
}

fn as_base64<S: Serializer>(bytes: &&[u8], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// Client for a remote dead-drop host.
pub struct DeadDropClient<T: Transport> {
    config: ClientConfig,
    transport: T,
}

impl DeadDropClient<HttpTransport> {
    /// Create a client talking HTTP(S) to the configured remote.
    ///
    /// # Errors
    /// - `Config` if the remote is missing or invalid
    pub fn connect(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        Ok(Self::with_transport(config, transport))
    }
}

impl<T: Transport> DeadDropClient<T> {
    pub fn with_transport(config: ClientConfig, transport: T) -> Self {
        Self { config, transport }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    fn authenticator(&self) -> Result<Authenticator<'_>> {
        let key_name = self.config.key_name()?;
        let private_key = self.config.private_key()?;
        Ok(Authenticator::new(&self.transport, key_name, private_key))
    }

    /// Encrypt a local file and upload it.
    ///
    /// # Postconditions
    /// - The returned reference carries the checksum of the ciphertext
    ///   exactly as uploaded
    ///
    /// # Errors
    /// - `Config` if a required setting is missing (before any network call)
    /// - `Io` if the file cannot be read
    /// - `KeyAccess` / `Crypto` if the encryption key is unusable
    /// - `AuthExhausted` / `RequestFailed` / `AuthRequest` from the upload
    /// - `Serialization` if the remote answers with an unusable object id
    pub async fn drop_file(&self, path: impl AsRef<Path>) -> Result<ObjectReference> {
        let encryption_key = self.config.encryption_key()?;
        let auth = self.authenticator()?;

        let path = expand_home(path.as_ref())?;
        let plaintext = Zeroizing::new(tokio::fs::read(&path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Error reading '{}': {}", path.display(), e),
            ))
        })?);

        info!("Encrypting {}", path.display());
        let key = SecretBuffer::load(encryption_key)?;
        let envelope = encrypt(key, &plaintext)?;
        drop(plaintext);

        info!(bytes = envelope.len(), "Uploading object");
        let request = RemoteRequest::post(OBJECTS_PATH, Bytes::from(envelope))
            .with_content_type(OCTET_STREAM);
        let response = auth.send(&request).await?;

        let object_id = std::str::from_utf8(&response.body)
            .map_err(|_| Error::Serialization("Object id is not valid UTF-8".to_string()))
            .and_then(|id| {
                ObjectId::new(id.trim())
                    .map_err(|e| Error::Serialization(format!("Unusable object id: {}", e)))
            })?;

        let reference = ObjectReference::new(object_id, &request.body);
        info!(object_id = %reference.object_id(), "Object dropped");
        Ok(reference)
    }

    /// Download, verify and decrypt an object into `dest`.
    ///
    /// # Errors
    /// - `Format` if `reference` is malformed (before any network call)
    /// - Any error of [`DeadDropClient::pull_reference`]
    pub async fn pull(&self, reference: &str, dest: impl AsRef<Path>) -> Result<()> {
        let reference = ObjectReference::parse(reference)?;
        self.pull_reference(&reference, dest).await
    }

    /// Download, verify and decrypt the object behind `reference`.
    ///
    /// The checksum is checked before decryption and nothing is written
    /// unless both the checksum and the envelope tag verify.
    ///
    /// # Errors
    /// - `Config` if a required setting is missing (before any network call)
    /// - `IntegrityViolation` if the downloaded bytes do not match the
    ///   reference's checksum
    /// - `Integrity` if the envelope fails authentication (wrong key)
    /// - `Io` if the destination cannot be written
    pub async fn pull_reference(
        &self,
        reference: &ObjectReference,
        dest: impl AsRef<Path>,
    ) -> Result<()> {
        let encryption_key = self.config.encryption_key()?.to_path_buf();
        let auth = self.authenticator()?;
        let dest = expand_home(dest.as_ref())?;

        info!(object_id = %reference.object_id(), "Downloading object");
        let request = RemoteRequest::get(object_path(reference.object_id()));
        let response = auth.send(&request).await?;

        debug!(bytes = response.body.len(), "Verifying checksum");
        if !reference.verify(&response.body) {
            return Err(Error::IntegrityViolation(format!(
                "Checksum mismatch for object '{}'",
                reference.object_id()
            )));
        }

        info!("Decrypting object");
        let key = SecretBuffer::load(&encryption_key)?;
        let plaintext = decrypt(key, &response.body)?;

        let target = dest.clone();
        tokio::task::spawn_blocking(move || {
            let written = write_atomically(&target, plaintext.as_bytes(), OBJECT_PERMS);
            plaintext.destroy();
            written
        })
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("Write task failed: {}", e))))??;

        info!("Wrote {}", dest.display());
        Ok(())
    }

    /// Register another public key with the remote under `key_name`.
    ///
    /// The request is authenticated with the configured key pair.
    ///
    /// # Errors
    /// - `InvalidInput` if `key_name` is not a safe key name
    /// - `KeyAccess` if the public key file cannot be read
    /// - `Crypto` if it is not an RSA public key
    /// - Authentication and request errors as for [`DeadDropClient::drop_file`]
    pub async fn add_key(&self, public_key_path: impl AsRef<Path>, key_name: &str) -> Result<()> {
        let new_name = KeyName::new(key_name)?;
        let auth = self.authenticator()?;

        let path = public_key_path.as_ref();
        let pem = SecretBuffer::load(path)?;
        parse_public_key(pem.as_bytes())?;

        info!(key_name = %new_name, "Registering public key");
        let request = RemoteRequest::post_json(
            ADD_KEY_PATH,
            &AddKeyRequest {
                key: pem.as_bytes(),
                key_name: new_name.as_str(),
            },
        )?;
        drop(pem);

        auth.send(&request).await?;
        info!(key_name = %new_name, "Public key registered");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRemote;
    use crate::testutil::{test_key_pair, write_private_key, TEST_KEY_NAME};
    use deaddrop_crypto::{compute_checksum, KeyPair};
    use std::path::PathBuf;

    const EMPTY_REFERENCE: &str = "obj-1:47DEQpj8HBSa-_TImW-5JCeuQeRkm5NMpJWZG3hSuFU=";

    struct Fixture {
        dir: tempfile::TempDir,
        client: DeadDropClient<MemoryRemote>,
    }

    impl Fixture {
        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        fn remote(&self) -> &MemoryRemote {
            self.client.transport()
        }

        fn leftovers(&self) -> Vec<String> {
            std::fs::read_dir(self.dir.path())
                .unwrap()
                .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
                .filter(|name| name.ends_with(".partial"))
                .collect()
        }
    }

    fn config(private_key: PathBuf, encryption_key: PathBuf) -> ClientConfig {
        ClientConfig {
            remote: Some("https://drop.test".to_string()),
            private_key: Some(private_key),
            key_name: Some(TEST_KEY_NAME.to_string()),
            encryption_key: Some(encryption_key),
            ..Default::default()
        }
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let private_key = write_private_key(dir.path(), test_key_pair());
        let encryption_key = dir.path().join("shared.key");
        std::fs::write(&encryption_key, [7u8; 32]).unwrap();

        let remote = MemoryRemote::new().with_fixed_object_id("obj-1");
        remote.register_key(TEST_KEY_NAME, test_key_pair().public_key().clone());

        let config = config(private_key, encryption_key);
        Fixture {
            dir,
            client: DeadDropClient::with_transport(config, remote),
        }
    }

    async fn drop_note(fixture: &Fixture) -> ObjectReference {
        let note = fixture.path("note.txt");
        std::fs::write(&note, b"hello").unwrap();
        fixture.client.drop_file(&note).await.unwrap()
    }

    #[tokio::test]
    async fn test_drop_then_pull_roundtrip() {
        let fixture = fixture();

        let reference = drop_note(&fixture).await;
        assert_eq!(reference.object_id().as_str(), "obj-1");

        let stored = fixture.remote().object("obj-1").unwrap();
        assert_eq!(reference.checksum(), &compute_checksum(&stored));
        assert_ne!(&stored[..], b"hello");

        let out = fixture.path("out.txt");
        fixture
            .client
            .pull(&reference.to_string(), &out)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"hello");
        assert!(fixture.leftovers().is_empty());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_pulled_object_permissions() {
        use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

        let fixture = fixture();
        let reference = drop_note(&fixture).await;
        let out = fixture.path("out.txt");
        fixture.client.pull_reference(&reference, &out).await.unwrap();

        // Same mode the process umask yields for a fresh 0644 file.
        let reference_file = fixture.path("umask-reference");
        std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .mode(OBJECT_PERMS)
            .open(&reference_file)
            .unwrap();
        let expected = std::fs::metadata(&reference_file).unwrap().permissions().mode();

        let mode = std::fs::metadata(&out).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, expected & 0o777);
        assert_eq!(mode & 0o777 & !0o644, 0);
    }

    #[tokio::test]
    async fn test_tampered_object_is_not_written() {
        let fixture = fixture();
        let reference = drop_note(&fixture).await;
        fixture.remote().corrupt_downloads(true);

        let out = fixture.path("out.txt");
        let result = fixture.client.pull(&reference.to_string(), &out).await;

        assert!(matches!(result, Err(Error::IntegrityViolation(_))));
        assert!(!out.exists());
        assert!(fixture.leftovers().is_empty());
    }

    #[tokio::test]
    async fn test_tamper_keeps_existing_destination() {
        let fixture = fixture();
        let reference = drop_note(&fixture).await;
        let out = fixture.path("out.txt");
        std::fs::write(&out, b"previous").unwrap();
        fixture.remote().corrupt_downloads(true);

        let result = fixture.client.pull_reference(&reference, &out).await;

        assert!(matches!(result, Err(Error::IntegrityViolation(_))));
        assert_eq!(std::fs::read(&out).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn test_wrong_encryption_key_fails_integrity() {
        let fixture = fixture();
        let reference = drop_note(&fixture).await;

        let other_key = fixture.path("other.key");
        std::fs::write(&other_key, [9u8; 32]).unwrap();
        let mut config = fixture.client.config().clone();
        config.encryption_key = Some(other_key);
        let recipient = DeadDropClient::with_transport(config, fixture.remote());

        let out = fixture.path("out.txt");
        let result = recipient.pull_reference(&reference, &out).await;

        assert!(matches!(result, Err(Error::Integrity(_))));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_rotation_during_drop_is_absorbed() {
        let fixture = fixture();
        fixture.remote().reject_next(1);

        let reference = drop_note(&fixture).await;

        assert_eq!(reference.object_id().as_str(), "obj-1");
        assert_eq!(fixture.remote().token_requests(), 2);
    }

    #[tokio::test]
    async fn test_persistent_rejection_exhausts() {
        let fixture = fixture();
        fixture.remote().reject_next(2);

        let note = fixture.path("note.txt");
        std::fs::write(&note, b"hello").unwrap();
        let result = fixture.client.drop_file(&note).await;

        assert!(matches!(result, Err(Error::AuthExhausted { attempts: 2 })));
        assert_eq!(fixture.remote().token_requests(), 2);
        assert!(fixture.remote().object("obj-1").is_none());
    }

    #[tokio::test]
    async fn test_missing_settings_abort_before_network() {
        let fixture = fixture();
        let note = fixture.path("note.txt");
        std::fs::write(&note, b"hello").unwrap();

        let mut config = fixture.client.config().clone();
        config.encryption_key = None;
        let client = DeadDropClient::with_transport(config, fixture.remote());
        let result = client.drop_file(&note).await;
        assert!(matches!(result, Err(Error::Config(_))));

        let mut config = fixture.client.config().clone();
        config.key_name = None;
        let client = DeadDropClient::with_transport(config, fixture.remote());
        let result = client.pull(EMPTY_REFERENCE, fixture.path("out.txt")).await;
        assert!(matches!(result, Err(Error::Config(_))));

        assert_eq!(fixture.remote().token_requests(), 0);
    }

    #[tokio::test]
    async fn test_malformed_reference_aborts_before_network() {
        let fixture = fixture();

        let no_id = format!(":{}", compute_checksum(b""));
        for reference in ["", "obj-1", "obj-1:not-a-checksum", no_id.as_str()] {
            let result = fixture.client.pull(reference, fixture.path("out.txt")).await;
            assert!(matches!(result, Err(Error::Format(_))), "{:?}", reference);
        }
        assert_eq!(fixture.remote().token_requests(), 0);
    }

    #[tokio::test]
    async fn test_missing_input_file() {
        let fixture = fixture();
        let result = fixture.client.drop_file(fixture.path("absent.txt")).await;

        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(fixture.remote().token_requests(), 0);
    }

    #[tokio::test]
    async fn test_unknown_object_is_request_failure() {
        let fixture = fixture();
        let reference = ObjectReference::new(ObjectId::new("missing").unwrap(), b"anything");

        let result = fixture
            .client
            .pull_reference(&reference, fixture.path("out.txt"))
            .await;
        assert!(matches!(
            result,
            Err(Error::RequestFailed {
                status: Some(404),
                ..
            })
        ));
    }

    #[tokio::test]
    async fn test_add_key_registers_usable_key() {
        let fixture = fixture();
        let second = KeyPair::generate(1536).unwrap();
        let public_path = fixture.path("second.pub");
        std::fs::write(&public_path, second.public_key_pem().unwrap()).unwrap();

        fixture.client.add_key(&public_path, "second").await.unwrap();
        assert_eq!(
            fixture.remote().registered_key("second").as_ref(),
            Some(second.public_key())
        );

        let second_private = fixture.dir.path().join("second");
        std::fs::create_dir(&second_private).unwrap();
        let mut config = fixture.client.config().clone();
        config.key_name = Some("second".to_string());
        config.private_key = Some(write_private_key(&second_private, &second));
        let client = DeadDropClient::with_transport(config, fixture.remote());

        let note = fixture.path("note.txt");
        std::fs::write(&note, b"from the second key").unwrap();
        client.drop_file(&note).await.unwrap();
    }

    #[tokio::test]
    async fn test_add_key_rejects_bad_input() {
        let fixture = fixture();
        let public_path = fixture.path("second.pub");
        std::fs::write(&public_path, test_key_pair().public_key_pem().unwrap()).unwrap();

        let result = fixture.client.add_key(&public_path, "../escape").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));

        let garbage = fixture.path("garbage.pub");
        std::fs::write(&garbage, b"not a key").unwrap();
        let result = fixture.client.add_key(&garbage, "second").await;
        assert!(matches!(result, Err(Error::Crypto(_))));

        assert_eq!(fixture.remote().token_requests(), 0);
    }

    #[test]
    fn test_add_key_request_encoding() {
        let body = serde_json::to_value(AddKeyRequest {
            key: b"pem",
            key_name: "laptop",
        })
        .unwrap();
        assert_eq!(body, serde_json::json!({ "key": "cGVt", "keyName": "laptop" }));
    }
}
