//! In-memory remote store for testing.
//!
//! Implements the remote's wire contract behind the [`Transport`] trait:
//! token issuance encrypted to registered public keys, single-use tokens,
//! object upload and download, and public key registration. Knobs allow
//! tests to simulate a token secret rotation (forced 401s) and in-transit
//! corruption of downloaded objects.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::percent_decode_str;
use rsa::RsaPublicKey;
use serde::Deserialize;
use uuid::Uuid;

use deaddrop_common::Result;
use deaddrop_crypto::{encrypt_token, parse_public_key, BearerToken};

use crate::transport::{
    Method, RemoteRequest, RemoteResponse, Transport, ADD_KEY_PATH, OBJECTS_PATH, TOKEN_PATH,
};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequestBody {
    key_name: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddKeyBody {
    key: String,
    key_name: String,
}

#[derive(Default)]
struct RemoteState {
    keys: HashMap<String, RsaPublicKey>,
    tokens: HashSet<String>,
    objects: HashMap<String, Vec<u8>>,
    fixed_object_id: Option<String>,
    next_object: u64,
    reject_next: u32,
    corrupt_downloads: bool,
    token_requests: u32,
    authenticated_requests: u32,
}

impl RemoteState {
    fn issue_token(&mut self, body: &[u8]) -> RemoteResponse {
        self.token_requests += 1;

        let Ok(request) = serde_json::from_slice::<TokenRequestBody>(body) else {
            return RemoteResponse::new(400, "malformed token request");
        };
        let Some(public_key) = self.keys.get(&request.key_name) else {
            return RemoteResponse::new(404, "unknown key name");
        };

        let token = Uuid::new_v4().to_string();
        match encrypt_token(public_key, token.as_bytes()) {
            Ok(ciphertext) => {
                self.tokens.insert(token);
                RemoteResponse::new(200, ciphertext)
            }
            Err(_) => RemoteResponse::new(500, "token encryption failed"),
        }
    }

    /// Consume the presented token. Forced rejections still burn it.
    fn authorize(&mut self, token: Option<&BearerToken>) -> bool {
        self.authenticated_requests += 1;

        let valid = token.is_some_and(|t| self.tokens.remove(t.as_str()));
        if self.reject_next > 0 {
            self.reject_next -= 1;
            return false;
        }
        valid
    }

    fn store(&mut self, body: &[u8]) -> RemoteResponse {
        let id = match &self.fixed_object_id {
            Some(id) => id.clone(),
            None => {
                self.next_object += 1;
                format!("obj-{}", self.next_object)
            }
        };
        self.objects.insert(id.clone(), body.to_vec());
        RemoteResponse::new(200, id)
    }

    fn fetch(&self, encoded_id: &str) -> RemoteResponse {
        let id = percent_decode_str(encoded_id).decode_utf8_lossy();
        let Some(data) = self.objects.get(&*id) else {
            return RemoteResponse::new(404, "no such object");
        };

        let mut data = data.clone();
        if self.corrupt_downloads && !data.is_empty() {
            let middle = data.len() / 2;
            data[middle] ^= 0x01;
        }
        RemoteResponse::new(200, data)
    }

    fn add_key(&mut self, body: &[u8]) -> RemoteResponse {
        let Ok(request) = serde_json::from_slice::<AddKeyBody>(body) else {
            return RemoteResponse::new(400, "malformed add-key request");
        };
        let Ok(pem) = STANDARD.decode(&request.key) else {
            return RemoteResponse::new(400, "key is not base64");
        };
        let Ok(public_key) = parse_public_key(&pem) else {
            return RemoteResponse::new(400, "key is not an RSA public key");
        };
        self.keys.insert(request.key_name, public_key);
        RemoteResponse::new(200, "")
    }
}

/// In-memory stand-in for the remote dead-drop host.
pub struct MemoryRemote {
    state: Mutex<RemoteState>,
}

impl MemoryRemote {
    /// Create an empty remote with no registered keys.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RemoteState::default()),
        }
    }

    /// Answer every upload with the same object id.
    pub fn with_fixed_object_id(self, id: impl Into<String>) -> Self {
        self.state().fixed_object_id = Some(id.into());
        self
    }

    fn state(&self) -> MutexGuard<'_, RemoteState> {
        // A panic while holding the lock only happens inside a failing test.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn register_key(&self, key_name: impl Into<String>, public_key: RsaPublicKey) {
        self.state().keys.insert(key_name.into(), public_key);
    }

    pub fn registered_key(&self, key_name: &str) -> Option<RsaPublicKey> {
        self.state().keys.get(key_name).cloned()
    }

    /// Answer the next `count` authenticated requests with 401, as if the
    /// token secret rotated after each token was issued.
    pub fn reject_next(&self, count: u32) {
        self.state().reject_next = count;
    }

    /// Flip one bit of every object served from now on.
    pub fn corrupt_downloads(&self, enabled: bool) {
        self.state().corrupt_downloads = enabled;
    }

    /// Number of token endpoint round-trips so far.
    pub fn token_requests(&self) -> u32 {
        self.state().token_requests
    }

    /// Number of requests that presented (or should have presented) a token.
    pub fn authenticated_requests(&self) -> u32 {
        self.state().authenticated_requests
    }

    /// Whether `token` was issued and not yet used.
    pub fn is_valid_token(&self, token: &str) -> bool {
        self.state().tokens.contains(token)
    }

    /// Stored bytes of an object.
    pub fn object(&self, id: &str) -> Option<Vec<u8>> {
        self.state().objects.get(id).cloned()
    }
}

impl Default for MemoryRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MemoryRemote {
    async fn execute(
        &self,
        request: &RemoteRequest,
        token: Option<&BearerToken>,
    ) -> Result<RemoteResponse> {
        let mut state = self.state();

        if request.method == Method::Post && request.path == TOKEN_PATH {
            return Ok(state.issue_token(&request.body));
        }

        if !state.authorize(token) {
            return Ok(RemoteResponse::new(401, "unauthorized"));
        }

        let download_prefix = format!("{}/", OBJECTS_PATH);
        let response = match request.method {
            Method::Post if request.path == OBJECTS_PATH => state.store(&request.body),
            Method::Post if request.path == ADD_KEY_PATH => state.add_key(&request.body),
            Method::Get => match request.path.strip_prefix(&download_prefix) {
                Some(id) if !id.is_empty() => state.fetch(id),
                _ => RemoteResponse::new(404, "not found"),
            },
            _ => RemoteResponse::new(404, "not found"),
        };

        Ok(response)
    }
}
