//! Challenge-response authentication against the remote.
//!
//! For every authenticated request the client asks the token endpoint for a
//! token under its key name. The remote encrypts a fresh token to the public
//! key registered for that name; the client decrypts it with its private key
//! and attaches it to the request.
//!
//! The remote may rotate its per-key token secret at any time, which can
//! invalidate a token between issuance and use. An unauthorized answer is
//! therefore retried exactly once with a new token. A second unauthorized
//! answer is a genuine rejection and ends the exchange.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, warn};

use deaddrop_common::{Error, KeyName, Result};
use deaddrop_crypto::{decrypt_token, load_private_key, BearerToken};

use crate::transport::{RemoteRequest, RemoteResponse, Transport, TOKEN_PATH};

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TokenRequest<'a> {
    key_name: &'a str,
}

/// Position in the bounded retry: one attempt plus at most one retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Attempt {
    First,
    Retry,
}

impl Attempt {
    fn number(self) -> u32 {
        match self {
            Attempt::First => 1,
            Attempt::Retry => 2,
        }
    }

    /// The attempt to make after an unauthorized answer, if any is left.
    fn next(self) -> Option<Self> {
        match self {
            Attempt::First => Some(Attempt::Retry),
            Attempt::Retry => None,
        }
    }
}

/// Authenticates requests with a registered key pair.
pub struct Authenticator<'a> {
    transport: &'a dyn Transport,
    key_name: KeyName,
    private_key_path: PathBuf,
}

impl<'a> Authenticator<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        key_name: KeyName,
        private_key_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            transport,
            key_name,
            private_key_path: private_key_path.into(),
        }
    }

    pub fn key_name(&self) -> &KeyName {
        &self.key_name
    }

    /// Obtain a fresh bearer token.
    ///
    /// The private key is loaded for this call only and dropped (and
    /// zeroized) before returning.
    ///
    /// # Errors
    /// - `AuthRequest` if the token endpoint answers with a non-success status
    /// - `KeyAccess` / `Crypto` if the private key cannot be loaded
    /// - `TokenDecrypt` if the token cannot be decrypted
    /// - `RequestFailed` on transport failure
    pub async fn request_token(&self) -> Result<BearerToken> {
        let request = RemoteRequest::post_json(
            TOKEN_PATH,
            &TokenRequest {
                key_name: self.key_name.as_str(),
            },
        )?;

        let response = self.transport.execute(&request, None).await?;
        if !response.is_success() {
            return Err(Error::AuthRequest(format!(
                "Token endpoint answered status {} for key '{}'",
                response.status, self.key_name
            )));
        }

        let private_key = load_private_key(&self.private_key_path)?;
        let token = decrypt_token(&private_key, &response.body)?;
        drop(private_key);

        debug!(key_name = %self.key_name, "Obtained bearer token");
        Ok(token)
    }

    /// Send `request` with a fresh token, retrying once on unauthorized.
    ///
    /// # Postconditions
    /// - On success, returns the remote's success response
    /// - At most two tokens are requested
    ///
    /// # Errors
    /// - `AuthExhausted` if both attempts are answered unauthorized
    /// - `RequestFailed` for any other non-success status or transport failure
    /// - Any error from [`Authenticator::request_token`]
    pub async fn send(&self, request: &RemoteRequest) -> Result<RemoteResponse> {
        let mut attempt = Attempt::First;

        loop {
            let token = self.request_token().await?;
            let response = self.transport.execute(request, Some(&token)).await?;
            drop(token);

            if response.is_success() {
                return Ok(response);
            }

            if !response.is_unauthorized() {
                return Err(Error::status(response.status, request.to_string()));
            }

            match attempt.next() {
                Some(next) => {
                    warn!(
                        "{} answered unauthorized, token secret likely rotated; retrying once",
                        request
                    );
                    attempt = next;
                }
                None => {
                    return Err(Error::AuthExhausted {
                        attempts: attempt.number(),
                    })
                }
            }
        }
    }
}
