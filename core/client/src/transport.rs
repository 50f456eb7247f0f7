//! Transport seam between the client and the remote store.
//!
//! The orchestration code talks to the remote only through [`Transport`],
//! so the real HTTP client and the in-memory remote used in tests are
//! interchangeable.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::Serialize;
use tracing::{debug, warn};

use deaddrop_common::{Error, ObjectId, Result};
use deaddrop_crypto::BearerToken;

use crate::config::ClientConfig;

/// Token issuance endpoint.
pub const TOKEN_PATH: &str = "/token";
/// Object upload endpoint; downloads live under it.
pub const OBJECTS_PATH: &str = "/d";
/// Public key registration endpoint.
pub const ADD_KEY_PATH: &str = "/add-key";

pub const OCTET_STREAM: &str = "application/octet-stream";
pub const JSON: &str = "application/json";

/// Characters left unescaped in a URL path segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Path for downloading a single object.
pub fn object_path(object_id: &ObjectId) -> String {
    format!(
        "{}/{}",
        OBJECTS_PATH,
        utf8_percent_encode(object_id.as_str(), PATH_SEGMENT)
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// A request relative to the remote's base URL.
///
/// The bearer token is not part of the request; it is supplied per attempt
/// so a retried request never carries a stale token.
#[derive(Debug, Clone)]
pub struct RemoteRequest {
    pub method: Method,
    pub path: String,
    pub content_type: Option<&'static str>,
    pub body: Bytes,
}

impl RemoteRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            content_type: None,
            body: Bytes::new(),
        }
    }

    pub fn post(path: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            content_type: None,
            body: body.into(),
        }
    }

    /// POST with a JSON-encoded body.
    pub fn post_json<T: Serialize>(path: impl Into<String>, payload: &T) -> Result<Self> {
        let body = serde_json::to_vec(payload)
            .map_err(|e| Error::Serialization(format!("Failed to encode request: {}", e)))?;
        Ok(Self::post(path, body).with_content_type(JSON))
    }

    pub fn with_content_type(mut self, content_type: &'static str) -> Self {
        self.content_type = Some(content_type);
        self
    }
}

impl fmt::Display for RemoteRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.path)
    }
}

/// Status and body of a completed request.
#[derive(Debug, Clone)]
pub struct RemoteResponse {
    pub status: u16,
    pub body: Bytes,
}

impl RemoteResponse {
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The remote rejected the token (invalid or rotated out).
    pub fn is_unauthorized(&self) -> bool {
        self.status == 401
    }
}

/// Sends requests to the remote store.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send `request`, attaching `token` as the `Authorization` header when
    /// given.
    ///
    /// Non-success statuses are returned as responses, not errors; only
    /// transport-level failures (connection, TLS, timeout) are errors.
    async fn execute(
        &self,
        request: &RemoteRequest,
        token: Option<&BearerToken>,
    ) -> Result<RemoteResponse>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &T {
    async fn execute(
        &self,
        request: &RemoteRequest,
        token: Option<&BearerToken>,
    ) -> Result<RemoteResponse> {
        (**self).execute(request, token).await
    }
}

/// HTTP(S) transport backed by reqwest.
pub struct HttpTransport {
    http: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport for the configured remote.
    ///
    /// # Errors
    /// - `Config` if the remote is missing or invalid, or the HTTP client
    ///   cannot be built
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let base_url = config.remote()?;

        if config.insecure_skip_verify {
            warn!("Skipping TLS certificate verification, be careful!");
        }

        let http = Client::builder()
            .user_agent(concat!("dead-drop/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .danger_accept_invalid_certs(config.insecure_skip_verify)
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: &RemoteRequest,
        token: Option<&BearerToken>,
    ) -> Result<RemoteResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!("{} {}", request.method, url);

        let mut builder = match request.method {
            Method::Get => self.http.get(&url),
            Method::Post => self.http.post(&url).body(request.body.clone()),
        };

        if let Some(content_type) = request.content_type {
            builder = builder.header(CONTENT_TYPE, content_type);
        }

        if let Some(token) = token {
            let mut value = HeaderValue::from_str(token.as_str())
                .map_err(|_| Error::TokenDecrypt("Token is not a valid header value".to_string()))?;
            value.set_sensitive(true);
            builder = builder.header(AUTHORIZATION, value);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                Error::network(format!("{} timed out", request))
            } else {
                Error::network(format!("{}: {}", request, e))
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| Error::network(format!("Error reading response body: {}", e)))?;

        debug!(status, bytes = body.len(), "{} completed", request);

        Ok(RemoteResponse { status, body })
    }
}
