//! Dead-drop client.
//!
//! Encrypts local files, uploads the ciphertext to a remote dead-drop host
//! and fetches it back for a recipient holding the same encryption key.
//! Requests are authenticated by proving possession of a registered RSA key
//! pair (see [`auth`]).
//!
//! # Example
//!
//! ```no_run
//! use deaddrop_client::{ClientConfig, DeadDropClient};
//!
//! # async fn run() -> deaddrop_common::Result<()> {
//! let config = ClientConfig::load(None)?;
//! let client = DeadDropClient::connect(config)?;
//! let reference = client.drop_file("note.txt").await?;
//! client.pull(&reference.to_string(), "copy.txt").await?;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod files;
pub mod keygen;
pub mod memory;
pub mod transfer;
pub mod transport;

#[cfg(test)]
mod testutil;

pub use auth::Authenticator;
pub use config::ClientConfig;
pub use keygen::gen_key;
pub use memory::MemoryRemote;
pub use transfer::DeadDropClient;
pub use transport::{HttpTransport, RemoteRequest, RemoteResponse, Transport};
