//! Common utilities and types shared across the dead-drop client crates.
//!
//! This module provides the error type every component reports through,
//! plus the small validated types that cross crate boundaries.

pub mod error;
pub mod paths;
pub mod types;

pub use error::{Error, Result};
pub use paths::{expand_home, OBJECT_PERMS, PRIVATE_KEY_PERMS, PUBLIC_KEY_PERMS};
pub use types::{KeyName, ObjectId};
