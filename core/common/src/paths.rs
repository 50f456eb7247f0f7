//! Filesystem path helpers.

use std::path::{Path, PathBuf};

use crate::{Error, Result};

/// Permission bits for generated private keys.
pub const PRIVATE_KEY_PERMS: u32 = 0o600;
/// Permission bits for generated public keys.
pub const PUBLIC_KEY_PERMS: u32 = 0o644;
/// Permission bits for pulled objects.
pub const OBJECT_PERMS: u32 = 0o644;

/// Expand a leading `~` to the current user's home directory.
///
/// Paths without a leading `~` are returned unchanged. `~user` forms are
/// not supported and are rejected.
///
/// # Errors
/// - Home directory cannot be determined
/// - Path uses the unsupported `~user` form
pub fn expand_home(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let Some(raw) = path.to_str() else {
        return Ok(path.to_path_buf());
    };

    if raw != "~" && !raw.starts_with("~/") {
        if raw.starts_with('~') {
            return Err(Error::InvalidInput(format!(
                "Cannot expand user-specific home directory in '{}'",
                raw
            )));
        }
        return Ok(path.to_path_buf());
    }

    let home = dirs::home_dir()
        .ok_or_else(|| Error::InvalidInput("Cannot determine home directory".to_string()))?;

    match raw.strip_prefix("~/") {
        Some(rest) => Ok(home.join(rest)),
        None => Ok(home),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absolute_path_unchanged() {
        let expanded = expand_home("/etc/dead-drop/key").unwrap();
        assert_eq!(expanded, PathBuf::from("/etc/dead-drop/key"));
    }

    #[test]
    fn test_relative_path_unchanged() {
        let expanded = expand_home("keys/enc.key").unwrap();
        assert_eq!(expanded, PathBuf::from("keys/enc.key"));
    }

    #[test]
    fn test_tilde_expands_to_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~").unwrap(), home);
            assert_eq!(expand_home("~/.dead-drop/k").unwrap(), home.join(".dead-drop/k"));
        }
    }

    #[test]
    fn test_other_user_rejected() {
        assert!(expand_home("~alice/key").is_err());
    }
}
