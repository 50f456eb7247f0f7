//! Client configuration.
//!
//! Settings come from a TOML file (by default `~/.dead-drop/config.toml`)
//! and are overridden by command-line flags. The resulting [`ClientConfig`]
//! is built once and handed to each operation; required settings are checked
//! through the accessor methods before any key is read or request is sent.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use deaddrop_common::{Error, KeyName, Result};

/// Directory under `$HOME` holding the default config file.
pub const DEFAULT_CONFIG_DIR: &str = ".dead-drop";

/// Default config file name.
pub const DEFAULT_CONFIG_NAME: &str = "config.toml";

/// Request timeout applied when the config does not set one.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Settings shared by all remote operations.
///
/// Keys in the file use the same names as the command-line flags:
///
/// ```toml
/// remote = "https://drop.example.com"
/// private-key = "~/.dead-drop/id_rsa"
/// key-name = "laptop"
/// encryption-key = "~/.dead-drop/shared.key"
/// insecure-skip-verify = false
/// request-timeout-secs = 30
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct ClientConfig {
    /// Base URL of the remote dead-drop host.
    pub remote: Option<String>,
    /// Private key used to decrypt authentication tokens.
    pub private_key: Option<PathBuf>,
    /// Name the matching public key is registered under.
    pub key_name: Option<String>,
    /// Symmetric key shared with the other party.
    pub encryption_key: Option<PathBuf>,
    /// Skip TLS certificate verification.
    pub insecure_skip_verify: bool,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: Option<u64>,
}

impl ClientConfig {
    /// Path of the default config file, if a home directory exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(DEFAULT_CONFIG_DIR).join(DEFAULT_CONFIG_NAME))
    }

    /// Load configuration.
    ///
    /// With an explicit `path` the file must exist and parse. Without one
    /// the default file is used when present, otherwise an empty config is
    /// returned so that flags alone can supply every setting.
    ///
    /// # Errors
    /// - `Config` if the file cannot be read or parsed
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::read_file(path),
            None => match Self::default_path() {
                Some(path) if path.is_file() => Self::read_file(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Error reading config file '{}': {}", path.display(), e))
        })?;
        Self::from_toml_str(&contents)
            .map_err(|e| Error::Config(format!("In '{}': {}", path.display(), e)))
    }

    /// Parse configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        toml::from_str(contents)
            .map_err(|e| Error::Config(format!("Invalid config file: {}", e)))
    }

    /// Overlay `overrides` on top of this config.
    ///
    /// Values set in `overrides` win; `insecure_skip_verify` is enabled if
    /// either side enables it.
    pub fn merge(self, overrides: ClientConfig) -> Self {
        Self {
            remote: overrides.remote.or(self.remote),
            private_key: overrides.private_key.or(self.private_key),
            key_name: overrides.key_name.or(self.key_name),
            encryption_key: overrides.encryption_key.or(self.encryption_key),
            insecure_skip_verify: overrides.insecure_skip_verify || self.insecure_skip_verify,
            request_timeout_secs: overrides.request_timeout_secs.or(self.request_timeout_secs),
        }
    }

    /// Base URL of the remote, without trailing slashes.
    ///
    /// # Errors
    /// - `Config` if unset, empty, or not an http(s) URL
    pub fn remote(&self) -> Result<String> {
        let raw = required_str(self.remote.as_deref(), "remote")?;
        let url = Url::parse(raw)
            .map_err(|e| Error::Config(format!("Invalid remote '{}': {}", raw, e)))?;
        if url.scheme() != "https" && url.scheme() != "http" {
            return Err(Error::Config(format!(
                "Remote '{}' must use http or https",
                raw
            )));
        }
        Ok(raw.trim_end_matches('/').to_string())
    }

    /// # Errors
    /// - `Config` if unset or empty
    pub fn private_key(&self) -> Result<&Path> {
        required_path(self.private_key.as_deref(), "private-key")
    }

    /// # Errors
    /// - `Config` if unset or empty
    pub fn encryption_key(&self) -> Result<&Path> {
        required_path(self.encryption_key.as_deref(), "encryption-key")
    }

    /// # Errors
    /// - `Config` if unset, empty, or not a safe key name
    pub fn key_name(&self) -> Result<KeyName> {
        let raw = required_str(self.key_name.as_deref(), "key-name")?;
        KeyName::new(raw).map_err(|e| Error::Config(format!("Setting 'key-name': {}", e)))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(
            self.request_timeout_secs
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
        )
    }
}

fn required_str<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(value) if !value.is_empty() => Ok(value),
        _ => Err(Error::Config(format!(
            "Setting '{}' not specified or empty",
            name
        ))),
    }
}

fn required_path<'a>(value: Option<&'a Path>, name: &str) -> Result<&'a Path> {
    match value {
        Some(path) if !path.as_os_str().is_empty() => Ok(path),
        _ => Err(Error::Config(format!(
            "Setting '{}' not specified or empty",
            name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_full_file() {
        let config = ClientConfig::from_toml_str(
            r#"
            remote = "https://drop.example.com/"
            private-key = "~/.dead-drop/id_rsa"
            key-name = "laptop"
            encryption-key = "/keys/shared.key"
            insecure-skip-verify = true
            request-timeout-secs = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.remote().unwrap(), "https://drop.example.com");
        assert_eq!(config.private_key().unwrap(), Path::new("~/.dead-drop/id_rsa"));
        assert_eq!(config.key_name().unwrap().as_str(), "laptop");
        assert_eq!(config.encryption_key().unwrap(), Path::new("/keys/shared.key"));
        assert!(config.insecure_skip_verify);
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = ClientConfig::from_toml_str("remot = \"https://x\"");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_missing_settings_are_config_errors() {
        let config = ClientConfig::default();
        assert!(matches!(config.remote(), Err(Error::Config(_))));
        assert!(matches!(config.private_key(), Err(Error::Config(_))));
        assert!(matches!(config.encryption_key(), Err(Error::Config(_))));
        assert!(matches!(config.key_name(), Err(Error::Config(_))));
        assert_eq!(
            config.request_timeout(),
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
    }

    #[test]
    fn test_empty_settings_are_config_errors() {
        let config = ClientConfig {
            remote: Some("  ".to_string()),
            key_name: Some(String::new()),
            private_key: Some(PathBuf::new()),
            ..Default::default()
        };
        assert!(matches!(config.remote(), Err(Error::Config(_))));
        assert!(matches!(config.key_name(), Err(Error::Config(_))));
        assert!(matches!(config.private_key(), Err(Error::Config(_))));
    }

    #[test]
    fn test_invalid_values() {
        let config = ClientConfig {
            remote: Some("ftp://drop.example.com".to_string()),
            key_name: Some("../../etc".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.remote(), Err(Error::Config(_))));
        assert!(matches!(config.key_name(), Err(Error::Config(_))));

        let config = ClientConfig {
            remote: Some("not a url".to_string()),
            ..Default::default()
        };
        assert!(matches!(config.remote(), Err(Error::Config(_))));
    }

    #[test]
    fn test_merge_prefers_overrides() {
        let file = ClientConfig {
            remote: Some("https://file".to_string()),
            key_name: Some("file-key".to_string()),
            insecure_skip_verify: true,
            ..Default::default()
        };
        let flags = ClientConfig {
            remote: Some("https://flag".to_string()),
            encryption_key: Some(PathBuf::from("/flag.key")),
            ..Default::default()
        };

        let merged = file.merge(flags);
        assert_eq!(merged.remote.as_deref(), Some("https://flag"));
        assert_eq!(merged.key_name.as_deref(), Some("file-key"));
        assert_eq!(merged.encryption_key, Some(PathBuf::from("/flag.key")));
        assert!(merged.insecure_skip_verify);
    }

    #[test]
    fn test_load_explicit_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "remote = \"http://localhost:8080\"").unwrap();

        let config = ClientConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.remote().unwrap(), "http://localhost:8080");
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = ClientConfig::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
