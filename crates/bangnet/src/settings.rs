//! Settings loaded from a JSON file.

use std::path::Path;

use bangnet_transport::{ConnectionConfig, ServerConfig};
use serde::{Deserialize, Serialize};

use crate::BangnetError;

/// Client and server configuration in one document.
///
/// Every field is optional in the file; missing ones take their defaults.
///
/// ```json
/// {
///   "client": { "body_timeout_ms": 3000 },
///   "server": { "bind_addr": "0.0.0.0:47654", "max_clients": 16 }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Applied to outgoing client connections.
    pub client: ConnectionConfig,
    /// Applied to the lobby server.
    pub server: ServerConfig,
}

impl Settings {
    /// Parses a settings document held in memory.
    pub fn from_json_str(json: &str) -> Result<Self, BangnetError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a settings file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, BangnetError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| BangnetError::Settings {
            path: path.to_path_buf(),
            source,
        })?;
        let settings = Self::from_json_str(&json)?;
        tracing::debug!(path = %path.display(), "settings loaded");
        Ok(settings)
    }

    /// Serializes the settings in the same layout [`Settings::from_path`] reads.
    pub fn to_json_pretty(&self) -> Result<String, BangnetError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_gives_defaults() {
        assert_eq!(Settings::from_json_str("{}").unwrap(), Settings::default());
    }

    #[test]
    fn test_partial_document_keeps_other_defaults() {
        let settings = Settings::from_json_str(
            r#"{ "client": { "body_timeout_ms": 3000 }, "server": { "max_clients": 16 } }"#,
        )
        .unwrap();
        assert_eq!(settings.client.body_timeout_ms, 3000);
        assert!(settings.client.nodelay);
        assert_eq!(settings.server.max_clients, 16);
        assert_eq!(settings.server.bind_addr, "0.0.0.0:47654");
    }

    #[test]
    fn test_malformed_document_is_a_format_error() {
        let err =
            Settings::from_json_str(r#"{ "server": { "max_clients": "lots" } }"#).unwrap_err();
        assert!(matches!(err, BangnetError::SettingsFormat(_)));
    }

    #[test]
    fn test_pretty_json_reloads_identically() {
        let mut settings = Settings::default();
        settings.server.bind_addr = "127.0.0.1:9000".into();
        settings.client.max_frame_length = 4096;
        let json = settings.to_json_pretty().unwrap();
        assert_eq!(Settings::from_json_str(&json).unwrap(), settings);
    }

    #[test]
    fn test_from_path() {
        let path = std::env::temp_dir()
            .join(format!("bangnet-settings-{}.json", std::process::id()));
        std::fs::write(&path, r#"{ "server": { "bind_addr": "127.0.0.1:0" } }"#).unwrap();
        let settings = Settings::from_path(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(settings.server.bind_addr, "127.0.0.1:0");
    }

    #[test]
    fn test_missing_file_names_the_path() {
        let err = Settings::from_path("/definitely/not/here/bangnet.json").unwrap_err();
        assert!(matches!(err, BangnetError::Settings { .. }));
        assert!(err.to_string().contains("/definitely/not/here/bangnet.json"));
    }
}
