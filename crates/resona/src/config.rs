//! Server configuration.

use std::path::Path;

use resona_session::{LibraryVersions, SessionConfig};
use serde::Deserialize;

use crate::ResonaError;

/// Everything needed to start a node.
///
/// Loadable from JSON; missing fields take their defaults:
///
/// ```json
/// {
///   "bindAddr": "0.0.0.0:2333",
///   "password": "youshallnotpass",
///   "session": { "resumeTimeoutSecs": 120 }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ServerConfig {
    pub bind_addr: String,
    /// Value clients must send in `Authorization`. `None` disables the
    /// check.
    pub password: Option<String>,
    pub session: SessionConfig,
    pub libraries: LibraryVersions,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:2333".into(),
            password: None,
            session: SessionConfig::default(),
            libraries: LibraryVersions::default(),
        }
    }
}

impl ServerConfig {
    /// Parses a JSON config.
    pub fn from_json(json: &str) -> Result<Self, ResonaError> {
        serde_json::from_str(json).map_err(ResonaError::Config)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResonaError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }
}
