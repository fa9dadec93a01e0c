//! Session configuration.

use serde::Deserialize;

/// Per-session behavior.
///
/// Every field has a sensible default, so a config file only needs the
/// values it wants to change:
///
/// ```rust
/// use resona_session::SessionConfig;
///
/// let config = SessionConfig {
///     resume_timeout_secs: 120,
///     ..Default::default()
/// };
/// assert_eq!(config.player_update_interval_secs, 5);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// How long a paused session waits for a resume before it is evicted.
    pub resume_timeout_secs: u64,

    /// Whether a dropped transport pauses the session (`true`) or
    /// destroys it (`false`). Clients can change this per session with
    /// the `configureResuming` op.
    pub resuming: bool,

    /// Cadence of the per-player `playerUpdate` snapshots while a track
    /// is loaded.
    pub player_update_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            resume_timeout_secs: 60,
            resuming: false,
            player_update_interval_secs: 5,
        }
    }
}

/// Versions of the bundled audio libraries, reported in `hello`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LibraryVersions {
    pub audio: String,
    pub dsp: String,
}

impl Default for LibraryVersions {
    fn default() -> Self {
        Self {
            audio: "Unknown".into(),
            dsp: "Unknown".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_partial_config_fills_defaults() {
        let config: SessionConfig =
            serde_json::from_str(r#"{"resuming":true,"resumeTimeoutSecs":90}"#).unwrap();
        assert!(config.resuming);
        assert_eq!(config.resume_timeout_secs, 90);
        assert_eq!(config.player_update_interval_secs, 5);
    }

    #[test]
    fn test_library_versions_default_is_unknown() {
        let libs = LibraryVersions::default();
        assert_eq!(libs.audio, "Unknown");
        assert_eq!(libs.dsp, "Unknown");
    }
}
