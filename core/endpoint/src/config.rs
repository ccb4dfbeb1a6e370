//! Endpoint configuration and default storage policy.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use duosync_common::{Error, Result, SessionId};

/// Directory name created under the platform data directory.
const DATA_DIR_NAME: &str = "duosync";

/// Configuration for a local endpoint.
///
/// These settings drive the default policy used whenever the corresponding
/// [`crate::options::EndpointOption`] override is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    /// Base directory for default cache and staging locations. Falls back to
    /// the platform local data directory when unset.
    pub data_dir: Option<PathBuf>,
    /// Period of the default polling watcher.
    pub poll_interval: Duration,
    /// Whether scans record the executable bit of files.
    pub probe_executable: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            poll_interval: Duration::from_secs(2),
            probe_executable: cfg!(unix),
        }
    }
}

impl EndpointConfig {
    /// Set the data directory.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable or disable executable-bit probing.
    pub fn with_probe_executable(mut self, probe: bool) -> Self {
        self.probe_executable = probe;
        self
    }

    /// Resolve the base data directory.
    ///
    /// # Errors
    /// - Returns error if no data directory is configured and the platform
    ///   provides none
    pub fn data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => dirs::data_local_dir()
                .map(|dir| dir.join(DATA_DIR_NAME))
                .ok_or_else(|| Error::NotFound("No local data directory available".to_string())),
        }
    }

    /// Default snapshot cache location for one side of a session.
    pub fn default_cache_path(&self, session: &SessionId, alpha: bool) -> Result<PathBuf> {
        Ok(self
            .data_dir()?
            .join("caches")
            .join(format!("{}_{}.json", session, side_name(alpha))))
    }

    /// Default staging root for one side of a session.
    pub fn default_staging_root(&self, session: &SessionId, alpha: bool) -> Result<PathBuf> {
        Ok(self
            .data_dir()?
            .join("staging")
            .join(format!("{}_{}", session, side_name(alpha))))
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::Serialization(e.to_string()))
    }
}

/// Human-readable name of an endpoint side.
pub fn side_name(alpha: bool) -> &'static str {
    if alpha {
        "alpha"
    } else {
        "beta"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_paths_are_distinct_per_side() {
        let config = EndpointConfig::default().with_data_dir("/data");
        let session = SessionId::new("abc").unwrap();

        assert_eq!(
            config.default_cache_path(&session, true).unwrap(),
            PathBuf::from("/data/caches/abc_alpha.json")
        );
        assert_eq!(
            config.default_cache_path(&session, false).unwrap(),
            PathBuf::from("/data/caches/abc_beta.json")
        );
        assert_eq!(
            config.default_staging_root(&session, true).unwrap(),
            PathBuf::from("/data/staging/abc_alpha")
        );
    }

    #[test]
    fn test_builder() {
        let config = EndpointConfig::default()
            .with_poll_interval(Duration::from_millis(250))
            .with_probe_executable(false);
        assert_eq!(config.poll_interval, Duration::from_millis(250));
        assert!(!config.probe_executable);
        assert!(config.data_dir.is_none());
    }

    #[test]
    fn test_from_json_fills_defaults() {
        let config = EndpointConfig::from_json(r#"{"data_dir": "/srv/duosync"}"#).unwrap();
        assert_eq!(config.data_dir, Some(PathBuf::from("/srv/duosync")));
        assert_eq!(config.poll_interval, EndpointConfig::default().poll_interval);

        assert!(matches!(
            EndpointConfig::from_json("not json"),
            Err(Error::Serialization(_))
        ));
    }
}
