//! Settings of the advertising manager, optionally loaded from a JSON file.

use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use log::info;
use serde_json::Value;
use thiserror::Error;

/// Address rotation period used unless configured otherwise.
pub const DEFAULT_RPA_ROTATION_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Errors from loading an [`AdvertiserConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid value for {0}")]
    InvalidValue(&'static str),
}

/// How the manager picks and rotates advertising addresses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertiserConfig {
    /// Advertise from resolvable private addresses instead of the public one.
    pub privacy_enabled: bool,
    /// Period of the address rotation of each set.
    pub rpa_rotation_interval: Duration,
    /// The controller must never be handed advertising handle 0.
    pub reserve_zero_handle: bool,
}

impl Default for AdvertiserConfig {
    fn default() -> Self {
        AdvertiserConfig {
            privacy_enabled: true,
            rpa_rotation_interval: DEFAULT_RPA_ROTATION_INTERVAL,
            reserve_zero_handle: false,
        }
    }
}

fn get_bool(json: &Value, key: &'static str) -> Result<Option<bool>, ConfigError> {
    json.get(key).map(|v| v.as_bool().ok_or(ConfigError::InvalidValue(key))).transpose()
}

impl AdvertiserConfig {
    /// Reads the keys present in `json`, keeping defaults for the others.
    pub fn from_json(json: &Value) -> Result<Self, ConfigError> {
        let mut config = AdvertiserConfig::default();

        if let Some(privacy_enabled) = get_bool(json, "privacy_enabled")? {
            config.privacy_enabled = privacy_enabled;
        }
        if let Some(reserve_zero_handle) = get_bool(json, "reserve_zero_handle")? {
            config.reserve_zero_handle = reserve_zero_handle;
        }
        if let Some(v) = json.get("rpa_rotation_interval_ms") {
            let ms = v
                .as_u64()
                .filter(|ms| *ms > 0)
                .ok_or(ConfigError::InvalidValue("rpa_rotation_interval_ms"))?;
            config.rpa_rotation_interval = Duration::from_millis(ms);
        }

        Ok(config)
    }

    /// Loads the config from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut file = File::open(path.as_ref())?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        let config = AdvertiserConfig::from_json(&serde_json::from_str::<Value>(&contents)?)?;
        info!("Loaded advertiser config from {}: {:?}", path.as_ref().display(), config);
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = AdvertiserConfig::from_json(&json!({})).unwrap();
        assert_eq!(config, AdvertiserConfig::default());
        assert!(config.privacy_enabled);
        assert_eq!(config.rpa_rotation_interval, Duration::from_secs(900));
        assert!(!config.reserve_zero_handle);
    }

    #[test]
    fn test_from_json() {
        let config = AdvertiserConfig::from_json(&json!({
            "privacy_enabled": false,
            "rpa_rotation_interval_ms": 60000,
            "reserve_zero_handle": true,
        }))
        .unwrap();
        assert!(!config.privacy_enabled);
        assert_eq!(config.rpa_rotation_interval, Duration::from_secs(60));
        assert!(config.reserve_zero_handle);
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            AdvertiserConfig::from_json(&json!({ "privacy_enabled": "yes" })),
            Err(ConfigError::InvalidValue("privacy_enabled"))
        ));
        assert!(matches!(
            AdvertiserConfig::from_json(&json!({ "rpa_rotation_interval_ms": 0 })),
            Err(ConfigError::InvalidValue("rpa_rotation_interval_ms"))
        ));
        assert!(matches!(
            AdvertiserConfig::from_json(&json!({ "rpa_rotation_interval_ms": -5 })),
            Err(ConfigError::InvalidValue("rpa_rotation_interval_ms"))
        ));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(br#"{"privacy_enabled": false}"#).unwrap();

        let config = AdvertiserConfig::load(file.path()).unwrap();
        assert!(!config.privacy_enabled);
    }

    #[test]
    fn test_load_errors() {
        assert!(matches!(
            AdvertiserConfig::load("/nonexistent/advertiser.json"),
            Err(ConfigError::Io(_))
        ));

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"{not json").unwrap();
        assert!(matches!(AdvertiserConfig::load(file.path()), Err(ConfigError::Json(_))));
    }
}
