use std::{fs, path::Path, path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::presence::TrackerConfig;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresenceSettings {
    pub scan_interval_secs: u64,
    pub scan_duration_secs: u64,
    /// Missed pings before a device is reported absent.
    pub ping_timeout: u32,
    /// Missed pings before a device is reported departed and forgotten.
    pub departure_threshold: u32,
    /// dBm. Observations strictly weaker than this are dropped.
    pub rssi_floor: i32,
    pub retention_days: u32,
    /// Store a SHA-256 digest instead of the raw identity as the device key.
    /// Must not change over the lifetime of a database.
    pub anonymize_devices: bool,
    /// Apply the same digest to identities in the presence event log.
    pub anonymize_event_log: bool,
    pub database_path: PathBuf,
    pub failure_backoff_secs: u64,
}

impl Default for PresenceSettings {
    fn default() -> Self {
        Self {
            scan_interval_secs: 30,
            scan_duration_secs: 10,
            ping_timeout: 3,
            departure_threshold: 5,
            rssi_floor: -80,
            retention_days: 90,
            anonymize_devices: true,
            anonymize_event_log: false,
            database_path: PathBuf::from("presence.sqlite3"),
            failure_backoff_secs: 5,
        }
    }
}

impl PresenceSettings {
    /// Loads settings from a JSON file. Keys missing from the file keep their
    /// defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scan_interval_secs == 0 {
            return Err(ConfigError::NotPositive {
                field: "scan_interval_secs",
            });
        }
        if self.scan_duration_secs == 0 {
            return Err(ConfigError::NotPositive {
                field: "scan_duration_secs",
            });
        }
        if self.scan_duration_secs > self.scan_interval_secs {
            return Err(ConfigError::DurationExceedsInterval {
                duration: self.scan_duration_secs,
                interval: self.scan_interval_secs,
            });
        }
        TrackerConfig::from(self).validate()?;
        if self.retention_days == 0 {
            return Err(ConfigError::NotPositive {
                field: "retention_days",
            });
        }
        Ok(())
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    pub fn failure_backoff(&self) -> Duration {
        Duration::from_secs(self.failure_backoff_secs)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let settings = PresenceSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.ping_timeout, 3);
        assert_eq!(settings.departure_threshold, 5);
        assert_eq!(settings.rssi_floor, -80);
    }

    #[test]
    fn departure_must_exceed_ping_timeout() {
        let settings = PresenceSettings {
            ping_timeout: 4,
            departure_threshold: 4,
            ..PresenceSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::ThresholdOrder { .. })
        ));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let settings = PresenceSettings {
            scan_interval_secs: 0,
            ..PresenceSettings::default()
        };
        assert!(matches!(
            settings.validate(),
            Err(ConfigError::NotPositive {
                field: "scan_interval_secs"
            })
        ));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"ping_timeout": 2, "anonymize_devices": false}}"#).unwrap();

        let settings = PresenceSettings::load(file.path()).unwrap();
        assert_eq!(settings.ping_timeout, 2);
        assert!(!settings.anonymize_devices);
        assert_eq!(settings.departure_threshold, 5);
        assert_eq!(settings.scan_interval_secs, 30);
    }

    #[test]
    fn malformed_file_is_a_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        assert!(matches!(
            PresenceSettings::load(file.path()),
            Err(ConfigError::Parse { .. })
        ));
    }
}
