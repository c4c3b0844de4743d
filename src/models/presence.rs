use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Present,
    Absent,
    Departed,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Present => "present",
            PresenceStatus::Absent => "absent",
            PresenceStatus::Departed => "departed",
        }
    }
}

impl fmt::Display for PresenceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-identity memory kept by the tracker between cycles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub last_seen: DateTime<Utc>,
    pub missed_pings: u32,
}

impl DeviceState {
    pub fn seen_at(timestamp: DateTime<Utc>) -> Self {
        Self {
            last_seen: timestamp,
            missed_pings: 0,
        }
    }
}
