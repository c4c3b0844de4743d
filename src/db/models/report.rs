use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::PresenceStatus;

/// Device row joined with whatever metadata is known for it.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct DeviceListing {
    pub identity_key: String,
    pub status: PresenceStatus,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub display_name: Option<String>,
    pub vendor_name: Option<String>,
    pub device_class: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq)]
pub struct PresenceStats {
    pub total_devices: u64,
    pub present_devices: u64,
    /// Presence events recorded in the last 24 hours.
    pub recent_visits: u64,
    pub vendor_breakdown: BTreeMap<String, u64>,
    pub class_breakdown: BTreeMap<String, u64>,
}

/// Outcome of one retention pass. A failed step leaves its count at zero and
/// is named in `failures`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetentionReport {
    pub events_deleted: usize,
    pub devices_deleted: usize,
    pub metadata_deleted: usize,
    pub failures: Vec<String>,
}

impl RetentionReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn total_deleted(&self) -> usize {
        self.events_deleted + self.devices_deleted + self.metadata_deleted
    }
}
