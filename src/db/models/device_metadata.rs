//! Descriptive metadata gathered from advertisements.
//!
//! Collections are stored as JSON text; byte payloads are hex encoded.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceMetadata {
    pub identity_key: String,
    pub display_name: Option<String>,
    pub device_class: Option<String>,
    pub vendor_id: Option<String>,
    pub vendor_name: Option<String>,
    pub model: Option<String>,
    pub service_ids: Option<String>,
    pub manufacturer_payload: Option<String>,
    pub transmit_power: Option<i32>,
    pub service_payload: Option<String>,
    pub first_detected: DateTime<Utc>,
    pub last_detected: DateTime<Utc>,
}

/// Row of the static OUI lookup table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VendorEntry {
    pub prefix: String,
    pub vendor_name: String,
    pub device_class: Option<String>,
}
