use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sighting of one device during a single scan cycle.
///
/// Observations only live for the duration of a cycle; everything worth
/// keeping is written through the persistence layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Observation {
    pub identity: String,
    /// dBm, more negative is weaker.
    pub signal_strength: i32,
    #[serde(default = "Utc::now")]
    pub observed_at: DateTime<Utc>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub vendor: Option<String>,
    #[serde(default)]
    pub service_ids: BTreeSet<String>,
    /// Keyed by the advertised company identifier.
    #[serde(default)]
    pub manufacturer_payload: BTreeMap<u16, Vec<u8>>,
    #[serde(default)]
    pub transmit_power: Option<i32>,
    #[serde(default)]
    pub service_payload: BTreeMap<String, Vec<u8>>,
    /// Vendor guessed from the OUI prefix. Only ever used as a fallback; it
    /// never overrides an advertised or stored vendor.
    #[serde(skip)]
    pub resolved_vendor: Option<String>,
}

impl Observation {
    pub fn new(identity: impl Into<String>, signal_strength: i32) -> Self {
        Self {
            identity: identity.into(),
            signal_strength,
            observed_at: Utc::now(),
            display_name: None,
            vendor: None,
            service_ids: BTreeSet::new(),
            manufacturer_payload: BTreeMap::new(),
            transmit_power: None,
            service_payload: BTreeMap::new(),
            resolved_vendor: None,
        }
    }

    /// True when the sighting carries anything beyond identity and signal.
    pub fn has_metadata(&self) -> bool {
        self.display_name.is_some()
            || self.vendor.is_some()
            || !self.service_ids.is_empty()
            || !self.manufacturer_payload.is_empty()
            || self.transmit_power.is_some()
            || !self.service_payload.is_empty()
            || self.resolved_vendor.is_some()
    }
}

/// Partial update for a device metadata row.
///
/// `None` means "not part of this update, keep what is stored". `Some` always
/// overwrites, including `Some` of an empty string or empty collection.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataUpdate {
    pub display_name: Option<String>,
    pub device_class: Option<String>,
    pub vendor_id: Option<String>,
    pub vendor_name: Option<String>,
    pub model: Option<String>,
    pub service_ids: Option<BTreeSet<String>>,
    pub manufacturer_payload: Option<BTreeMap<u16, Vec<u8>>>,
    pub transmit_power: Option<i32>,
    pub service_payload: Option<BTreeMap<String, Vec<u8>>>,
    /// Used for `vendor_name` only when neither this update nor the stored
    /// row has one and the lookup table does not know the prefix.
    pub vendor_hint: Option<String>,
}

impl From<&Observation> for MetadataUpdate {
    fn from(observation: &Observation) -> Self {
        // An advertisement that omits a collection says nothing about it, so
        // empty collections are treated as "not provided" here.
        let non_empty_set = |set: &BTreeSet<String>| (!set.is_empty()).then(|| set.clone());

        Self {
            display_name: observation.display_name.clone(),
            device_class: None,
            vendor_id: None,
            vendor_name: observation.vendor.clone(),
            model: None,
            service_ids: non_empty_set(&observation.service_ids),
            manufacturer_payload: (!observation.manufacturer_payload.is_empty())
                .then(|| observation.manufacturer_payload.clone()),
            transmit_power: observation.transmit_power,
            service_payload: (!observation.service_payload.is_empty())
                .then(|| observation.service_payload.clone()),
            vendor_hint: observation.resolved_vendor.clone(),
        }
    }
}
