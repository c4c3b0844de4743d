use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use sha2::{Digest, Sha256};

use crate::models::PresenceStatus;

/// Fixed-width RFC 3339 so that string comparison in SQL orders by time.
pub fn format_timestamp(value: &DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_datetime(value: &str, field: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("failed to parse {field}"))
}

pub fn parse_status(value: &str) -> Result<PresenceStatus> {
    match value {
        "present" => Ok(PresenceStatus::Present),
        "absent" => Ok(PresenceStatus::Absent),
        "departed" => Ok(PresenceStatus::Departed),
        other => Err(anyhow!("unknown presence status {other}")),
    }
}

/// One-way storage key for an identity when anonymization is on.
pub fn anonymize_identity(identity: &str, enabled: bool) -> String {
    if !enabled {
        return identity.to_string();
    }
    let mut hasher = Sha256::new();
    hasher.update(identity.as_bytes());
    format!("{:x}", hasher.finalize())
}

pub fn serialize_service_ids(ids: &BTreeSet<String>) -> Result<String> {
    serde_json::to_string(ids).context("failed to serialize service ids")
}

pub fn serialize_manufacturer_payload(payload: &BTreeMap<u16, Vec<u8>>) -> Result<String> {
    let encoded: BTreeMap<String, String> = payload
        .iter()
        .map(|(company_id, bytes)| (company_id.to_string(), hex::encode(bytes)))
        .collect();
    serde_json::to_string(&encoded).context("failed to serialize manufacturer payload")
}

pub fn serialize_service_payload(payload: &BTreeMap<String, Vec<u8>>) -> Result<String> {
    let encoded: BTreeMap<&str, String> = payload
        .iter()
        .map(|(service, bytes)| (service.as_str(), hex::encode(bytes)))
        .collect();
    serde_json::to_string(&encoded).context("failed to serialize service payload")
}
