//! Read-only projections of the presence database for the `report` command.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use serde::Serialize;

use crate::db::{helpers::format_timestamp, Database, DeviceListing, PresenceStats};

const UNKNOWN: &str = "Unknown";

#[derive(Serialize)]
struct CsvRow<'a> {
    identity: &'a str,
    timestamp: String,
    status: &'static str,
    signal_strength: Option<i32>,
}

pub struct Reporter {
    db: Database,
}

impl Reporter {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub async fn list_devices(&self, active_only: bool) -> Result<Vec<DeviceListing>> {
        self.db.list_devices(active_only).await
    }

    pub async fn stats(&self) -> Result<PresenceStats> {
        self.db.stats(Utc::now()).await
    }

    /// Writes every presence event, newest first. Returns the number of rows
    /// written, header excluded.
    pub async fn export_csv(&self, path: &Path) -> Result<usize> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("csv"))
            .unwrap_or(false);
        if !is_csv {
            bail!("output path must end with .csv: {}", path.display());
        }

        let events = self.db.events_newest_first().await?;

        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        if events.is_empty() {
            writer.write_record(["identity", "timestamp", "status", "signal_strength"])?;
        }
        for event in &events {
            writer.serialize(CsvRow {
                identity: &event.identity,
                timestamp: format_timestamp(&event.timestamp),
                status: event.status.as_str(),
                signal_strength: event.signal_strength,
            })?;
        }
        writer
            .flush()
            .with_context(|| format!("failed to write {}", path.display()))?;

        Ok(events.len())
    }
}

pub fn format_device(device: &DeviceListing) -> String {
    format!(
        "ID: {} | Status: {} | Name: {} | Vendor: {} | Type: {}",
        device.identity_key,
        device.status,
        device.display_name.as_deref().unwrap_or(UNKNOWN),
        device.vendor_name.as_deref().unwrap_or(UNKNOWN),
        device.device_class.as_deref().unwrap_or(UNKNOWN),
    )
}

pub fn format_stats(stats: &PresenceStats) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Total unique devices: {}", stats.total_devices);
    let _ = writeln!(out, "Currently present: {}", stats.present_devices);
    let _ = writeln!(out, "Visits in last 24h: {}", stats.recent_visits);
    let _ = writeln!(out);
    let _ = writeln!(out, "Vendor Breakdown:");
    for (vendor, count) in &stats.vendor_breakdown {
        let _ = writeln!(out, "  {vendor}: {count}");
    }
    let _ = writeln!(out);
    let _ = writeln!(out, "Device Type Breakdown:");
    for (class, count) in &stats.class_breakdown {
        let _ = writeln!(out, "  {class}: {count}");
    }
    out
}
