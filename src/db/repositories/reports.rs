use std::collections::BTreeMap;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{parse_datetime, parse_status},
    models::{DeviceListing, PresenceStats},
};

use super::presence_events::PresenceEventRepository;

fn row_to_listing(row: &Row) -> Result<DeviceListing> {
    let status: String = row.get("status")?;
    let first_seen: String = row.get("first_seen")?;
    let last_seen: String = row.get("last_seen")?;

    Ok(DeviceListing {
        identity_key: row.get("identity_key")?,
        status: parse_status(&status)?,
        first_seen: parse_datetime(&first_seen, "first_seen")?,
        last_seen: parse_datetime(&last_seen, "last_seen")?,
        display_name: row.get("display_name")?,
        vendor_name: row.get("vendor_name")?,
        device_class: row.get("device_class")?,
    })
}

fn breakdown(conn: &Connection, column: &str) -> Result<BTreeMap<String, u64>> {
    let sql = format!(
        "SELECT COALESCE(NULLIF({column}, ''), 'Unknown') AS label, COUNT(*)
         FROM device_metadata
         GROUP BY label"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query([])?;
    let mut counts = BTreeMap::new();
    while let Some(row) = rows.next()? {
        let label: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        counts.insert(label, count.max(0) as u64);
    }
    Ok(counts)
}

pub struct ReportRepository<'a> {
    conn: &'a Connection,
}

impl<'a> ReportRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn list_devices(&self, active_only: bool) -> Result<Vec<DeviceListing>> {
        let filter = if active_only {
            "WHERE d.status IN ('present', 'absent')"
        } else {
            ""
        };
        let sql = format!(
            "SELECT d.identity_key, d.status, d.first_seen, d.last_seen,
                    m.display_name, m.vendor_name, m.device_class
             FROM devices d
             LEFT JOIN device_metadata m ON m.identity_key = d.identity_key
             {filter}
             ORDER BY d.last_seen DESC, d.identity_key ASC"
        );

        let mut stmt = self.conn.prepare(&sql)?;
        let mut rows = stmt.query([])?;
        let mut devices = Vec::new();
        while let Some(row) = rows.next()? {
            devices.push(row_to_listing(row)?);
        }
        Ok(devices)
    }

    pub fn stats(&self, now: &DateTime<Utc>) -> Result<PresenceStats> {
        let total: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
        let present: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM devices WHERE status = 'present'",
            [],
            |row| row.get(0),
        )?;
        let recent_visits =
            PresenceEventRepository::new(self.conn).count_since(&(*now - Duration::days(1)))?;

        Ok(PresenceStats {
            total_devices: total.max(0) as u64,
            present_devices: present.max(0) as u64,
            recent_visits,
            vendor_breakdown: breakdown(self.conn, "vendor_name")?,
            class_breakdown: breakdown(self.conn, "device_class")?,
        })
    }
}

impl Database {
    pub async fn list_devices(&self, active_only: bool) -> Result<Vec<DeviceListing>> {
        self.execute(move |conn| ReportRepository::new(conn).list_devices(active_only))
            .await
    }

    pub async fn stats(&self, now: DateTime<Utc>) -> Result<PresenceStats> {
        self.execute(move |conn| ReportRepository::new(conn).stats(&now))
            .await
    }
}
