use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use rusqlite::{params, Connection};

use crate::db::{connection::Database, helpers::format_timestamp, models::RetentionReport};

fn delete_before(conn: &Connection, sql: &str, cutoff: &str, what: &str) -> Result<usize> {
    conn.execute(sql, params![cutoff])
        .with_context(|| format!("failed to purge expired {what}"))
}

/// Runs the three retention deletions. Each step is independent; a failure
/// is recorded in the report and the remaining steps still run.
pub fn purge_before(conn: &Connection, cutoff: &DateTime<Utc>) -> RetentionReport {
    let cutoff = format_timestamp(cutoff);
    let mut report = RetentionReport::default();

    match delete_before(
        conn,
        "DELETE FROM presence_events WHERE timestamp < ?1",
        &cutoff,
        "presence events",
    ) {
        Ok(count) => report.events_deleted = count,
        Err(err) => report.failures.push(format!("{err:#}")),
    }

    // Only devices that reached the terminal state age out.
    match delete_before(
        conn,
        "DELETE FROM devices WHERE last_seen < ?1 AND status = 'departed'",
        &cutoff,
        "devices",
    ) {
        Ok(count) => report.devices_deleted = count,
        Err(err) => report.failures.push(format!("{err:#}")),
    }

    match delete_before(
        conn,
        "DELETE FROM device_metadata WHERE last_detected < ?1",
        &cutoff,
        "device metadata",
    ) {
        Ok(count) => report.metadata_deleted = count,
        Err(err) => report.failures.push(format!("{err:#}")),
    }

    report
}

impl Database {
    /// Delete records older than `now - retention`.
    pub async fn purge_expired(
        &self,
        retention: Duration,
        now: DateTime<Utc>,
    ) -> Result<RetentionReport> {
        let cutoff = now - retention;
        let report = self.execute(move |conn| Ok(purge_before(conn, &cutoff))).await?;

        for failure in &report.failures {
            warn!("Retention step failed: {failure}");
        }
        if report.total_deleted() > 0 {
            info!(
                "Retention purged {} events, {} devices, {} metadata rows",
                report.events_deleted, report.devices_deleted, report.metadata_deleted
            );
        }

        Ok(report)
    }
}
