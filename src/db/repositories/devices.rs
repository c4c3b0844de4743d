use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use crate::db::{
    connection::Database,
    helpers::{anonymize_identity, format_timestamp, parse_datetime, parse_status},
    models::Device,
};
use crate::models::PresenceStatus;

use super::presence_events::PresenceEventRepository;

pub struct DeviceRepository<'a> {
    conn: &'a Connection,
}

impl<'a> DeviceRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Insert or refresh a device. `first_seen` is only written on insert.
    pub fn upsert_status(
        &self,
        identity_key: &str,
        status: PresenceStatus,
        at: &DateTime<Utc>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO devices (identity_key, first_seen, last_seen, status)
                 VALUES (?1, ?2, ?2, ?3)
                 ON CONFLICT(identity_key) DO UPDATE SET
                     last_seen = excluded.last_seen,
                     status = excluded.status",
                params![identity_key, format_timestamp(at), status.as_str()],
            )
            .with_context(|| "failed to upsert device")?;
        Ok(())
    }

    /// Create the device row if it is missing; an existing status is left alone.
    pub fn ensure_exists(&self, identity_key: &str, at: &DateTime<Utc>) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO devices (identity_key, first_seen, last_seen, status)
                 VALUES (?1, ?2, ?2, ?3)",
                params![
                    identity_key,
                    format_timestamp(at),
                    PresenceStatus::Present.as_str()
                ],
            )
            .with_context(|| "failed to ensure device exists")?;
        Ok(())
    }

    pub fn get(&self, identity_key: &str) -> Result<Option<Device>> {
        let row = self
            .conn
            .query_row(
                "SELECT identity_key, first_seen, last_seen, status
                 FROM devices WHERE identity_key = ?1",
                params![identity_key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        row.map(|(identity_key, first_seen, last_seen, status)| {
            Ok(Device {
                identity_key,
                first_seen: parse_datetime(&first_seen, "first_seen")?,
                last_seen: parse_datetime(&last_seen, "last_seen")?,
                status: parse_status(&status)?,
            })
        })
        .transpose()
    }
}

impl Database {
    /// Upserts the device row and appends one presence event, atomically.
    ///
    /// The device row is keyed by the (possibly anonymized) identity; the
    /// event keeps the raw identity unless event-log anonymization is on.
    pub async fn record_presence(
        &self,
        identity: &str,
        status: PresenceStatus,
        signal_strength: Option<i32>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let identity_key = anonymize_identity(identity, self.anonymizes_devices());
        let event_identity = anonymize_identity(identity, self.anonymizes_event_log());

        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open presence transaction")?;
            DeviceRepository::new(&tx).upsert_status(&identity_key, status, &at)?;
            PresenceEventRepository::new(&tx).insert(
                &event_identity,
                status,
                signal_strength,
                &at,
            )?;
            tx.commit().context("failed to commit presence")?;
            Ok(())
        })
        .await
    }

    /// Looks up a device by raw identity, applying the database's key policy.
    pub async fn get_device(&self, identity: &str) -> Result<Option<Device>> {
        let identity_key = anonymize_identity(identity, self.anonymizes_devices());
        self.execute(move |conn| DeviceRepository::new(conn).get(&identity_key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn first_seen_is_kept_across_updates() {
        let db = Database::open_in_memory().unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 27, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 27, 12, 5, 0).unwrap();

        db.record_presence("AA:BB:CC:DD:EE:FF", PresenceStatus::Present, Some(-70), t1)
            .await
            .unwrap();
        db.record_presence("AA:BB:CC:DD:EE:FF", PresenceStatus::Absent, None, t2)
            .await
            .unwrap();

        let device = db.get_device("AA:BB:CC:DD:EE:FF").await.unwrap().unwrap();
        assert_eq!(device.first_seen, t1);
        assert_eq!(device.last_seen, t2);
        assert_eq!(device.status, PresenceStatus::Absent);
    }

    #[tokio::test]
    async fn anonymized_key_differs_from_event_identity() {
        let db = Database::open_in_memory()
            .unwrap()
            .with_anonymization(true, false);
        let now = Utc::now();

        db.record_presence("AA:BB:CC:DD:EE:FF", PresenceStatus::Present, Some(-60), now)
            .await
            .unwrap();

        let device = db.get_device("AA:BB:CC:DD:EE:FF").await.unwrap().unwrap();
        assert_eq!(
            device.identity_key,
            anonymize_identity("AA:BB:CC:DD:EE:FF", true)
        );

        let events = db.events_for_identity("AA:BB:CC:DD:EE:FF").await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].identity, "AA:BB:CC:DD:EE:FF");
        assert_eq!(events[0].signal_strength, Some(-60));
    }

    #[tokio::test]
    async fn event_log_anonymization_hashes_both_tables() {
        let db = Database::open_in_memory()
            .unwrap()
            .with_anonymization(true, true);

        db.record_presence("AA:BB:CC:DD:EE:FF", PresenceStatus::Present, None, Utc::now())
            .await
            .unwrap();

        assert!(db
            .events_for_identity("AA:BB:CC:DD:EE:FF")
            .await
            .unwrap()
            .is_empty());
        let hashed = anonymize_identity("AA:BB:CC:DD:EE:FF", true);
        assert_eq!(db.events_for_identity(&hashed).await.unwrap().len(), 1);
    }
}
