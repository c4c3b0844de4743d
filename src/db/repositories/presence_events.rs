use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use crate::db::{
    connection::Database,
    helpers::{format_timestamp, parse_datetime, parse_status},
    models::PresenceEvent,
};
use crate::models::PresenceStatus;

fn row_to_event(row: &Row) -> Result<PresenceEvent> {
    let timestamp: String = row.get("timestamp")?;
    let status: String = row.get("status")?;

    Ok(PresenceEvent {
        id: row.get("id")?,
        identity: row.get("identity")?,
        timestamp: parse_datetime(&timestamp, "timestamp")?,
        status: parse_status(&status)?,
        signal_strength: row.get("signal_strength")?,
    })
}

/// Identity whose most recent event left it tracked (present or absent).
#[derive(Debug, Clone, PartialEq)]
pub struct TrackedIdentity {
    pub identity: String,
    pub status: PresenceStatus,
    pub last_event_at: DateTime<Utc>,
}

pub struct PresenceEventRepository<'a> {
    conn: &'a Connection,
}

impl<'a> PresenceEventRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn insert(
        &self,
        identity: &str,
        status: PresenceStatus,
        signal_strength: Option<i32>,
        at: &DateTime<Utc>,
    ) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO presence_events (identity, timestamp, status, signal_strength)
                 VALUES (?1, ?2, ?3, ?4)",
                params![identity, format_timestamp(at), status.as_str(), signal_strength],
            )
            .with_context(|| "failed to append presence event")?;
        Ok(())
    }

    fn query(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<PresenceEvent>> {
        let mut stmt = self.conn.prepare(sql)?;
        let mut rows = stmt.query(params)?;
        let mut events = Vec::new();
        while let Some(row) = rows.next()? {
            events.push(row_to_event(row)?);
        }
        Ok(events)
    }

    pub fn for_identity(&self, identity: &str) -> Result<Vec<PresenceEvent>> {
        self.query(
            "SELECT id, identity, timestamp, status, signal_strength
             FROM presence_events
             WHERE identity = ?1
             ORDER BY id ASC",
            params![identity],
        )
    }

    pub fn newest_first(&self) -> Result<Vec<PresenceEvent>> {
        self.query(
            "SELECT id, identity, timestamp, status, signal_strength
             FROM presence_events
             ORDER BY timestamp DESC, id DESC",
            params![],
        )
    }

    pub fn count_since(&self, since: &DateTime<Utc>) -> Result<u64> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM presence_events WHERE timestamp > ?1",
            params![format_timestamp(since)],
            |row| row.get(0),
        )?;
        Ok(count.max(0) as u64)
    }

    /// Latest event per identity, keeping those not yet departed.
    pub fn tracked(&self) -> Result<Vec<TrackedIdentity>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.identity, e.status, e.timestamp
             FROM presence_events e
             JOIN (
                 SELECT identity, MAX(id) AS latest_id
                 FROM presence_events
                 GROUP BY identity
             ) latest ON latest.latest_id = e.id
             WHERE e.status != 'departed'
             ORDER BY e.identity",
        )?;

        let mut rows = stmt.query([])?;
        let mut tracked = Vec::new();
        while let Some(row) = rows.next()? {
            let status: String = row.get(1)?;
            let timestamp: String = row.get(2)?;
            tracked.push(TrackedIdentity {
                identity: row.get(0)?,
                status: parse_status(&status)?,
                last_event_at: parse_datetime(&timestamp, "timestamp")?,
            });
        }
        Ok(tracked)
    }
}

impl Database {
    /// Events stored under exactly this identity value, oldest first.
    pub async fn events_for_identity(&self, identity: &str) -> Result<Vec<PresenceEvent>> {
        let identity = identity.to_string();
        self.execute(move |conn| PresenceEventRepository::new(conn).for_identity(&identity))
            .await
    }

    pub async fn events_newest_first(&self) -> Result<Vec<PresenceEvent>> {
        self.execute(|conn| PresenceEventRepository::new(conn).newest_first())
            .await
    }

    /// Identities the tracker should resume watching after a restart.
    pub async fn tracked_identities(&self) -> Result<Vec<TrackedIdentity>> {
        self.execute(|conn| PresenceEventRepository::new(conn).tracked())
            .await
    }
}
