use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::{
    connection::Database,
    helpers::{
        anonymize_identity, format_timestamp, parse_datetime, serialize_manufacturer_payload,
        serialize_service_ids, serialize_service_payload,
    },
    models::{DeviceMetadata, VendorEntry},
};
use crate::models::MetadataUpdate;
use crate::vendor::oui_prefix;

use super::devices::DeviceRepository;

fn row_to_metadata(row: &Row) -> Result<DeviceMetadata> {
    let first_detected: String = row.get("first_detected")?;
    let last_detected: String = row.get("last_detected")?;

    Ok(DeviceMetadata {
        identity_key: row.get("identity_key")?,
        display_name: row.get("display_name")?,
        device_class: row.get("device_class")?,
        vendor_id: row.get("vendor_id")?,
        vendor_name: row.get("vendor_name")?,
        model: row.get("model")?,
        service_ids: row.get("service_ids")?,
        manufacturer_payload: row.get("manufacturer_payload")?,
        transmit_power: row.get("transmit_power")?,
        service_payload: row.get("service_payload")?,
        first_detected: parse_datetime(&first_detected, "first_detected")?,
        last_detected: parse_datetime(&last_detected, "last_detected")?,
    })
}

pub struct DeviceMetadataRepository<'a> {
    conn: &'a Connection,
}

impl<'a> DeviceMetadataRepository<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub fn find_vendor(&self, prefix: &str) -> Result<Option<VendorEntry>> {
        self.conn
            .query_row(
                "SELECT prefix, vendor_name, device_class FROM vendor_lookup WHERE prefix = ?1",
                params![prefix],
                |row| {
                    Ok(VendorEntry {
                        prefix: row.get(0)?,
                        vendor_name: row.get(1)?,
                        device_class: row.get(2)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    /// Upsert one metadata row.
    ///
    /// Every column resolves as: explicit value from `update`, else the stored
    /// value, else (vendor columns only) the `fallback` lookup entry.
    pub fn upsert(
        &self,
        identity_key: &str,
        update: &MetadataUpdate,
        fallback: Option<&VendorEntry>,
        at: &DateTime<Utc>,
    ) -> Result<()> {
        let service_ids = update
            .service_ids
            .as_ref()
            .map(serialize_service_ids)
            .transpose()?;
        let manufacturer_payload = update
            .manufacturer_payload
            .as_ref()
            .map(serialize_manufacturer_payload)
            .transpose()?;
        let service_payload = update
            .service_payload
            .as_ref()
            .map(serialize_service_payload)
            .transpose()?;

        self.conn
            .execute(
                "INSERT INTO device_metadata (
                    identity_key,
                    display_name,
                    device_class,
                    vendor_id,
                    vendor_name,
                    model,
                    service_ids,
                    manufacturer_payload,
                    transmit_power,
                    service_payload,
                    first_detected,
                    last_detected
                ) VALUES (
                    ?1, ?2, COALESCE(?3, ?12), COALESCE(?4, ?13), COALESCE(?5, ?14),
                    ?6, ?7, ?8, ?9, ?10, ?11, ?11
                )
                ON CONFLICT(identity_key) DO UPDATE SET
                    display_name = COALESCE(?2, device_metadata.display_name),
                    device_class = COALESCE(?3, device_metadata.device_class, ?12),
                    vendor_id = COALESCE(?4, device_metadata.vendor_id, ?13),
                    vendor_name = COALESCE(?5, device_metadata.vendor_name, ?14),
                    model = COALESCE(?6, device_metadata.model),
                    service_ids = COALESCE(?7, device_metadata.service_ids),
                    manufacturer_payload = COALESCE(?8, device_metadata.manufacturer_payload),
                    transmit_power = COALESCE(?9, device_metadata.transmit_power),
                    service_payload = COALESCE(?10, device_metadata.service_payload),
                    last_detected = ?11",
                params![
                    identity_key,
                    update.display_name,
                    update.device_class,
                    update.vendor_id,
                    update.vendor_name,
                    update.model,
                    service_ids,
                    manufacturer_payload,
                    update.transmit_power,
                    service_payload,
                    format_timestamp(at),
                    fallback.and_then(|entry| entry.device_class.clone()),
                    fallback.map(|entry| entry.prefix.clone()),
                    fallback.map(|entry| entry.vendor_name.clone()),
                ],
            )
            .with_context(|| "failed to upsert device metadata")?;
        Ok(())
    }

    pub fn get(&self, identity_key: &str) -> Result<Option<DeviceMetadata>> {
        let mut stmt = self.conn.prepare(
            "SELECT identity_key, display_name, device_class, vendor_id, vendor_name, model,
                    service_ids, manufacturer_payload, transmit_power, service_payload,
                    first_detected, last_detected
             FROM device_metadata
             WHERE identity_key = ?1",
        )?;
        let mut rows = stmt.query(params![identity_key])?;
        match rows.next()? {
            Some(row) => Ok(Some(row_to_metadata(row)?)),
            None => Ok(None),
        }
    }
}

impl Database {
    /// Make sure the device exists, then merge `update` into its metadata row.
    ///
    /// Vendor name and class fall back to the OUI lookup table, then to the
    /// update's `vendor_hint`, when neither the update nor the stored row
    /// provides them.
    pub async fn record_metadata(
        &self,
        identity: &str,
        update: MetadataUpdate,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let identity_key = anonymize_identity(identity, self.anonymizes_devices());
        let prefix = oui_prefix(identity);

        self.execute(move |conn| {
            let tx = conn
                .transaction()
                .context("failed to open metadata transaction")?;

            DeviceRepository::new(&tx).ensure_exists(&identity_key, &at)?;

            let repo = DeviceMetadataRepository::new(&tx);
            let needs_lookup = update.vendor_name.is_none() || update.device_class.is_none();
            let fallback = match (&prefix, needs_lookup) {
                (Some(prefix), true) => repo.find_vendor(prefix)?.or_else(|| {
                    update.vendor_hint.clone().map(|vendor_name| VendorEntry {
                        prefix: prefix.clone(),
                        vendor_name,
                        device_class: None,
                    })
                }),
                _ => None,
            };

            repo.upsert(&identity_key, &update, fallback.as_ref(), &at)?;
            tx.commit().context("failed to commit metadata")?;
            Ok(())
        })
        .await
    }

    pub async fn get_metadata(&self, identity: &str) -> Result<Option<DeviceMetadata>> {
        let identity_key = anonymize_identity(identity, self.anonymizes_devices());
        self.execute(move |conn| DeviceMetadataRepository::new(conn).get(&identity_key))
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet};

    use super::*;
    use crate::models::PresenceStatus;
    use chrono::TimeZone;

    const MAC: &str = "AA:BB:CC:DD:EE:FF";

    #[tokio::test]
    async fn creates_device_without_touching_existing_status() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        db.record_presence(MAC, PresenceStatus::Absent, None, now)
            .await
            .unwrap();
        db.record_metadata(
            MAC,
            MetadataUpdate {
                display_name: Some("John's iPhone".into()),
                ..MetadataUpdate::default()
            },
            now,
        )
        .await
        .unwrap();

        let device = db.get_device(MAC).await.unwrap().unwrap();
        assert_eq!(device.status, PresenceStatus::Absent);
    }

    #[tokio::test]
    async fn partial_update_preserves_stored_fields() {
        let db = Database::open_in_memory().unwrap();
        let t1 = Utc.with_ymd_and_hms(2026, 3, 27, 12, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 3, 27, 12, 1, 0).unwrap();

        let mut manufacturer = BTreeMap::new();
        manufacturer.insert(0xFFFFu16, b"test".to_vec());
        let full = MetadataUpdate {
            display_name: Some("Test Device".into()),
            device_class: Some("BLE".into()),
            vendor_name: Some("Test Vendor".into()),
            model: Some("12345".into()),
            service_ids: Some(BTreeSet::from([
                "0000180a-0000-1000-8000-00805f9b34fb".to_string(),
            ])),
            manufacturer_payload: Some(manufacturer),
            transmit_power: Some(-70),
            ..MetadataUpdate::default()
        };
        db.record_metadata(MAC, full, t1).await.unwrap();

        db.record_metadata(
            MAC,
            MetadataUpdate {
                display_name: Some("Updated Name".into()),
                ..MetadataUpdate::default()
            },
            t2,
        )
        .await
        .unwrap();

        let stored = db.get_metadata(MAC).await.unwrap().unwrap();
        assert_eq!(stored.display_name.as_deref(), Some("Updated Name"));
        assert_eq!(stored.vendor_name.as_deref(), Some("Test Vendor"));
        assert_eq!(stored.device_class.as_deref(), Some("BLE"));
        assert_eq!(stored.model.as_deref(), Some("12345"));
        assert_eq!(stored.transmit_power, Some(-70));
        assert_eq!(
            stored.service_ids.as_deref(),
            Some(r#"["0000180a-0000-1000-8000-00805f9b34fb"]"#)
        );
        assert_eq!(
            stored.manufacturer_payload.as_deref(),
            Some(r#"{"65535":"74657374"}"#)
        );
        assert_eq!(stored.first_detected, t1);
        assert_eq!(stored.last_detected, t2);
    }

    #[tokio::test]
    async fn explicit_empty_values_overwrite() {
        let db = Database::open_in_memory().unwrap();
        let now = Utc::now();

        db.record_metadata(
            MAC,
            MetadataUpdate {
                display_name: Some("Old Device".into()),
                service_ids: Some(BTreeSet::from(["180a".to_string()])),
                ..MetadataUpdate::default()
            },
            now,
        )
        .await
        .unwrap();

        db.record_metadata(
            MAC,
            MetadataUpdate {
                display_name: Some(String::new()),
                service_ids: Some(BTreeSet::new()),
                ..MetadataUpdate::default()
            },
            now,
        )
        .await
        .unwrap();

        let stored = db.get_metadata(MAC).await.unwrap().unwrap();
        assert_eq!(stored.display_name.as_deref(), Some(""));
        assert_eq!(stored.service_ids.as_deref(), Some("[]"));
    }

    #[tokio::test]
    async fn vendor_falls_back_to_lookup_table() {
        let db = Database::open_in_memory().unwrap();
        let apple = "A4:C1:38:00:11:22";

        db.record_metadata(apple, MetadataUpdate::default(), Utc::now())
            .await
            .unwrap();

        let stored = db.get_metadata(apple).await.unwrap().unwrap();
        assert_eq!(stored.vendor_name.as_deref(), Some("Apple"));
        assert_eq!(stored.vendor_id.as_deref(), Some("A4C138"));
        assert_eq!(stored.device_class.as_deref(), Some("personal device"));
    }

    #[tokio::test]
    async fn explicit_vendor_wins_over_lookup() {
        let db = Database::open_in_memory().unwrap();
        let apple = "A4:C1:38:00:11:22";

        db.record_metadata(
            apple,
            MetadataUpdate {
                vendor_name: Some("Refurbished Co".into()),
                ..MetadataUpdate::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();

        let stored = db.get_metadata(apple).await.unwrap().unwrap();
        assert_eq!(stored.vendor_name.as_deref(), Some("Refurbished Co"));
        assert_eq!(stored.device_class.as_deref(), Some("personal device"));
    }

    #[tokio::test]
    async fn stored_vendor_beats_lookup_on_update() {
        let db = Database::open_in_memory().unwrap();
        let apple = "A4:C1:38:00:11:22";

        db.record_metadata(
            apple,
            MetadataUpdate {
                vendor_name: Some("Old Vendor".into()),
                ..MetadataUpdate::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
        db.record_metadata(apple, MetadataUpdate::default(), Utc::now())
            .await
            .unwrap();

        let stored = db.get_metadata(apple).await.unwrap().unwrap();
        assert_eq!(stored.vendor_name.as_deref(), Some("Old Vendor"));
    }

    #[tokio::test]
    async fn hint_never_replaces_an_advertised_vendor() {
        let db = Database::open_in_memory().unwrap();
        let apple = "A4:C1:38:00:00:01";

        db.record_metadata(
            apple,
            MetadataUpdate {
                vendor_name: Some("Custom".into()),
                ..MetadataUpdate::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();
        db.record_metadata(
            apple,
            MetadataUpdate {
                vendor_hint: Some("Apple".into()),
                ..MetadataUpdate::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();

        let stored = db.get_metadata(apple).await.unwrap().unwrap();
        assert_eq!(stored.vendor_name.as_deref(), Some("Custom"));
    }

    #[tokio::test]
    async fn hint_fills_vendor_for_prefix_missing_from_table() {
        let db = Database::open_in_memory().unwrap();
        let unlisted = "12:34:56:00:00:01";

        db.record_metadata(
            unlisted,
            MetadataUpdate {
                vendor_hint: Some("Acme".into()),
                ..MetadataUpdate::default()
            },
            Utc::now(),
        )
        .await
        .unwrap();

        let stored = db.get_metadata(unlisted).await.unwrap().unwrap();
        assert_eq!(stored.vendor_name.as_deref(), Some("Acme"));
        assert_eq!(stored.vendor_id.as_deref(), Some("123456"));
        assert!(stored.device_class.is_none());
    }

    #[tokio::test]
    async fn anonymized_metadata_references_anonymized_device() {
        let db = Database::open_in_memory()
            .unwrap()
            .with_anonymization(true, false);

        db.record_metadata(MAC, MetadataUpdate::default(), Utc::now())
            .await
            .unwrap();

        let stored = db.get_metadata(MAC).await.unwrap().unwrap();
        let device = db.get_device(MAC).await.unwrap().unwrap();
        assert_eq!(stored.identity_key, device.identity_key);
        assert_ne!(stored.identity_key, MAC);
    }
}
