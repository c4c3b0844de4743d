use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::db::Database;
use crate::models::{MetadataUpdate, PresenceStatus};

/// Where the tracker sends its transitions.
#[async_trait]
pub trait PresenceStore: Send + Sync {
    async fn record_presence(
        &self,
        identity: &str,
        status: PresenceStatus,
        signal_strength: Option<i32>,
        at: DateTime<Utc>,
    ) -> Result<()>;

    async fn record_metadata(
        &self,
        identity: &str,
        update: MetadataUpdate,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

#[async_trait]
impl PresenceStore for Database {
    async fn record_presence(
        &self,
        identity: &str,
        status: PresenceStatus,
        signal_strength: Option<i32>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        Database::record_presence(self, identity, status, signal_strength, at).await
    }

    async fn record_metadata(
        &self,
        identity: &str,
        update: MetadataUpdate,
        at: DateTime<Utc>,
    ) -> Result<()> {
        Database::record_metadata(self, identity, update, at).await
    }
}
