use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PresenceStatus;

/// One row per identity. `identity_key` is the raw identity or its digest,
/// depending on the anonymization setting of the database.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Device {
    pub identity_key: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub status: PresenceStatus,
}
