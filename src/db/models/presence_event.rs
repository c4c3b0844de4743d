use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::PresenceStatus;

/// Append-only audit row written for every presence transition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PresenceEvent {
    pub id: i64,
    pub identity: String,
    pub timestamp: DateTime<Utc>,
    pub status: PresenceStatus,
    pub signal_strength: Option<i32>,
}
