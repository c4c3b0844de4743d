use std::time::Duration;

use async_trait::async_trait;

use crate::error::ScanError;
use crate::models::Observation;

/// Source of observations. One call is one scan cycle.
#[async_trait]
pub trait ScanBackend: Send {
    /// Listen for up to `duration` and return everything heard. An empty
    /// result means nothing was in range, not a failure.
    async fn scan(&mut self, duration: Duration) -> Result<Vec<Observation>, ScanError>;

    fn name(&self) -> &'static str;
}
