use std::{collections::VecDeque, fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;

use crate::error::ScanError;
use crate::models::Observation;

use super::backend::ScanBackend;

/// Plays back recorded cycles from a JSON file: an array of cycles, each an
/// array of observations. Sighting times are rewritten to the replay time.
pub struct ReplayBackend {
    cycles: VecDeque<Vec<Observation>>,
    delivered: usize,
}

impl ReplayBackend {
    pub fn from_cycles(cycles: Vec<Vec<Observation>>) -> Self {
        Self {
            cycles: cycles.into(),
            delivered: 0,
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read replay file {}", path.display()))?;
        let cycles: Vec<Vec<Observation>> = serde_json::from_str(&contents)
            .with_context(|| format!("invalid replay file {}", path.display()))?;
        Ok(Self::from_cycles(cycles))
    }

    pub fn remaining(&self) -> usize {
        self.cycles.len()
    }
}

#[async_trait]
impl ScanBackend for ReplayBackend {
    async fn scan(&mut self, _duration: Duration) -> Result<Vec<Observation>, ScanError> {
        let Some(mut cycle) = self.cycles.pop_front() else {
            return Err(ScanError::Closed(format!(
                "replay finished after {} cycles",
                self.delivered
            )));
        };
        self.delivered += 1;

        let now = Utc::now();
        for observation in &mut cycle {
            observation.observed_at = now;
        }
        Ok(cycle)
    }

    fn name(&self) -> &'static str {
        "replay"
    }
}
