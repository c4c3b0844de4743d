use anyhow::{bail, Result};
use log::info;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::db::Database;
use crate::error::LoopError;
use crate::presence::PresenceTracker;

use super::backend::ScanBackend;
use super::loop_worker::{scan_loop, ScanSchedule, ScanSummary};

/// Owns the background scan task.
#[derive(Default)]
pub struct ScanController {
    handle: Option<JoinHandle<ScanSummary>>,
    cancel_token: Option<CancellationToken>,
}

impl ScanController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        self.handle.is_some()
    }

    pub fn start(
        &mut self,
        backend: Box<dyn ScanBackend>,
        tracker: PresenceTracker,
        db: Database,
        schedule: ScanSchedule,
    ) -> Result<CancellationToken> {
        if self.handle.is_some() {
            bail!("scan loop already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(scan_loop(
            backend,
            tracker,
            db,
            schedule,
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token.clone());
        Ok(cancel_token)
    }

    /// Waits for the loop to finish on its own or through its token.
    pub async fn wait(&mut self) -> Result<ScanSummary, LoopError> {
        self.cancel_token = None;
        let Some(handle) = self.handle.take() else {
            return Ok(ScanSummary::default());
        };

        match handle.await {
            Ok(summary) => {
                info!(
                    "scan loop finished after {} cycles ({} failed)",
                    summary.completed_cycles, summary.failed_cycles
                );
                Ok(summary)
            }
            Err(err) if err.is_panic() => Err(LoopError::Fatal("scan loop panicked".into())),
            Err(err) => Err(LoopError::Fatal(format!(
                "scan loop task failed to join: {err}"
            ))),
        }
    }

    pub async fn stop(&mut self) -> Result<ScanSummary, LoopError> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }
        self.wait().await
    }
}
