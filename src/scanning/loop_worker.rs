use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    db::Database,
    error::ScanError,
    models::Observation,
    presence::PresenceTracker,
    settings::PresenceSettings,
    vendor::VendorResolver,
};

use super::backend::ScanBackend;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_error, log_info, log_warn};

/// Extra time a backend gets past its scan window before the cycle is
/// abandoned.
const SCAN_GRACE_SECS: u64 = 5;

/// Timing of the scan loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanSchedule {
    pub interval: Duration,
    pub scan_duration: Duration,
    pub scan_grace: Duration,
    pub failure_backoff: Duration,
    pub retention: chrono::Duration,
}

impl From<&PresenceSettings> for ScanSchedule {
    fn from(settings: &PresenceSettings) -> Self {
        Self {
            interval: settings.scan_interval(),
            scan_duration: settings.scan_duration(),
            scan_grace: Duration::from_secs(SCAN_GRACE_SECS),
            failure_backoff: settings.failure_backoff(),
            retention: settings.retention(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanSummary {
    pub completed_cycles: u64,
    pub failed_cycles: u64,
}

/// Attaches the OUI vendor to each sighting as a fallback hint. The
/// advertised `vendor` field is left alone.
pub fn resolve_vendors(observations: &mut [Observation], resolver: &VendorResolver) {
    for observation in observations.iter_mut() {
        observation.resolved_vendor = resolver.resolve(&observation.identity);
    }
}

/// Sleeps unless cancelled first. Returns false on cancellation.
async fn pause(cancel_token: &CancellationToken, duration: Duration) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel_token.cancelled() => false,
    }
}

pub async fn scan_loop(
    mut backend: Box<dyn ScanBackend>,
    mut tracker: PresenceTracker,
    db: Database,
    schedule: ScanSchedule,
    cancel_token: CancellationToken,
) -> ScanSummary {
    let resolver = VendorResolver::default();
    let mut summary = ScanSummary::default();

    log_info!(
        "scan loop started with {} backend (interval {:?}, window {:?}, {} identities restored)",
        backend.name(),
        schedule.interval,
        schedule.scan_duration,
        tracker.tracked_count()
    );

    loop {
        let cycle_start = Instant::now();
        let scan_timeout = schedule.scan_duration + schedule.scan_grace;

        let outcome = tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("scan loop shutting down");
                break;
            }
            result = tokio::time::timeout(scan_timeout, backend.scan(schedule.scan_duration)) => result,
        };

        let mut observations = match outcome {
            Ok(Ok(observations)) => observations,
            Ok(Err(ScanError::Closed(reason))) => {
                log_info!("scan backend closed: {reason}");
                break;
            }
            Ok(Err(ScanError::Transient(reason))) => {
                summary.failed_cycles += 1;
                log_warn!(
                    "scan failed: {reason}; retrying in {:?}",
                    schedule.failure_backoff
                );
                if !pause(&cancel_token, schedule.failure_backoff).await {
                    log_info!("scan loop shutting down");
                    break;
                }
                continue;
            }
            Err(_) => {
                summary.failed_cycles += 1;
                log_warn!(
                    "scan timeout (> {:?}); retrying in {:?}",
                    scan_timeout,
                    schedule.failure_backoff
                );
                if !pause(&cancel_token, schedule.failure_backoff).await {
                    log_info!("scan loop shutting down");
                    break;
                }
                continue;
            }
        };

        resolve_vendors(&mut observations, &resolver);
        let heard = observations.len();
        let accepted = tracker.advance(observations, &db).await;
        summary.completed_cycles += 1;

        log_info!(
            "cycle {} complete: {accepted}/{heard} observations accepted, {} identities tracked",
            summary.completed_cycles,
            tracker.tracked_count()
        );

        if let Err(err) = db.purge_expired(schedule.retention, Utc::now()).await {
            log_error!("retention purge failed: {err:#}");
        }

        let elapsed = cycle_start.elapsed();
        if elapsed >= schedule.interval {
            log_warn!(
                "cycle took {:?}, longer than the {:?} interval; starting next cycle immediately",
                elapsed,
                schedule.interval
            );
            continue;
        }

        if !pause(&cancel_token, schedule.interval - elapsed).await {
            log_info!("scan loop shutting down");
            break;
        }
    }

    summary
}
