//! Failure categories the scan loop distinguishes.
//!
//! Persistence failures for a single identity are plain `anyhow::Error`s that
//! the tracker logs and swallows, so they have no variant here.

use std::path::PathBuf;

use thiserror::Error;

/// Errors surfaced by a [`crate::scanning::ScanBackend`].
#[derive(Debug, Error)]
pub enum ScanError {
    /// The cycle is skipped and retried after a backoff.
    #[error("scan failed: {0}")]
    Transient(String),
    /// The backend has nothing more to deliver; the loop ends cleanly.
    #[error("scan backend closed: {0}")]
    Closed(String),
}

/// Invalid or unreadable settings. Only raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("{field} must be greater than zero")]
    NotPositive { field: &'static str },
    #[error("departure_threshold ({departure}) must be greater than ping_timeout ({ping_timeout})")]
    ThresholdOrder { ping_timeout: u32, departure: u32 },
    #[error("scan_duration_secs ({duration}) must not exceed scan_interval_secs ({interval})")]
    DurationExceedsInterval { duration: u64, interval: u64 },
    #[error("replay backend requires --replay-file")]
    MissingReplayFile,
}

/// The scheduler itself broke; the process exits non-zero.
#[derive(Debug, Error)]
pub enum LoopError {
    #[error("scan loop terminated unexpectedly: {0}")]
    Fatal(String),
}
