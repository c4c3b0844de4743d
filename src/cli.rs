//! Command line surface.
//!
//! ```bash
//! # Track devices with the simulated radio, overriding two thresholds
//! presence-tracker scan --backend simulated --ping-timeout 2 --departure-threshold 4
//!
//! # Replay a recorded session into a scratch database
//! presence-tracker --db /tmp/replay.sqlite3 scan --backend replay --replay-file cycles.json
//!
//! # Inspect what was stored
//! presence-tracker report list-devices --active
//! presence-tracker report stats
//! presence-tracker report export-csv events.csv
//! ```

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::error::ConfigError;
use crate::settings::PresenceSettings;

#[derive(Parser, Debug)]
#[command(name = "presence-tracker")]
#[command(author, version, about = "Track nearby wireless devices through present, absent and departed")]
#[command(propagate_version = true)]
pub struct Cli {
    /// SQLite database file (overrides `database_path` from the settings file)
    #[arg(long, global = true, env = "PRESENCE_DB")]
    pub db: Option<PathBuf>,

    /// JSON settings file; keys it omits keep their defaults
    #[arg(short, long, global = true, env = "PRESENCE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the scan loop until interrupted or the backend runs dry
    Scan(ScanArgs),

    /// Read-only views of the stored data
    #[command(subcommand)]
    Report(ReportCommand),
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    /// Random device population, no hardware needed
    Simulated,
    /// Recorded cycles from a JSON file
    Replay,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[arg(short, long, value_enum, default_value = "simulated")]
    pub backend: BackendKind,

    /// Cycles file for the replay backend
    #[arg(long)]
    pub replay_file: Option<PathBuf>,

    /// Number of devices the simulated backend invents
    #[arg(long, default_value = "12")]
    pub population: usize,

    #[arg(long)]
    pub scan_interval: Option<u64>,

    #[arg(long)]
    pub scan_duration: Option<u64>,

    #[arg(long)]
    pub ping_timeout: Option<u32>,

    #[arg(long)]
    pub departure_threshold: Option<u32>,

    /// dBm, e.g. -80
    #[arg(long, allow_hyphen_values = true)]
    pub rssi_floor: Option<i32>,

    #[arg(long)]
    pub retention_days: Option<u32>,

    #[arg(long, value_name = "BOOL")]
    pub anonymize_devices: Option<bool>,

    #[arg(long, value_name = "BOOL")]
    pub anonymize_event_log: Option<bool>,

    #[arg(long)]
    pub failure_backoff: Option<u64>,
}

impl ScanArgs {
    /// Layers command line values over `settings`.
    pub fn apply(&self, settings: &mut PresenceSettings) {
        if let Some(value) = self.scan_interval {
            settings.scan_interval_secs = value;
        }
        if let Some(value) = self.scan_duration {
            settings.scan_duration_secs = value;
        }
        if let Some(value) = self.ping_timeout {
            settings.ping_timeout = value;
        }
        if let Some(value) = self.departure_threshold {
            settings.departure_threshold = value;
        }
        if let Some(value) = self.rssi_floor {
            settings.rssi_floor = value;
        }
        if let Some(value) = self.retention_days {
            settings.retention_days = value;
        }
        if let Some(value) = self.anonymize_devices {
            settings.anonymize_devices = value;
        }
        if let Some(value) = self.anonymize_event_log {
            settings.anonymize_event_log = value;
        }
        if let Some(value) = self.failure_backoff {
            settings.failure_backoff_secs = value;
        }
    }

    pub fn replay_file(&self) -> Result<&PathBuf, ConfigError> {
        self.replay_file.as_ref().ok_or(ConfigError::MissingReplayFile)
    }
}

#[derive(Subcommand, Debug)]
pub enum ReportCommand {
    /// One line per known device, most recently seen first
    ListDevices {
        /// Only devices that are present or absent
        #[arg(long)]
        active: bool,
    },

    /// Totals, recent visits and vendor/type breakdowns
    Stats,

    /// Dump the presence event log, newest first
    ExportCsv {
        /// Destination file; must end with .csv
        path: PathBuf,
    },
}

impl Cli {
    /// Settings from defaults, the settings file and `--db`, in that order.
    pub fn base_settings(&self) -> Result<PresenceSettings, ConfigError> {
        let mut settings = PresenceSettings::load_or_default(self.config.as_deref())?;
        if let Some(db) = &self.db {
            settings.database_path = db.clone();
        }
        Ok(settings)
    }
}
