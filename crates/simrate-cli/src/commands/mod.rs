//! CLI command implementations.

pub mod locate;
pub mod profiles;
pub mod run;
pub mod scan;

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use simrate::config::DEFAULT_PROCESS_NAME;
use simrate::{OffsetProfileSet, SyncConfig, builtin_profiles, load_profiles};
use tracing::debug;

/// Options shared by every command.
#[derive(Args, Debug, Clone)]
pub struct Options {
    /// Executable name of the simulator process.
    #[arg(long, global = true, env = "SIMRATE_PROCESS", default_value = DEFAULT_PROCESS_NAME)]
    pub process: String,

    /// Offset profile table (JSON) to use instead of the built-in one.
    #[arg(long, global = true, env = "SIMRATE_PROFILES")]
    pub profiles: Option<PathBuf>,

    /// Synchronization tick interval in milliseconds.
    #[arg(long, global = true, env = "SIMRATE_TICK_MS", default_value_t = 250)]
    pub tick_ms: u64,

    /// Time the simulator is given to apply each clock event, in milliseconds.
    #[arg(long, global = true, env = "SIMRATE_EVENT_SETTLE_MS", default_value_t = 500)]
    pub event_settle_ms: u64,

    /// Wait after a late SimConnect connection before searching, in seconds.
    #[arg(long, global = true, env = "SIMRATE_RECONNECT_SETTLE_SECS", default_value_t = 15)]
    pub reconnect_settle_secs: u64,

    /// Auxiliary application to stop above 1x and start again at or below 1x.
    #[arg(long, global = true, env = "SIMRATE_AUTOAPP")]
    pub autoapp: Option<PathBuf>,

    /// Enable debug logging.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

impl Options {
    pub fn sync_config(&self, interactive: bool) -> SyncConfig {
        SyncConfig::builder()
            .process_name(self.process.as_str())
            .tick_interval(Duration::from_millis(self.tick_ms))
            .event_settle(Duration::from_millis(self.event_settle_ms))
            .reconnect_settle(Duration::from_secs(self.reconnect_settle_secs))
            .interactive(interactive)
            .build()
    }

    /// The profile table from `--profiles`, or the built-in one.
    pub fn offset_profiles(&self) -> Result<OffsetProfileSet> {
        match &self.profiles {
            Some(path) => {
                let profiles = load_profiles(path)
                    .with_context(|| format!("Failed to load profiles from {}", path.display()))?;
                debug!(
                    "Loaded {} profiles (version {}) from {}",
                    profiles.profiles.len(),
                    profiles.version,
                    path.display()
                );
                Ok(profiles)
            }
            None => Ok(builtin_profiles()),
        }
    }
}
