//! State shared between the supervisor thread and the foreground.
//!
//! Every field lives behind one mutex. The foreground reads snapshots, drains
//! log lines and submits control commands; the background writes status and
//! consumes commands.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, NaiveDate, TimeDelta, Utc};
use owo_colors::OwoColorize;
use strum::Display;
use tracing::{error, info, warn};

use crate::control::ControlCommand;

/// Tracing target of the lines also queued for the console. A front end that
/// prints [`SharedState::drain_logs`] turns this target off to avoid doubles.
pub const CONSOLE_TARGET: &str = "simrate::console";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display)]
pub enum ConnectionStatus {
    #[default]
    Disconnected,
    #[strum(serialize = "Waiting for process")]
    WaitingForProcess,
    #[strum(serialize = "Waiting for SimConnect")]
    WaitingForBridge,
    #[strum(serialize = "Scanning")]
    Scanning,
    Connected,
}

#[derive(Debug, Clone, Default)]
pub struct BackendState {
    pub status: ConnectionStatus,
    /// User-actionable reason the status is stuck, shown until it is cleared
    pub status_detail: Option<String>,
    /// `OK: <ok> - Paused: <paused>` as last reported by the bridge
    pub bridge_status: String,
    /// Rate as shown to the user, e.g. `2x` or `0x (Paused)`
    pub rate_display: String,
    pub current_rate: Option<f64>,
    /// Integer part of the last observed seconds offset
    pub seconds_offset: i64,
    /// In-sim time reported by the simulator, seconds since 0001-01-01
    pub reported_absolute_time: Option<f64>,
    pub logs: Vec<String>,
    pub force_state_change: Option<ControlCommand>,
    pub autoapp_enabled: bool,
    pub autoapp_path: Option<PathBuf>,
}

/// Cloneable handle to the shared [`BackendState`].
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<BackendState>>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the state. A panic on another thread never leaves the record half
    /// written, so a poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, BackendState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn info(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        info!(target: CONSOLE_TARGET, "{}", message);
        self.push_log(format!("[INFO] {message}"));
    }

    pub fn warn(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        warn!(target: CONSOLE_TARGET, "{}", message);
        self.push_log(format!("[WARN] {message}"));
    }

    pub fn error(&self, message: impl AsRef<str>) {
        let message = message.as_ref();
        error!(target: CONSOLE_TARGET, "{}", message);
        self.push_log(format!("[ERROR] {message}"));
    }

    fn push_log(&self, line: String) {
        self.lock().logs.push(line);
    }

    /// Take every log line appended since the last call.
    pub fn drain_logs(&self) -> Vec<String> {
        std::mem::take(&mut self.lock().logs)
    }

    pub fn set_status(&self, status: ConnectionStatus) {
        self.lock().status = status;
    }

    pub fn set_status_detail(&self, detail: Option<String>) {
        self.lock().status_detail = detail;
    }

    pub fn status(&self) -> ConnectionStatus {
        self.lock().status
    }

    /// Queue a command for the next tick, replacing any command not yet applied.
    pub fn submit_command(&self, command: ControlCommand) {
        self.lock().force_state_change = Some(command);
    }

    /// Consume the pending command, if any.
    pub fn take_command(&self) -> Option<ControlCommand> {
        self.lock().force_state_change.take()
    }

    pub fn set_autoapp(&self, enabled: bool, path: Option<PathBuf>) {
        let mut state = self.lock();
        state.autoapp_enabled = enabled;
        state.autoapp_path = path;
    }

    /// The auxiliary application path when the integration is enabled.
    pub fn autoapp_target(&self) -> Option<PathBuf> {
        let state = self.lock();
        if state.autoapp_enabled {
            state.autoapp_path.clone()
        } else {
            None
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        let state = self.lock();
        StatusSnapshot {
            status: state.status,
            status_detail: state.status_detail.clone(),
            bridge_status: state.bridge_status.clone(),
            rate_display: state.rate_display.clone(),
            seconds_offset: state.seconds_offset,
            reported_absolute_time: state.reported_absolute_time,
        }
    }
}

/// Copy of the displayable fields, taken under the lock.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusSnapshot {
    pub status: ConnectionStatus,
    pub status_detail: Option<String>,
    pub bridge_status: String,
    pub rate_display: String,
    pub seconds_offset: i64,
    pub reported_absolute_time: Option<f64>,
}

impl StatusSnapshot {
    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    /// Real world time shifted by the in-sim offset.
    pub fn sim_time_estimate(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now + TimeDelta::seconds(self.seconds_offset)
    }

    /// In-sim time as reported by the simulator.
    pub fn reported_sim_time(&self) -> Option<DateTime<Utc>> {
        let seconds = self.reported_absolute_time?;
        let year_one = NaiveDate::from_ymd_opt(1, 1, 1)?.and_hms_opt(0, 0, 0)?.and_utc();
        year_one.checked_add_signed(TimeDelta::milliseconds((seconds * 1000.0) as i64))
    }

    pub fn status_line(&self, now: DateTime<Utc>, color: bool) -> String {
        let status = self.status.to_string();
        let status = if !color {
            status
        } else if self.is_connected() {
            status.green().bold().to_string()
        } else {
            status.yellow().to_string()
        };

        if !self.is_connected() {
            return match &self.status_detail {
                Some(detail) if color => format!("{} | {}", status, detail.red()),
                Some(detail) => format!("{status} | {detail}"),
                None => status,
            };
        }

        let sign = if self.seconds_offset < 0 { "-" } else { "+" };
        format!(
            "{} | Rate: {} | Offset: {}{}s | In-sim: {} | {}",
            status,
            self.rate_display,
            sign,
            self.seconds_offset.abs(),
            self.sim_time_estimate(now).format("%Y-%m-%d %H:%M:%S"),
            self.bridge_status
        )
    }
}
