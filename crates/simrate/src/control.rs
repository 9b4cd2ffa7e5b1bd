//! Commands submitted by the foreground and applied by the synchronization loop.

use chrono::{DateTime, Utc};
use strum::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum ControlCommand {
    Pause,
    Resume,
    /// Put the in-sim clock back on real world time
    #[strum(serialize = "Reset to live time")]
    ResetToLiveTime,
    /// Put the in-sim clock at the given UTC instant
    #[strum(serialize = "Reset to absolute time")]
    ResetToAbsoluteTime(DateTime<Utc>),
}

impl ControlCommand {
    /// Offset (in seconds) the simulator should hold after a reset, or `None` for
    /// pause and resume.
    pub fn reset_target(&self, now: DateTime<Utc>) -> Option<f64> {
        match self {
            ControlCommand::ResetToLiveTime => Some(0.0),
            ControlCommand::ResetToAbsoluteTime(target) => {
                Some((*target - now).num_milliseconds() as f64 / 1000.0)
            }
            ControlCommand::Pause | ControlCommand::Resume => None,
        }
    }
}
