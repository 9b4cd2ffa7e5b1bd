//! Timing and policy settings for the supervisor and the synchronization loop.
//!
//! ```ignore
//! use simrate::config::SyncConfig;
//! use std::time::Duration;
//!
//! let config = SyncConfig::builder()
//!     .tick_interval(Duration::from_millis(100))
//!     .interactive(true)
//!     .build();
//! ```

use std::time::Duration;

pub const PRODUCT_NAME: &str = "MSFS2024 Sim Time Rate Adjuster";

pub const DEFAULT_PROCESS_NAME: &str = "FlightSimulator2024.exe";

/// Configuration for the supervisor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Executable name of the simulator
    pub process_name: String,
    /// Interval between synchronization ticks
    pub tick_interval: Duration,
    /// Time the simulator needs to apply a clock event
    pub event_settle: Duration,
    /// Delay after a late bridge connection before values are trusted
    pub reconnect_settle: Duration,
    /// Poll interval while waiting for the process
    pub process_poll: Duration,
    /// Poll interval while waiting for the bridge
    pub bridge_poll: Duration,
    /// Delay before retrying an exhausted locate attempt
    pub locate_backoff: Duration,
    /// Delay after losing the session
    pub disconnect_cooldown: Duration,
    /// Whether a user is present to fix access problems; otherwise they are fatal
    pub interactive: bool,
    /// Failed locate attempts before warning that discovery may never succeed
    pub locate_warning_after: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            process_name: DEFAULT_PROCESS_NAME.to_string(),
            tick_interval: Duration::from_millis(250),
            event_settle: Duration::from_millis(500),
            reconnect_settle: Duration::from_secs(15),
            process_poll: Duration::from_secs(1),
            bridge_poll: Duration::from_secs(1),
            locate_backoff: Duration::from_secs(5),
            disconnect_cooldown: Duration::from_secs(3),
            interactive: false,
            locate_warning_after: 12,
        }
    }
}

impl SyncConfig {
    pub fn builder() -> SyncConfigBuilder {
        SyncConfigBuilder::default()
    }
}

/// Builder for SyncConfig
#[derive(Debug, Clone, Default)]
pub struct SyncConfigBuilder {
    process_name: Option<String>,
    tick_interval: Option<Duration>,
    event_settle: Option<Duration>,
    reconnect_settle: Option<Duration>,
    process_poll: Option<Duration>,
    bridge_poll: Option<Duration>,
    locate_backoff: Option<Duration>,
    disconnect_cooldown: Option<Duration>,
    interactive: Option<bool>,
    locate_warning_after: Option<u32>,
}

impl SyncConfigBuilder {
    pub fn process_name<S: Into<String>>(mut self, name: S) -> Self {
        self.process_name = Some(name.into());
        self
    }

    pub fn tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = Some(interval);
        self
    }

    pub fn event_settle(mut self, settle: Duration) -> Self {
        self.event_settle = Some(settle);
        self
    }

    pub fn reconnect_settle(mut self, settle: Duration) -> Self {
        self.reconnect_settle = Some(settle);
        self
    }

    pub fn process_poll(mut self, interval: Duration) -> Self {
        self.process_poll = Some(interval);
        self
    }

    pub fn bridge_poll(mut self, interval: Duration) -> Self {
        self.bridge_poll = Some(interval);
        self
    }

    pub fn locate_backoff(mut self, backoff: Duration) -> Self {
        self.locate_backoff = Some(backoff);
        self
    }

    pub fn disconnect_cooldown(mut self, cooldown: Duration) -> Self {
        self.disconnect_cooldown = Some(cooldown);
        self
    }

    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = Some(interactive);
        self
    }

    pub fn locate_warning_after(mut self, attempts: u32) -> Self {
        self.locate_warning_after = Some(attempts);
        self
    }

    pub fn build(self) -> SyncConfig {
        let default = SyncConfig::default();
        SyncConfig {
            process_name: self.process_name.unwrap_or(default.process_name),
            tick_interval: self.tick_interval.unwrap_or(default.tick_interval),
            event_settle: self.event_settle.unwrap_or(default.event_settle),
            reconnect_settle: self.reconnect_settle.unwrap_or(default.reconnect_settle),
            process_poll: self.process_poll.unwrap_or(default.process_poll),
            bridge_poll: self.bridge_poll.unwrap_or(default.bridge_poll),
            locate_backoff: self.locate_backoff.unwrap_or(default.locate_backoff),
            disconnect_cooldown: self.disconnect_cooldown.unwrap_or(default.disconnect_cooldown),
            interactive: self.interactive.unwrap_or(default.interactive),
            locate_warning_after: self
                .locate_warning_after
                .unwrap_or(default.locate_warning_after),
        }
    }
}
