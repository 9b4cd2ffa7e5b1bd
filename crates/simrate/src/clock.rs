//! Time source for the synchronization loop and the supervisor's polls.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::stop::StopToken;

pub trait Clock {
    /// Monotonic time since the clock was created.
    fn now(&self) -> Duration;

    /// Real world UTC time, used for absolute-time resets.
    fn utc_now(&self) -> DateTime<Utc>;

    fn sleep(&self, duration: Duration);
}

/// Wall clock whose sleeps end early once a stop is requested.
pub struct SystemClock {
    origin: Instant,
    stop: Option<Arc<StopToken>>,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            stop: None,
        }
    }

    pub fn stoppable(stop: Arc<StopToken>) -> Self {
        Self {
            origin: Instant::now(),
            stop: Some(stop),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) {
        match &self.stop {
            Some(token) => {
                token.sleep(duration);
            }
            None => thread::sleep(duration),
        }
    }
}

/// Deterministic clock for tests: `sleep` advances time instantly.
#[cfg(test)]
pub struct ManualClock {
    now: std::cell::Cell<Duration>,
    utc_origin: DateTime<Utc>,
    slept: std::cell::Cell<Duration>,
}

#[cfg(test)]
impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: std::cell::Cell::new(Duration::ZERO),
            utc_origin: DateTime::from_timestamp(1_767_225_600, 0).unwrap_or_default(),
            slept: std::cell::Cell::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.now.set(self.now.get() + by);
    }

    /// Total time spent in `sleep` calls.
    pub fn slept(&self) -> Duration {
        self.slept.get()
    }
}

#[cfg(test)]
impl Clock for ManualClock {
    fn now(&self) -> Duration {
        self.now.get()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        self.utc_origin + chrono::Duration::from_std(self.now.get()).unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) {
        self.slept.set(self.slept.get() + duration);
        self.advance(duration);
    }
}
